//! Shared fixtures for the renderer integration tests.
//!
//! Scene builders with known draw shapes, a fault-injecting device for
//! exercising creation-failure cleanup, plus small helpers for picking
//! apart recorded command sequences.

use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};
use parking_lot::Mutex;

use marigold_core::material::Material;
use marigold_core::mesh::{unit_cube, CpuMesh};
use marigold_core::scene::{Background, Node, Scene, SceneMesh, Submesh};
use marigold_core::texture::CpuTexture;
use marigold_graphics::bindings::BindingLayout;
use marigold_graphics::commands::{CommandSequence, RenderCommand};
use marigold_graphics::device::dummy::DummyDevice;
use marigold_graphics::device::{
    BindingLayoutId, BoundResource, BufferDesc, BufferId, DescriptorSetId, PipelineId,
    RenderDevice, SamplerDesc, SamplerId, TextureId,
};
use marigold_graphics::pipeline::{PipelineDescription, ShaderSet};
use marigold_graphics::{DeviceFeatures, RenderError, Renderer, RendererConfig};

/// Small solid environment image for the background pass.
pub fn environment() -> CpuTexture {
    CpuTexture::solid(8, 8, [24, 32, 64, 255])
}

/// Flat triangle fan in the XY plane with `triangles * 3` indices, so a
/// test can pick exact draw sizes.
pub fn fan_mesh(triangles: u16, label: &str) -> CpuMesh {
    let mut positions = vec![[0.0f32, 0.0, 0.0]];
    let mut indices = Vec::with_capacity(triangles as usize * 3);
    for i in 0..triangles {
        let start = f32::from(i) * 0.3;
        let end = start + 0.3;
        positions.push([start.cos(), start.sin(), 0.0]);
        positions.push([end.cos(), end.sin(), 0.0]);
        indices.extend_from_slice(&[0, i * 2 + 1, i * 2 + 2]);
    }
    let normals = vec![[0.0f32, 0.0, 1.0]; positions.len()];
    CpuMesh::new()
        .with_label(label)
        .with_positions(positions)
        .with_normals(normals)
        .with_indices_u16(&indices)
}

/// One cube instanced once: a single object draw plus the background.
pub fn single_cube_scene() -> Scene {
    let mesh = SceneMesh::new()
        .with_name("cube")
        .with_node(Node::new(Mat4::IDENTITY))
        .with_submesh(Submesh::new(unit_cube(), Material::default()));
    Scene::new(Background::new(unit_cube(), environment())).with_mesh(mesh)
}

/// Three object draws with distinct index counts (36, 24, 12), transforms
/// (x = 0, 1, 2) and base colors, plus the cube background. The flattened
/// draw list follows the mesh insertion order below.
pub fn layered_scene() -> Scene {
    let hull = SceneMesh::new()
        .with_name("hull")
        .with_node(Node::new(Mat4::IDENTITY))
        .with_submesh(Submesh::new(
            unit_cube(),
            Material::new(Vec4::new(0.8, 0.2, 0.2, 1.0)),
        ));
    let fin = SceneMesh::new()
        .with_name("fin")
        .with_node(Node::new(Mat4::from_translation(Vec3::X)))
        .with_submesh(Submesh::new(
            fan_mesh(8, "fin"),
            Material::new(Vec4::new(0.2, 0.8, 0.2, 0.5)),
        ));
    let vane = SceneMesh::new()
        .with_name("vane")
        .with_node(Node::new(Mat4::from_translation(Vec3::X * 2.0)))
        .with_submesh(Submesh::new(
            fan_mesh(4, "vane"),
            Material::new(Vec4::new(0.2, 0.2, 0.8, 1.0)),
        ));

    Scene::new(Background::new(unit_cube(), environment()))
        .with_mesh(hull)
        .with_mesh(fin)
        .with_mesh(vane)
}

/// A renderer prepared over `scene` on a fresh full-featured dummy device.
pub fn prepared(scene: &Scene) -> (Arc<DummyDevice>, Renderer<DummyDevice>) {
    // Initialize logging for test output
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let device = Arc::new(DummyDevice::new());
    let mut renderer = Renderer::new(device.clone(), RendererConfig::default());
    renderer
        .prepare(scene)
        .expect("prepare should succeed on the dummy device");
    (device, renderer)
}

/// Delegates to a [`DummyDevice`] but fails one resource-creation call.
///
/// Every `create_*` call across all arenas counts toward the target;
/// creations after the failing one succeed again, so each test aims the
/// failure at exactly one point of the preparation sequence and can then
/// check what was left behind.
pub struct FailingDevice {
    inner: DummyDevice,
    countdown: Mutex<u32>,
}

impl FailingDevice {
    /// Fail the `call`th creation call, 1-based.
    pub fn fail_at(call: u32) -> Self {
        Self {
            inner: DummyDevice::new(),
            countdown: Mutex::new(call),
        }
    }

    /// Total live resources on the wrapped device.
    pub fn live_resource_count(&self) -> usize {
        self.inner.live_resource_count()
    }

    fn next_creation(&self, what: &str) -> Result<(), RenderError> {
        let mut remaining = self.countdown.lock();
        if *remaining > 0 {
            *remaining -= 1;
            if *remaining == 0 {
                return Err(RenderError::ResourceCreation(format!(
                    "injected {what} creation failure"
                )));
            }
        }
        Ok(())
    }
}

impl RenderDevice for FailingDevice {
    fn name(&self) -> &str {
        "failing-dummy"
    }

    fn features(&self) -> DeviceFeatures {
        self.inner.features()
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferId, RenderError> {
        self.next_creation("buffer")?;
        self.inner.create_buffer(desc)
    }

    fn write_buffer(&self, buffer: BufferId, data: &[u8]) -> Result<(), RenderError> {
        self.inner.write_buffer(buffer, data)
    }

    fn create_texture(&self, texture: &CpuTexture) -> Result<TextureId, RenderError> {
        self.next_creation("texture")?;
        self.inner.create_texture(texture)
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerId, RenderError> {
        self.next_creation("sampler")?;
        self.inner.create_sampler(desc)
    }

    fn create_binding_layout(
        &self,
        layout: &BindingLayout,
    ) -> Result<BindingLayoutId, RenderError> {
        self.next_creation("binding layout")?;
        self.inner.create_binding_layout(layout)
    }

    fn create_descriptor_set(
        &self,
        layout: BindingLayoutId,
        resources: &[BoundResource],
    ) -> Result<DescriptorSetId, RenderError> {
        self.next_creation("descriptor set")?;
        self.inner.create_descriptor_set(layout, resources)
    }

    fn create_pipeline(
        &self,
        description: &PipelineDescription,
        shaders: &ShaderSet,
        layout: BindingLayoutId,
    ) -> Result<PipelineId, RenderError> {
        self.next_creation("pipeline")?;
        self.inner.create_pipeline(description, shaders, layout)
    }

    fn execute(&self, sequence: &CommandSequence) -> Result<(), RenderError> {
        self.inner.execute(sequence)
    }

    fn wait_idle(&self) {
        self.inner.wait_idle();
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        self.inner.destroy_buffer(buffer);
    }

    fn destroy_texture(&self, texture: TextureId) {
        self.inner.destroy_texture(texture);
    }

    fn destroy_sampler(&self, sampler: SamplerId) {
        self.inner.destroy_sampler(sampler);
    }

    fn destroy_binding_layout(&self, layout: BindingLayoutId) {
        self.inner.destroy_binding_layout(layout);
    }

    fn destroy_descriptor_set(&self, set: DescriptorSetId) {
        self.inner.destroy_descriptor_set(set);
    }

    fn destroy_pipeline(&self, pipeline: PipelineId) {
        self.inner.destroy_pipeline(pipeline);
    }
}

/// Index counts of every draw in the sequence, in recording order.
pub fn draw_counts(sequence: &CommandSequence) -> Vec<u32> {
    sequence
        .commands()
        .iter()
        .filter_map(|command| match command {
            RenderCommand::DrawIndexed { index_count } => Some(*index_count),
            _ => None,
        })
        .collect()
}

/// Uniform buffer backing the object pass block, found by its label.
pub fn object_uniform_buffer(device: &DummyDevice) -> BufferId {
    device
        .buffer_by_label("object uniforms")
        .expect("prepared devices hold the object uniform buffer")
}

/// Uniform buffer backing the background pass block, found by its label.
pub fn background_uniform_buffer(device: &DummyDevice) -> BufferId {
    device
        .buffer_by_label("background uniforms")
        .expect("prepared devices hold the background uniform buffer")
}
