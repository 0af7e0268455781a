//! Renderer lifecycle and per-frame entry points.
//!
//! [`Renderer`] drives the whole core through three explicit lifecycle
//! calls instead of framework callbacks:
//!
//! - [`prepare`] negotiates capabilities, builds both pipelines, uploads
//!   the scene and allocates every bindable resource;
//! - [`record_frame`] refreshes the uniforms if the camera moved and
//!   records one frame's command sequence;
//! - [`teardown`] releases everything, idempotently.
//!
//! The state machine is `Uninitialized → Prepared → (Rendering → Prepared)*
//! → Destroyed`. Recording before `prepare` succeeded is a logged no-op
//! that yields an empty sequence; calling `prepare` twice is a precondition
//! violation and fails loudly.
//!
//! [`prepare`]: Renderer::prepare
//! [`record_frame`]: Renderer::record_frame
//! [`teardown`]: Renderer::teardown

use std::sync::Arc;

use glam::Vec4;

use marigold_core::camera::Camera;
use marigold_core::scene::Scene;

use crate::binder::ResourceBinder;
use crate::capability::{negotiate, DynamicCapabilities};
use crate::commands::CommandSequence;
use crate::device::{GpuGeometry, PipelineId, RenderDevice};
use crate::draw_list::DrawList;
use crate::dynamic_state::{DynamicStateSet, LogicOp};
use crate::error::RenderError;
use crate::pipeline::{describe, PipelineTable, PipelineVariant, ShaderSet};
use crate::recorder::{FrameRecorder, OverlayHook};
use crate::types::{Extent2d, ScissorRect, Viewport};

// ============================================================================
// Configuration
// ============================================================================

/// Static renderer configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Initial render target size.
    pub extent: Extent2d,
    /// How many frames the platform keeps in flight; frame indices passed
    /// to [`Renderer::record_frame`] must stay below this.
    pub frames_in_flight: u32,
    /// World-space light position uploaded with the object uniforms.
    pub light_position: Vec4,
    /// Logic operation the object pass starts with.
    pub logic_op: LogicOp,
    /// Object pipeline shader stages.
    pub object_shaders: ShaderSet,
    /// Background pipeline shader stages.
    pub background_shaders: ShaderSet,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            extent: Extent2d::default(),
            frames_in_flight: 2,
            light_position: Vec4::new(5.0, 5.0, 5.0, 1.0),
            logic_op: LogicOp::Copy,
            object_shaders: ShaderSet::default(),
            background_shaders: ShaderSet::default(),
        }
    }
}

impl RendererConfig {
    /// Set the initial target extent.
    pub fn with_extent(mut self, extent: Extent2d) -> Self {
        self.extent = extent;
        self
    }

    /// Set the frames-in-flight count.
    pub fn with_frames_in_flight(mut self, frames: u32) -> Self {
        self.frames_in_flight = frames.max(1);
        self
    }

    /// Set the light position.
    pub fn with_light_position(mut self, position: Vec4) -> Self {
        self.light_position = position;
        self
    }

    /// Set the initial logic operation.
    pub fn with_logic_op(mut self, logic_op: LogicOp) -> Self {
        self.logic_op = logic_op;
        self
    }

    /// Set the object pipeline shaders.
    pub fn with_object_shaders(mut self, shaders: ShaderSet) -> Self {
        self.object_shaders = shaders;
        self
    }

    /// Set the background pipeline shaders.
    pub fn with_background_shaders(mut self, shaders: ShaderSet) -> Self {
        self.background_shaders = shaders;
        self
    }
}

// ============================================================================
// Lifecycle state
// ============================================================================

/// Renderer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    /// Constructed, nothing prepared yet.
    Uninitialized,
    /// Resources are built; frames can be recorded.
    Prepared,
    /// A frame is being recorded; returns to [`Prepared`](Self::Prepared).
    Rendering,
    /// Everything released. Terminal.
    Destroyed,
}

/// Everything a successful `prepare` builds, torn down as a unit.
struct PreparedResources {
    capabilities: DynamicCapabilities,
    dynamic_states: PipelineTable<DynamicStateSet>,
    pipelines: PipelineTable<PipelineId>,
    binder: ResourceBinder,
    geometries: Vec<Vec<GpuGeometry>>,
    background: GpuGeometry,
    draw_list: DrawList,
}

impl PreparedResources {
    fn destroy(&mut self, device: &dyn RenderDevice) {
        for (_, pipeline) in self.pipelines.iter() {
            device.destroy_pipeline(*pipeline);
        }
        device.destroy_geometry(&self.background);
        for mesh_geometries in &self.geometries {
            for geometry in mesh_geometries {
                device.destroy_geometry(geometry);
            }
        }
        self.binder.destroy(device);
    }
}

// ============================================================================
// Renderer
// ============================================================================

/// The renderer core: owns the camera, both pipelines and every GPU
/// resource behind them, generic over the executing [`RenderDevice`].
pub struct Renderer<D: RenderDevice> {
    device: Arc<D>,
    config: RendererConfig,
    camera: Camera,
    logic_op: LogicOp,
    overlay: Option<Box<dyn OverlayHook>>,
    prepared: Option<PreparedResources>,
    state: RendererState,
}

impl<D: RenderDevice> Renderer<D> {
    /// Create an unprepared renderer on `device`.
    pub fn new(device: Arc<D>, config: RendererConfig) -> Self {
        let mut camera = Camera::default();
        camera.set_aspect(config.extent.width as f32, config.extent.height as f32);
        log::debug!("renderer created on '{}'", device.name());
        Self {
            device,
            logic_op: config.logic_op,
            config,
            camera,
            overlay: None,
            prepared: None,
            state: RendererState::Uninitialized,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RendererState {
        self.state
    }

    /// Negotiated capabilities, present once prepared.
    pub fn capabilities(&self) -> Option<&DynamicCapabilities> {
        self.prepared.as_ref().map(|p| &p.capabilities)
    }

    /// The camera viewing the scene.
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Mutable camera access; any mutation marks it updated, and the next
    /// recorded frame re-uploads the uniform blocks.
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Logic operation applied to the object pass.
    pub fn logic_op(&self) -> LogicOp {
        self.logic_op
    }

    /// Select the logic operation for subsequent frames.
    ///
    /// Takes effect from the next recorded frame; the recording algorithm
    /// itself never changes, only the value carried by its logic-op
    /// command.
    pub fn set_logic_op(&mut self, logic_op: LogicOp) {
        if self.logic_op != logic_op {
            log::debug!("logic op changed to {}", logic_op.name());
            self.logic_op = logic_op;
        }
    }

    /// Install the overlay hook invoked at the end of each frame.
    pub fn set_overlay(&mut self, overlay: Box<dyn OverlayHook>) {
        self.overlay = Some(overlay);
    }

    /// Resize the render target. Marks the camera updated so the next
    /// frame uploads matrices with the new aspect ratio.
    pub fn set_extent(&mut self, extent: Extent2d) {
        self.config.extent = extent;
        self.camera
            .set_aspect(extent.width as f32, extent.height as f32);
    }

    // ------------------------------------------------------------------------
    // prepare
    // ------------------------------------------------------------------------

    /// Build every resource needed to record frames for `scene`.
    ///
    /// Runs capability negotiation, uploads all scene and background
    /// geometry, allocates uniform buffers and descriptor sets, compiles
    /// both pipelines, flattens the draw list and performs the initial
    /// uniform upload. On any failure the renderer stays `Uninitialized`
    /// and nothing remains allocated.
    pub fn prepare(&mut self, scene: &Scene) -> Result<(), RenderError> {
        if self.state != RendererState::Uninitialized {
            return Err(RenderError::InvalidParameter(format!(
                "prepare called in state {:?}",
                self.state
            )));
        }
        log::info!("preparing renderer on '{}'", self.device.name());

        let capabilities = negotiate(&self.device.features())?;
        let mut prepared = self.build_resources(scene, capabilities)?;

        // A fresh camera is always marked updated, so this uploads valid
        // matrices before the first frame is recorded.
        if let Err(err) = prepared
            .binder
            .refresh(self.device.as_ref(), &mut self.camera)
        {
            prepared.destroy(self.device.as_ref());
            return Err(err);
        }

        log::info!(
            "renderer prepared: {} object draws, optional dynamic states {:?}",
            prepared.draw_list.len(),
            prepared.capabilities.optional_states()
        );
        self.prepared = Some(prepared);
        self.state = RendererState::Prepared;
        Ok(())
    }

    fn build_resources(
        &self,
        scene: &Scene,
        capabilities: DynamicCapabilities,
    ) -> Result<PreparedResources, RenderError> {
        let device = self.device.as_ref();

        let mut binder = ResourceBinder::create(
            device,
            &scene.background().texture,
            self.config.light_position,
        )?;

        let geometries = match Self::upload_scene_geometries(device, scene) {
            Ok(geometries) => geometries,
            Err(err) => {
                Self::release_partial(device, &mut binder, &[], None, &[]);
                return Err(err);
            }
        };

        let background = match device.create_geometry(&scene.background().geometry) {
            Ok(geometry) => geometry,
            Err(err) => {
                Self::release_partial(device, &mut binder, &geometries, None, &[]);
                return Err(err);
            }
        };

        let draw_list = match DrawList::build(scene, &geometries) {
            Ok(list) => list,
            Err(err) => {
                Self::release_partial(device, &mut binder, &geometries, Some(&background), &[]);
                return Err(err);
            }
        };

        let descriptions =
            PipelineTable::from_fn(|variant| describe(variant, &capabilities));
        let dynamic_states = PipelineTable::from_fn(|variant| descriptions[variant].dynamic);

        let object_pipeline = match device.create_pipeline(
            &descriptions[PipelineVariant::Object],
            &self.config.object_shaders,
            binder.layout(PipelineVariant::Object),
        ) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                Self::release_partial(device, &mut binder, &geometries, Some(&background), &[]);
                return Err(err);
            }
        };
        let background_pipeline = match device.create_pipeline(
            &descriptions[PipelineVariant::Background],
            &self.config.background_shaders,
            binder.layout(PipelineVariant::Background),
        ) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                Self::release_partial(
                    device,
                    &mut binder,
                    &geometries,
                    Some(&background),
                    &[object_pipeline],
                );
                return Err(err);
            }
        };
        let pipelines = PipelineTable::from_fn(|variant| match variant {
            PipelineVariant::Object => object_pipeline,
            PipelineVariant::Background => background_pipeline,
        });

        Ok(PreparedResources {
            capabilities,
            dynamic_states,
            pipelines,
            binder,
            geometries,
            background,
            draw_list,
        })
    }

    fn upload_scene_geometries(
        device: &dyn RenderDevice,
        scene: &Scene,
    ) -> Result<Vec<Vec<GpuGeometry>>, RenderError> {
        let mut geometries: Vec<Vec<GpuGeometry>> = Vec::with_capacity(scene.meshes().len());
        for mesh in scene.meshes() {
            let mut uploaded = Vec::with_capacity(mesh.submeshes.len());
            for submesh in &mesh.submeshes {
                match device.create_geometry(&submesh.geometry) {
                    Ok(geometry) => uploaded.push(geometry),
                    Err(err) => {
                        uploaded
                            .iter()
                            .chain(geometries.iter().flatten())
                            .for_each(|geometry| device.destroy_geometry(geometry));
                        return Err(err);
                    }
                }
            }
            geometries.push(uploaded);
        }
        Ok(geometries)
    }

    /// Failure-path release for resources created partway through setup.
    fn release_partial(
        device: &dyn RenderDevice,
        binder: &mut ResourceBinder,
        geometries: &[Vec<GpuGeometry>],
        background: Option<&GpuGeometry>,
        pipelines: &[PipelineId],
    ) {
        for pipeline in pipelines {
            device.destroy_pipeline(*pipeline);
        }
        if let Some(geometry) = background {
            device.destroy_geometry(geometry);
        }
        for geometry in geometries.iter().flatten() {
            device.destroy_geometry(geometry);
        }
        binder.destroy(device);
    }

    // ------------------------------------------------------------------------
    // record / render
    // ------------------------------------------------------------------------

    /// Record one frame's command sequence.
    ///
    /// Refreshes the uniform buffers first if the camera changed, then
    /// emits the fixed step order of [`FrameRecorder::record`]. Before a
    /// successful `prepare` this is a safe no-op returning an empty
    /// sequence. The caller must ensure no unretired in-flight frame still
    /// reads the uniform buffers when it calls this (wait-before-write).
    pub fn record_frame(&mut self, frame_index: u32) -> Result<CommandSequence, RenderError> {
        if matches!(
            self.state,
            RendererState::Uninitialized | RendererState::Destroyed
        ) {
            log::warn!(
                "record_frame called in state {:?}, emitting nothing",
                self.state
            );
            return Ok(CommandSequence::new(frame_index));
        }
        if frame_index >= self.config.frames_in_flight {
            return Err(RenderError::InvalidParameter(format!(
                "frame index {frame_index} out of range for {} frames in flight",
                self.config.frames_in_flight
            )));
        }
        let Some(prepared) = self.prepared.as_mut() else {
            return Err(RenderError::Recording(
                "prepared resources missing".to_string(),
            ));
        };

        prepared
            .binder
            .refresh(self.device.as_ref(), &mut self.camera)?;

        self.state = RendererState::Rendering;
        let recorder = FrameRecorder {
            pipelines: &prepared.pipelines,
            dynamic_states: &prepared.dynamic_states,
            descriptor_sets: prepared.binder.descriptor_sets(),
            draw_list: &prepared.draw_list,
            background: &prepared.background,
            viewport: Viewport::from_extent(self.config.extent),
            scissor: ScissorRect::from_extent(self.config.extent),
            logic_op: self.logic_op,
        };
        let sequence = recorder.record(frame_index, self.overlay.as_deref());
        self.state = RendererState::Prepared;
        Ok(sequence)
    }

    /// Record and execute one frame.
    ///
    /// Convenience loop driver for headless use: waits for the device to
    /// retire outstanding work, records, and executes. Platforms with
    /// their own frame pacing call [`record_frame`](Self::record_frame)
    /// and submit the sequence themselves.
    pub fn render(&mut self, frame_index: u32) -> Result<(), RenderError> {
        self.device.wait_idle();
        let sequence = self.record_frame(frame_index)?;
        if sequence.is_empty() {
            return Ok(());
        }
        self.device.execute(&sequence)
    }

    // ------------------------------------------------------------------------
    // teardown
    // ------------------------------------------------------------------------

    /// Release every owned resource. Idempotent; safe in any state.
    pub fn teardown(&mut self) {
        if self.state == RendererState::Destroyed {
            log::debug!("teardown called again, ignoring");
            return;
        }
        if let Some(mut prepared) = self.prepared.take() {
            self.device.wait_idle();
            prepared.destroy(self.device.as_ref());
            log::info!("renderer destroyed");
        }
        self.state = RendererState::Destroyed;
    }
}

impl<D: RenderDevice> Drop for Renderer<D> {
    fn drop(&mut self) {
        if self.prepared.is_some() {
            log::warn!("renderer dropped without teardown, leaking device resources");
        }
    }
}

impl<D: RenderDevice> std::fmt::Debug for Renderer<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("device", &self.device.name())
            .field("state", &self.state)
            .field("logic_op", &self.logic_op)
            .field("extent", &self.config.extent)
            .finish()
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::device::dummy::DummyDevice;
    use marigold_core::material::Material;
    use marigold_core::mesh::unit_cube;
    use marigold_core::scene::{Background, Node, SceneMesh, Submesh};
    use marigold_core::texture::CpuTexture;
    use glam::Mat4;

    static_assertions::assert_impl_all!(Renderer<DummyDevice>: Send, Sync);

    fn test_scene() -> Scene {
        let mesh = SceneMesh::new()
            .with_name("cube")
            .with_node(Node::new(Mat4::IDENTITY))
            .with_submesh(Submesh::new(unit_cube(), Material::default()));
        Scene::new(Background::new(
            unit_cube(),
            CpuTexture::solid(4, 4, [90, 120, 200, 255]),
        ))
        .with_mesh(mesh)
    }

    #[test]
    fn test_lifecycle_states() {
        let device = Arc::new(DummyDevice::new());
        let mut renderer = Renderer::new(device.clone(), RendererConfig::default());
        assert_eq!(renderer.state(), RendererState::Uninitialized);

        renderer.prepare(&test_scene()).unwrap();
        assert_eq!(renderer.state(), RendererState::Prepared);
        assert!(renderer.capabilities().is_some());

        renderer.render(0).unwrap();
        assert_eq!(renderer.state(), RendererState::Prepared);
        assert_eq!(device.execution_count(), 1);

        renderer.teardown();
        assert_eq!(renderer.state(), RendererState::Destroyed);
        assert_eq!(device.live_resource_count(), 0);
    }

    #[test]
    fn test_record_before_prepare_is_safe_noop() {
        let device = Arc::new(DummyDevice::new());
        let mut renderer = Renderer::new(device.clone(), RendererConfig::default());

        let sequence = renderer.record_frame(0).unwrap();
        assert!(sequence.is_empty());
        assert_eq!(renderer.state(), RendererState::Uninitialized);

        renderer.render(0).unwrap();
        assert_eq!(device.execution_count(), 0);
    }

    #[test]
    fn test_prepare_twice_is_rejected() {
        let device = Arc::new(DummyDevice::new());
        let mut renderer = Renderer::new(device, RendererConfig::default());
        renderer.prepare(&test_scene()).unwrap();

        let err = renderer.prepare(&test_scene()).unwrap_err();
        assert!(matches!(err, RenderError::InvalidParameter(_)));
        assert_eq!(renderer.state(), RendererState::Prepared);
        renderer.teardown();
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let device = Arc::new(DummyDevice::new());
        let mut renderer = Renderer::new(device.clone(), RendererConfig::default());
        renderer.prepare(&test_scene()).unwrap();

        renderer.teardown();
        renderer.teardown();
        assert_eq!(device.live_resource_count(), 0);
        assert_eq!(renderer.state(), RendererState::Destroyed);

        // Recording after destruction is the same safe no-op.
        assert!(renderer.record_frame(0).unwrap().is_empty());
    }

    #[test]
    fn test_out_of_range_frame_index_is_rejected() {
        let device = Arc::new(DummyDevice::new());
        let config = RendererConfig::default().with_frames_in_flight(2);
        let mut renderer = Renderer::new(device, config);
        renderer.prepare(&test_scene()).unwrap();

        assert!(renderer.record_frame(1).is_ok());
        assert!(matches!(
            renderer.record_frame(2),
            Err(RenderError::InvalidParameter(_))
        ));
        renderer.teardown();
    }

    #[test]
    fn test_prepare_failure_leaves_nothing_allocated() {
        use crate::capability::DeviceFeatures;

        let mut features = DeviceFeatures::all();
        features.dynamic_logic_op = false;
        let device = Arc::new(DummyDevice::with_features(features));
        let mut renderer = Renderer::new(device.clone(), RendererConfig::default());

        let err = renderer.prepare(&test_scene()).unwrap_err();
        assert!(matches!(err, RenderError::MissingCapability(_)));
        assert_eq!(renderer.state(), RendererState::Uninitialized);
        assert_eq!(device.live_resource_count(), 0);
    }
}
