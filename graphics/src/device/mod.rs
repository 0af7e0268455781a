//! Device abstraction the renderer records against.
//!
//! A [`RenderDevice`] owns GPU resources behind small copyable ids and
//! executes recorded [`CommandSequence`]s. Two implementations ship:
//!
//! - [`dummy::DummyDevice`] keeps everything in host memory and journals
//!   executed commands, which is what the test suite runs on;
//! - [`vulkan::VulkanDevice`] is the real backend built on `ash` with the
//!   extended dynamic state extensions.
//!
//! Resource creation happens once during preparation; per-frame work is
//! uniform writes and sequence execution only.

use marigold_core::mesh::{CpuMesh, IndexFormat};
use marigold_core::texture::CpuTexture;

use crate::bindings::BindingLayout;
use crate::capability::DeviceFeatures;
use crate::commands::CommandSequence;
use crate::error::RenderError;
use crate::pipeline::{PipelineDescription, ShaderSet};

#[cfg(feature = "dummy")]
pub mod dummy;
#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

// ============================================================================
// Resource identifiers
// ============================================================================

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(u32);

        impl $name {
            /// Wrap a raw backend slot index.
            pub fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            /// Raw backend slot index.
            pub fn to_raw(self) -> u32 {
                self.0
            }
        }
    };
}

resource_id!(
    /// Handle to a device buffer.
    BufferId
);
resource_id!(
    /// Handle to a device texture.
    TextureId
);
resource_id!(
    /// Handle to a texture sampler.
    SamplerId
);
resource_id!(
    /// Handle to a binding layout (descriptor-set layout).
    BindingLayoutId
);
resource_id!(
    /// Handle to a bound descriptor set.
    DescriptorSetId
);
resource_id!(
    /// Handle to a compiled pipeline.
    PipelineId
);

// ============================================================================
// Creation descriptors
// ============================================================================

/// What a buffer will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Bound as a uniform buffer.
    Uniform,
    /// Bound as a vertex buffer.
    Vertex,
    /// Bound as an index buffer.
    Index,
}

/// Parameters for [`RenderDevice::create_buffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    /// Debug label carried into backend object names.
    pub label: String,
    /// Size in bytes, must be non-zero.
    pub size: u64,
    /// Intended usage.
    pub usage: BufferUsage,
}

/// Texel filtering for samplers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FilterMode {
    /// Nearest-texel lookup.
    Nearest,
    /// Linear interpolation.
    #[default]
    Linear,
}

/// Addressing outside the [0, 1] range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AddressMode {
    /// Repeat the texture.
    Repeat,
    /// Clamp to the edge texel.
    #[default]
    ClampToEdge,
}

/// Parameters for [`RenderDevice::create_sampler`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    /// Minification and magnification filter.
    pub filter: FilterMode,
    /// Addressing mode on all axes.
    pub address_mode: AddressMode,
}

/// A concrete resource written into a descriptor set, matched positionally
/// against the [`BindingLayout`] entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundResource {
    /// Whole-buffer uniform binding.
    UniformBuffer(BufferId),
    /// Sampled texture with its sampler.
    CombinedImageSampler {
        /// Texture to sample.
        texture: TextureId,
        /// Sampler state.
        sampler: SamplerId,
    },
}

/// Device-side geometry: the two vertex streams plus indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuGeometry {
    /// Position stream, bound at slot 0.
    pub positions: BufferId,
    /// Normal stream, bound at slot 1.
    pub normals: BufferId,
    /// Index buffer.
    pub indices: BufferId,
    /// Element width of the index buffer.
    pub index_format: IndexFormat,
    /// Number of indices to draw.
    pub index_count: u32,
}

// ============================================================================
// Device trait
// ============================================================================

/// Backend contract: resource arenas plus command-sequence execution.
///
/// All methods take `&self`; implementations guard internal state so a
/// device can be shared behind an [`Arc`](std::sync::Arc).
pub trait RenderDevice: Send + Sync {
    /// Human-readable adapter name for logs.
    fn name(&self) -> &str;

    /// Dynamic-state feature bits the device actually supports.
    fn features(&self) -> DeviceFeatures;

    /// Allocate a buffer.
    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferId, RenderError>;

    /// Upload `data` at offset zero. The previous frame using the buffer
    /// must have completed; the renderer waits before its write pass.
    fn write_buffer(&self, buffer: BufferId, data: &[u8]) -> Result<(), RenderError>;

    /// Upload a texture with its pixel data.
    fn create_texture(&self, texture: &CpuTexture) -> Result<TextureId, RenderError>;

    /// Create a sampler.
    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerId, RenderError>;

    /// Create a descriptor-set layout from `layout`.
    fn create_binding_layout(&self, layout: &BindingLayout)
        -> Result<BindingLayoutId, RenderError>;

    /// Allocate a descriptor set over `layout` and write `resources` into
    /// it, one per layout entry in declaration order.
    fn create_descriptor_set(
        &self,
        layout: BindingLayoutId,
        resources: &[BoundResource],
    ) -> Result<DescriptorSetId, RenderError>;

    /// Compile a pipeline from its fixed-function description and shaders.
    fn create_pipeline(
        &self,
        desc: &PipelineDescription,
        shaders: &ShaderSet,
        layout: BindingLayoutId,
    ) -> Result<PipelineId, RenderError>;

    /// Execute one recorded frame. An empty sequence is a no-op.
    fn execute(&self, sequence: &CommandSequence) -> Result<(), RenderError>;

    /// Block until all submitted work has finished.
    fn wait_idle(&self);

    /// Release a buffer.
    fn destroy_buffer(&self, buffer: BufferId);

    /// Release a texture.
    fn destroy_texture(&self, texture: TextureId);

    /// Release a sampler.
    fn destroy_sampler(&self, sampler: SamplerId);

    /// Release a binding layout.
    fn destroy_binding_layout(&self, layout: BindingLayoutId);

    /// Release a descriptor set.
    fn destroy_descriptor_set(&self, set: DescriptorSetId);

    /// Release a pipeline.
    fn destroy_pipeline(&self, pipeline: PipelineId);

    /// Upload a mesh as position, normal and index buffers.
    ///
    /// A failure partway through releases the buffers already created by
    /// this call, so the caller never has to track a half-built geometry.
    fn create_geometry(&self, mesh: &CpuMesh) -> Result<GpuGeometry, RenderError> {
        if !mesh.is_complete() {
            return Err(RenderError::InvalidParameter(format!(
                "mesh '{}' is missing positions, normals or indices",
                mesh.label().unwrap_or("unnamed")
            )));
        }
        let label = mesh.label().unwrap_or("mesh");

        let positions = self.create_buffer(&BufferDesc {
            label: format!("{label} positions"),
            size: mesh.position_bytes().len() as u64,
            usage: BufferUsage::Vertex,
        })?;

        let normals = match self.create_buffer(&BufferDesc {
            label: format!("{label} normals"),
            size: mesh.normal_bytes().len() as u64,
            usage: BufferUsage::Vertex,
        }) {
            Ok(buffer) => buffer,
            Err(err) => {
                self.destroy_buffer(positions);
                return Err(err);
            }
        };

        let indices = match self.create_buffer(&BufferDesc {
            label: format!("{label} indices"),
            size: mesh.index_bytes().len() as u64,
            usage: BufferUsage::Index,
        }) {
            Ok(buffer) => buffer,
            Err(err) => {
                self.destroy_buffer(normals);
                self.destroy_buffer(positions);
                return Err(err);
            }
        };

        let geometry = GpuGeometry {
            positions,
            normals,
            indices,
            index_format: mesh.index_format(),
            index_count: mesh.index_count(),
        };

        if let Err(err) = self
            .write_buffer(positions, mesh.position_bytes())
            .and_then(|_| self.write_buffer(normals, mesh.normal_bytes()))
            .and_then(|_| self.write_buffer(indices, mesh.index_bytes()))
        {
            self.destroy_geometry(&geometry);
            return Err(err);
        }

        Ok(geometry)
    }

    /// Release the three buffers of an uploaded geometry.
    fn destroy_geometry(&self, geometry: &GpuGeometry) {
        self.destroy_buffer(geometry.positions);
        self.destroy_buffer(geometry.normals);
        self.destroy_buffer(geometry.indices);
    }
}

static_assertions::assert_impl_all!(BufferId: Send, Sync);
static_assertions::assert_impl_all!(GpuGeometry: Send, Sync);
