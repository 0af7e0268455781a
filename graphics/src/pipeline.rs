//! Pipeline variants and their fixed-function descriptions.
//!
//! The renderer owns exactly two pipelines, identified by [`PipelineVariant`]
//! and stored in the fixed-size [`PipelineTable`]. [`describe`] builds the
//! fixed-function state for a variant from one shared base template: the
//! object and background descriptions differ only in winding, logic-op
//! enablement, and which state categories are declared dynamic. Categories
//! the device cannot toggle dynamically stay baked, so a description is
//! complete regardless of capabilities — the recorder simply emits no
//! command for baked categories.
//!
//! Construction is one-time: a description is immutable once built, and a
//! lost device means prepare runs again from scratch.

use std::ops::{Index, IndexMut};

use marigold_core::mesh::PrimitiveTopology;

use crate::bindings::{BindingLayout, PushConstantRange};
use crate::capability::DynamicCapabilities;
use crate::dynamic_state::DynamicStateSet;

// ============================================================================
// Variant enumeration and table
// ============================================================================

/// Identifies one of the renderer's two pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineVariant {
    /// Scene objects: culled, depth-tested, alpha-blended, logic-op capable.
    Object,
    /// Environment proxy drawn once after the objects.
    Background,
}

impl PipelineVariant {
    /// Number of variants; the size of every [`PipelineTable`].
    pub const COUNT: usize = 2;

    /// All variants in draw order.
    pub const ALL: [PipelineVariant; Self::COUNT] =
        [PipelineVariant::Object, PipelineVariant::Background];

    /// Stable table index of this variant.
    pub fn index(self) -> usize {
        match self {
            Self::Object => 0,
            Self::Background => 1,
        }
    }

    /// Display name for logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Background => "background",
        }
    }
}

/// Fixed-size storage indexed by [`PipelineVariant`].
///
/// Replaces ad hoc struct-of-handles state: every per-variant resource
/// (descriptions, device pipelines, descriptor sets, uniform buffers) lives
/// in one of these, making "which variant" explicit at each call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineTable<T> {
    slots: [T; PipelineVariant::COUNT],
}

impl<T> PipelineTable<T> {
    /// Build a table by invoking `f` for each variant in order.
    pub fn from_fn(mut f: impl FnMut(PipelineVariant) -> T) -> Self {
        Self {
            slots: PipelineVariant::ALL.map(&mut f),
        }
    }

    /// Build a table from fallible construction, stopping at the first error.
    pub fn try_from_fn<E>(
        mut f: impl FnMut(PipelineVariant) -> Result<T, E>,
    ) -> Result<Self, E> {
        Ok(Self {
            slots: [f(PipelineVariant::Object)?, f(PipelineVariant::Background)?],
        })
    }

    /// Iterate variants and their entries in table order.
    pub fn iter(&self) -> impl Iterator<Item = (PipelineVariant, &T)> {
        PipelineVariant::ALL.iter().map(|&v| (v, &self.slots[v.index()]))
    }
}

impl<T> Index<PipelineVariant> for PipelineTable<T> {
    type Output = T;

    fn index(&self, variant: PipelineVariant) -> &T {
        &self.slots[variant.index()]
    }
}

impl<T> IndexMut<PipelineVariant> for PipelineTable<T> {
    fn index_mut(&mut self, variant: PipelineVariant) -> &mut T {
        &mut self.slots[variant.index()]
    }
}

// ============================================================================
// Fixed-function state values
// ============================================================================

/// Face culling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    /// No culling.
    None,
    /// Cull front faces.
    Front,
    /// Cull back faces.
    Back,
}

/// Which winding order counts as front-facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    /// Clockwise winding is front-facing.
    Clockwise,
    /// Counter-clockwise winding is front-facing.
    CounterClockwise,
}

/// Depth comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// Never passes.
    Never,
    /// Passes when incoming < stored.
    Less,
    /// Passes when incoming == stored.
    Equal,
    /// Passes when incoming <= stored.
    LessOrEqual,
    /// Passes when incoming > stored. The reversed-depth workhorse.
    Greater,
    /// Passes when incoming != stored.
    NotEqual,
    /// Passes when incoming >= stored.
    GreaterOrEqual,
    /// Always passes.
    Always,
}

/// Color blend configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Blending disabled, source overwrites.
    Disabled,
    /// Standard non-premultiplied alpha blending.
    Alpha,
}

// ============================================================================
// Vertex input
// ============================================================================

/// One vertex buffer slot consumed by a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferDesc {
    /// Binding slot index.
    pub binding: u32,
    /// Byte stride between vertices.
    pub stride: u32,
}

/// One vertex attribute read by the vertex stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttributeDesc {
    /// Shader location.
    pub location: u32,
    /// Vertex buffer slot supplying the data.
    pub binding: u32,
    /// Byte offset within the element.
    pub offset: u32,
}

/// The fixed two-buffer vertex input: positions at location 0, normals at
/// location 1, one `[f32; 3]` attribute per buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexInputLayout {
    /// Buffer slots in binding order.
    pub buffers: Vec<VertexBufferDesc>,
    /// Attributes in location order.
    pub attributes: Vec<VertexAttributeDesc>,
}

impl VertexInputLayout {
    /// The position/normal layout both variants consume.
    pub fn position_normal() -> Self {
        Self {
            buffers: vec![
                VertexBufferDesc { binding: 0, stride: 12 },
                VertexBufferDesc { binding: 1, stride: 12 },
            ],
            attributes: vec![
                VertexAttributeDesc { location: 0, binding: 0, offset: 0 },
                VertexAttributeDesc { location: 1, binding: 1, offset: 0 },
            ],
        }
    }
}

// ============================================================================
// Shader stages
// ============================================================================

/// SPIR-V words for one pipeline's vertex and fragment stages.
///
/// Shader binaries come from the asset collaborator; the in-memory device
/// used by tests accepts empty sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderSet {
    /// Vertex stage SPIR-V.
    pub vertex: Vec<u32>,
    /// Fragment stage SPIR-V.
    pub fragment: Vec<u32>,
}

impl ShaderSet {
    /// Create from SPIR-V words.
    pub fn new(vertex: Vec<u32>, fragment: Vec<u32>) -> Self {
        Self { vertex, fragment }
    }

    /// True when both stages carry code.
    pub fn is_complete(&self) -> bool {
        !self.vertex.is_empty() && !self.fragment.is_empty()
    }
}

// ============================================================================
// Pipeline description
// ============================================================================

/// Complete fixed-function description of one pipeline variant.
///
/// Categories listed in `dynamic` are set by the recorder in the command
/// stream; everything else is baked. The baked `topology` and
/// `primitive_restart` fields double as the recorder's baseline values when
/// those categories are dynamic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDescription {
    /// Which variant this describes.
    pub variant: PipelineVariant,
    /// Baked primitive topology (and dynamic baseline).
    pub topology: PrimitiveTopology,
    /// Baked primitive restart (and dynamic baseline).
    pub primitive_restart: bool,
    /// Face culling.
    pub cull_mode: CullMode,
    /// Front-face winding.
    pub front_face: FrontFace,
    /// Depth test enable.
    pub depth_test: bool,
    /// Depth write enable.
    pub depth_write: bool,
    /// Depth comparison; `Greater` under the reversed-depth convention.
    pub depth_compare: CompareOp,
    /// Color blend mode.
    pub blend: BlendMode,
    /// Whether framebuffer logic operations replace blending. The operation
    /// itself is always dynamic; only the enablement is baked.
    pub logic_op_enable: bool,
    /// MSAA sample count.
    pub sample_count: u32,
    /// Vertex buffer and attribute layout.
    pub vertex_input: VertexInputLayout,
    /// Descriptor-set layout this pipeline's draws bind against.
    pub binding_layout: BindingLayout,
    /// Push-constant range shared by both variants.
    pub push_constants: PushConstantRange,
    /// Categories set in the command stream instead of baked.
    pub dynamic: DynamicStateSet,
}

/// Shared base template both variants start from.
fn base_description(variant: PipelineVariant) -> PipelineDescription {
    PipelineDescription {
        variant,
        topology: PrimitiveTopology::TriangleList,
        primitive_restart: false,
        cull_mode: CullMode::Back,
        front_face: FrontFace::Clockwise,
        depth_test: true,
        depth_write: true,
        depth_compare: CompareOp::Greater,
        blend: BlendMode::Alpha,
        logic_op_enable: false,
        sample_count: 1,
        vertex_input: VertexInputLayout::position_normal(),
        binding_layout: BindingLayout::object(),
        push_constants: PushConstantRange::block(),
        dynamic: DynamicStateSet::BASELINE,
    }
}

/// Build the fixed-function description for `variant` under the negotiated
/// capabilities.
///
/// Object: logic op enabled (the operation stays dynamic), plus every
/// optional category the device can toggle. Background: counter-clockwise
/// front face for the inside-out proxy winding, viewport/scissor only —
/// logic op and the per-object toggles never apply to it.
pub fn describe(variant: PipelineVariant, caps: &DynamicCapabilities) -> PipelineDescription {
    let mut desc = base_description(variant);
    match variant {
        PipelineVariant::Object => {
            desc.logic_op_enable = true;
            desc.dynamic = DynamicStateSet::BASELINE
                | DynamicStateSet::LOGIC_OP
                | caps.optional_states();
        }
        PipelineVariant::Background => {
            desc.front_face = FrontFace::CounterClockwise;
            desc.binding_layout = BindingLayout::background();
            desc.dynamic = DynamicStateSet::BASELINE;
        }
    }
    desc
}
