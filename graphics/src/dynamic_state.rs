//! Declarative dynamic fixed-function state.
//!
//! Each pipeline variant declares up front which fixed-function categories
//! are set in the command stream instead of baked into the pipeline object
//! ([`DynamicStateSet`]). The frame recorder applies exactly the declared
//! set every frame: baseline values before the first draw of a variant,
//! per-entry values for the transient toggles, and a disabled reset for the
//! transient toggles once the object pass ends. Nothing else ever touches
//! dynamic state, which keeps the command stream deterministic.

bitflags::bitflags! {
    /// Fixed-function state categories a pipeline may declare dynamic.
    ///
    /// Iteration order of [`iter`](DynamicStateSet::iter) is bit order,
    /// i.e. the declaration order below.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DynamicStateSet: u32 {
        /// Viewport rectangle. Baseline dynamic state, declared by every
        /// variant.
        const VIEWPORT = 1 << 0;
        /// Scissor rectangle. Baseline dynamic state, declared by every
        /// variant.
        const SCISSOR = 1 << 1;
        /// Primitive topology (requires the extended-dynamic-state
        /// capability).
        const PRIMITIVE_TOPOLOGY = 1 << 2;
        /// Primitive restart enable (requires extended-dynamic-state v2).
        const PRIMITIVE_RESTART_ENABLE = 1 << 3;
        /// Rasterizer discard enable, a transient per-draw toggle
        /// (requires extended-dynamic-state v2).
        const RASTERIZER_DISCARD_ENABLE = 1 << 4;
        /// Depth bias enable, a transient per-draw toggle
        /// (requires extended-dynamic-state v2).
        const DEPTH_BIAS_ENABLE = 1 << 5;
        /// Framebuffer logic operation (requires the logic-op feature of
        /// extended-dynamic-state v2). Mandatory for the object variant.
        const LOGIC_OP = 1 << 6;
    }
}

impl DynamicStateSet {
    /// The two categories every variant declares dynamic regardless of
    /// device capabilities.
    pub const BASELINE: Self = Self::VIEWPORT.union(Self::SCISSOR);

    /// The transient per-draw toggles that must be reset to disabled after
    /// the pass that used them.
    pub const TRANSIENT_TOGGLES: Self = Self::RASTERIZER_DISCARD_ENABLE.union(Self::DEPTH_BIAS_ENABLE);
}

/// Framebuffer logic operation applied between fragment output and the
/// existing framebuffer value, replacing arithmetic blending while enabled.
///
/// The full fixed-function set; the background pass never uses any of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LogicOp {
    /// Clear destination to zero.
    Clear,
    /// `src & dst`
    And,
    /// `src & !dst`
    AndReverse,
    /// Copy source (the neutral operation).
    #[default]
    Copy,
    /// `!src & dst`
    AndInverted,
    /// Keep destination untouched.
    NoOp,
    /// `src ^ dst`
    Xor,
    /// `src | dst`
    Or,
    /// `!(src | dst)`
    Nor,
    /// `!(src ^ dst)`
    Equivalent,
    /// `!dst`
    Invert,
    /// `src | !dst`
    OrReverse,
    /// `!src`
    CopyInverted,
    /// `!src | dst`
    OrInverted,
    /// `!(src & dst)`
    Nand,
    /// Set destination to all ones.
    Set,
}

impl LogicOp {
    /// All operations in fixed-function order, for UI selection lists.
    pub const ALL: [LogicOp; 16] = [
        LogicOp::Clear,
        LogicOp::And,
        LogicOp::AndReverse,
        LogicOp::Copy,
        LogicOp::AndInverted,
        LogicOp::NoOp,
        LogicOp::Xor,
        LogicOp::Or,
        LogicOp::Nor,
        LogicOp::Equivalent,
        LogicOp::Invert,
        LogicOp::OrReverse,
        LogicOp::CopyInverted,
        LogicOp::OrInverted,
        LogicOp::Nand,
        LogicOp::Set,
    ];

    /// Display name used by selection UIs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::And => "And",
            Self::AndReverse => "AndReverse",
            Self::Copy => "Copy",
            Self::AndInverted => "AndInverted",
            Self::NoOp => "NoOp",
            Self::Xor => "Xor",
            Self::Or => "Or",
            Self::Nor => "Nor",
            Self::Equivalent => "Equivalent",
            Self::Invert => "Invert",
            Self::OrReverse => "OrReverse",
            Self::CopyInverted => "CopyInverted",
            Self::OrInverted => "OrInverted",
            Self::Nand => "Nand",
            Self::Set => "Set",
        }
    }
}
