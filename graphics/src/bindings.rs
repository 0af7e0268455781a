//! Descriptor binding layouts and the push-constant range.
//!
//! The wire contract with the device is fixed: the object pass binds one
//! uniform buffer, the background pass binds a uniform buffer plus the
//! environment image, and both pipeline layouts carry the same 80-byte
//! push-constant block. The constructors here are the single source of
//! truth for that contract; the pipeline builder and the resource binder
//! both consume them, which is what keeps descriptor sets and pipeline
//! layouts structurally matched.

use crate::uniforms::PushConstantBlock;

bitflags::bitflags! {
    /// Shader stages that can access a binding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        /// Vertex shader stage.
        const VERTEX = 1 << 0;
        /// Fragment shader stage.
        const FRAGMENT = 1 << 1;
    }
}

/// Type of resource bound at a descriptor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    /// Uniform buffer (small, refreshed when the camera moves).
    UniformBuffer,
    /// Combined image and sampler (the background environment texture).
    CombinedImageSampler,
}

/// A single binding slot in a layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingLayoutEntry {
    /// Binding index within the set.
    pub binding: u32,
    /// Resource type expected at this binding.
    pub binding_type: BindingType,
    /// Shader stages that can access this binding.
    pub visibility: ShaderStageFlags,
}

impl BindingLayoutEntry {
    /// Create an entry visible to the given stages.
    pub fn new(binding: u32, binding_type: BindingType, visibility: ShaderStageFlags) -> Self {
        Self {
            binding,
            binding_type,
            visibility,
        }
    }
}

/// Descriptor-set layout for one pipeline variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingLayout {
    /// The binding entries in this layout, ordered by binding index.
    pub entries: Vec<BindingLayoutEntry>,
    /// Label for debugging.
    pub label: &'static str,
}

impl BindingLayout {
    /// Layout for the object pass: one uniform buffer at binding 0,
    /// vertex stage.
    pub fn object() -> Self {
        Self {
            entries: vec![BindingLayoutEntry::new(
                0,
                BindingType::UniformBuffer,
                ShaderStageFlags::VERTEX,
            )],
            label: "object",
        }
    }

    /// Layout for the background pass: uniform buffer at binding 0 (vertex
    /// stage) and the environment image at binding 1 (fragment stage).
    pub fn background() -> Self {
        Self {
            entries: vec![
                BindingLayoutEntry::new(0, BindingType::UniformBuffer, ShaderStageFlags::VERTEX),
                BindingLayoutEntry::new(
                    1,
                    BindingType::CombinedImageSampler,
                    ShaderStageFlags::FRAGMENT,
                ),
            ],
            label: "background",
        }
    }
}

/// Push-constant range shared by both pipeline layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushConstantRange {
    /// Stages that read the block.
    pub stages: ShaderStageFlags,
    /// Byte offset of the block.
    pub offset: u32,
    /// Byte size of the block.
    pub size: u32,
}

impl PushConstantRange {
    /// The renderer's single push-constant block: per-draw transform and
    /// color, vertex stage, offset 0.
    pub fn block() -> Self {
        Self {
            stages: ShaderStageFlags::VERTEX,
            offset: 0,
            size: std::mem::size_of::<PushConstantBlock>() as u32,
        }
    }
}
