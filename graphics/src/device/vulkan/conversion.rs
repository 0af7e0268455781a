//! Type conversions between renderer types and Vulkan types.

use ash::vk;

use marigold_core::mesh::{IndexFormat, PrimitiveTopology};

use crate::bindings::{BindingType, ShaderStageFlags};
use crate::device::{AddressMode, BufferUsage, FilterMode};
use crate::dynamic_state::{DynamicStateSet, LogicOp};
use crate::pipeline::{BlendMode, CompareOp, CullMode, FrontFace};

/// Convert BufferUsage to Vulkan buffer usage flags.
pub fn convert_buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    match usage {
        BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
        BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
        BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
    }
}

/// Convert LogicOp to the Vulkan logic operation.
pub fn convert_logic_op(op: LogicOp) -> vk::LogicOp {
    match op {
        LogicOp::Clear => vk::LogicOp::CLEAR,
        LogicOp::And => vk::LogicOp::AND,
        LogicOp::AndReverse => vk::LogicOp::AND_REVERSE,
        LogicOp::Copy => vk::LogicOp::COPY,
        LogicOp::AndInverted => vk::LogicOp::AND_INVERTED,
        LogicOp::NoOp => vk::LogicOp::NO_OP,
        LogicOp::Xor => vk::LogicOp::XOR,
        LogicOp::Or => vk::LogicOp::OR,
        LogicOp::Nor => vk::LogicOp::NOR,
        LogicOp::Equivalent => vk::LogicOp::EQUIVALENT,
        LogicOp::Invert => vk::LogicOp::INVERT,
        LogicOp::OrReverse => vk::LogicOp::OR_REVERSE,
        LogicOp::CopyInverted => vk::LogicOp::COPY_INVERTED,
        LogicOp::OrInverted => vk::LogicOp::OR_INVERTED,
        LogicOp::Nand => vk::LogicOp::NAND,
        LogicOp::Set => vk::LogicOp::SET,
    }
}

/// Convert PrimitiveTopology to the Vulkan topology.
pub fn convert_topology(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
    }
}

/// Convert IndexFormat to the Vulkan index type.
pub fn convert_index_format(format: IndexFormat) -> vk::IndexType {
    match format {
        IndexFormat::Uint16 => vk::IndexType::UINT16,
        IndexFormat::Uint32 => vk::IndexType::UINT32,
    }
}

/// Convert CullMode to Vulkan cull mode flags.
pub fn convert_cull_mode(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

/// Convert FrontFace to the Vulkan front face.
pub fn convert_front_face(face: FrontFace) -> vk::FrontFace {
    match face {
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
    }
}

/// Convert CompareOp to the Vulkan compare op.
pub fn convert_compare_op(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

/// Convert FilterMode to the Vulkan filter.
pub fn convert_filter_mode(mode: FilterMode) -> vk::Filter {
    match mode {
        FilterMode::Nearest => vk::Filter::NEAREST,
        FilterMode::Linear => vk::Filter::LINEAR,
    }
}

/// Convert FilterMode to the Vulkan mipmap filter mode.
pub fn convert_mipmap_filter_mode(mode: FilterMode) -> vk::SamplerMipmapMode {
    match mode {
        FilterMode::Nearest => vk::SamplerMipmapMode::NEAREST,
        FilterMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

/// Convert AddressMode to the Vulkan sampler address mode.
pub fn convert_address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
    }
}

/// Convert shader stage flags to Vulkan stage flags.
pub fn convert_shader_stage_flags(flags: ShaderStageFlags) -> vk::ShaderStageFlags {
    let mut result = vk::ShaderStageFlags::empty();
    if flags.contains(ShaderStageFlags::VERTEX) {
        result |= vk::ShaderStageFlags::VERTEX;
    }
    if flags.contains(ShaderStageFlags::FRAGMENT) {
        result |= vk::ShaderStageFlags::FRAGMENT;
    }
    result
}

/// Convert BindingType to the Vulkan descriptor type.
pub fn convert_binding_type(binding_type: BindingType) -> vk::DescriptorType {
    match binding_type {
        BindingType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        BindingType::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    }
}

/// Convert BlendMode to a color blend attachment state.
pub fn convert_blend_mode(mode: BlendMode) -> vk::PipelineColorBlendAttachmentState {
    match mode {
        BlendMode::Disabled => vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false),
        BlendMode::Alpha => vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .alpha_blend_op(vk::BlendOp::ADD),
    }
}

/// Convert a sample count to Vulkan sample count flags.
pub fn convert_sample_count(count: u32) -> vk::SampleCountFlags {
    match count {
        1 => vk::SampleCountFlags::TYPE_1,
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

/// Convert a declared dynamic-state set to the Vulkan dynamic state list.
///
/// The order is fixed so pipeline creation is deterministic. Logic op uses
/// the EXT constant: unlike the toggles, it was never promoted to core.
pub fn convert_dynamic_states(states: DynamicStateSet) -> Vec<vk::DynamicState> {
    let mut result = Vec::new();
    if states.contains(DynamicStateSet::VIEWPORT) {
        result.push(vk::DynamicState::VIEWPORT);
    }
    if states.contains(DynamicStateSet::SCISSOR) {
        result.push(vk::DynamicState::SCISSOR);
    }
    if states.contains(DynamicStateSet::PRIMITIVE_TOPOLOGY) {
        result.push(vk::DynamicState::PRIMITIVE_TOPOLOGY);
    }
    if states.contains(DynamicStateSet::PRIMITIVE_RESTART_ENABLE) {
        result.push(vk::DynamicState::PRIMITIVE_RESTART_ENABLE);
    }
    if states.contains(DynamicStateSet::RASTERIZER_DISCARD_ENABLE) {
        result.push(vk::DynamicState::RASTERIZER_DISCARD_ENABLE);
    }
    if states.contains(DynamicStateSet::DEPTH_BIAS_ENABLE) {
        result.push(vk::DynamicState::DEPTH_BIAS_ENABLE);
    }
    if states.contains(DynamicStateSet::LOGIC_OP) {
        result.push(vk::DynamicState::LOGIC_OP_EXT);
    }
    result
}
