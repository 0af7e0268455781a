//! Vulkan descriptor and graphics pipeline creation.
//!
//! Pipelines are described once by [`PipelineDescription`] and compiled
//! here; everything the description declares dynamic is left to the
//! recorder, everything else is baked into the pipeline object.

use ash::vk;

use crate::bindings::{BindingLayout, PushConstantRange};
use crate::error::RenderError;
use crate::pipeline::{PipelineDescription, ShaderSet};

use super::conversion::{
    convert_binding_type, convert_blend_mode, convert_compare_op, convert_cull_mode,
    convert_dynamic_states, convert_front_face, convert_sample_count, convert_shader_stage_flags,
    convert_topology,
};

/// Create a descriptor pool sized for this renderer's fixed set layouts.
///
/// FREE_DESCRIPTOR_SET is required because sets are released individually
/// through the device arena rather than by pool reset.
pub(super) fn create_descriptor_pool(
    device: &ash::Device,
) -> Result<vk::DescriptorPool, RenderError> {
    let pool_sizes = [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 16,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 8,
        },
    ];

    let pool_info = vk::DescriptorPoolCreateInfo::default()
        .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        .max_sets(16)
        .pool_sizes(&pool_sizes);

    let descriptor_pool =
        unsafe { device.create_descriptor_pool(&pool_info, None) }.map_err(|e| {
            RenderError::ResourceCreation(format!("Failed to create descriptor pool: {:?}", e))
        })?;

    Ok(descriptor_pool)
}

/// Create a descriptor set layout from a binding layout.
pub(super) fn create_descriptor_set_layout(
    device: &ash::Device,
    layout: &BindingLayout,
) -> Result<vk::DescriptorSetLayout, RenderError> {
    let bindings: Vec<vk::DescriptorSetLayoutBinding> = layout
        .entries
        .iter()
        .map(|entry| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(entry.binding)
                .descriptor_type(convert_binding_type(entry.binding_type))
                .descriptor_count(1)
                .stage_flags(convert_shader_stage_flags(entry.visibility))
        })
        .collect();

    let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

    let layout = unsafe { device.create_descriptor_set_layout(&create_info, None) }.map_err(
        |e| {
            RenderError::ResourceCreation(format!(
                "Failed to create descriptor set layout: {:?}",
                e
            ))
        },
    )?;

    Ok(layout)
}

/// Allocate one descriptor set from the pool.
pub(super) fn allocate_descriptor_set(
    device: &ash::Device,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
) -> Result<vk::DescriptorSet, RenderError> {
    let layouts = [layout];
    let alloc_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(&layouts);

    let sets = unsafe { device.allocate_descriptor_sets(&alloc_info) }.map_err(|e| {
        RenderError::ResourceCreation(format!("Failed to allocate descriptor set: {:?}", e))
    })?;

    Ok(sets[0])
}

/// Create a pipeline layout over one set layout plus the push-constant range.
pub(super) fn create_pipeline_layout(
    device: &ash::Device,
    set_layout: vk::DescriptorSetLayout,
    push_constants: &PushConstantRange,
) -> Result<vk::PipelineLayout, RenderError> {
    let set_layouts = [set_layout];
    let push_constant_ranges = [vk::PushConstantRange {
        stage_flags: convert_shader_stage_flags(push_constants.stages),
        offset: push_constants.offset,
        size: push_constants.size,
    }];

    let create_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(&set_layouts)
        .push_constant_ranges(&push_constant_ranges);

    let layout =
        unsafe { device.create_pipeline_layout(&create_info, None) }.map_err(|e| {
            RenderError::ResourceCreation(format!("Failed to create pipeline layout: {:?}", e))
        })?;

    Ok(layout)
}

/// Create a shader module from SPIR-V words.
fn create_shader_module(
    device: &ash::Device,
    spirv: &[u32],
    stage: &str,
) -> Result<vk::ShaderModule, RenderError> {
    if spirv.is_empty() {
        return Err(RenderError::InvalidParameter(format!(
            "{} shader is empty",
            stage
        )));
    }

    let create_info = vk::ShaderModuleCreateInfo::default().code(spirv);

    let module = unsafe { device.create_shader_module(&create_info, None) }.map_err(|e| {
        RenderError::ResourceCreation(format!("Failed to create {} shader module: {:?}", stage, e))
    })?;

    Ok(module)
}

/// Create a graphics pipeline for dynamic rendering.
///
/// The fixed-function blocks come straight from the description; the
/// dynamic-state list is the description's declared set, so a pipeline
/// built from a capability-narrowed description bakes the missing
/// categories automatically.
pub(super) fn create_graphics_pipeline(
    device: &ash::Device,
    desc: &PipelineDescription,
    shaders: &ShaderSet,
    pipeline_layout: vk::PipelineLayout,
    color_format: vk::Format,
    depth_format: vk::Format,
) -> Result<vk::Pipeline, RenderError> {
    let vertex_module = create_shader_module(device, &shaders.vertex, "vertex")?;
    let fragment_module = match create_shader_module(device, &shaders.fragment, "fragment") {
        Ok(module) => module,
        Err(e) => {
            unsafe { device.destroy_shader_module(vertex_module, None) };
            return Err(e);
        }
    };

    let result = build_pipeline(
        device,
        desc,
        vertex_module,
        fragment_module,
        pipeline_layout,
        color_format,
        depth_format,
    );

    // Modules are only needed during pipeline creation.
    unsafe {
        device.destroy_shader_module(vertex_module, None);
        device.destroy_shader_module(fragment_module, None);
    }

    result
}

fn build_pipeline(
    device: &ash::Device,
    desc: &PipelineDescription,
    vertex_module: vk::ShaderModule,
    fragment_module: vk::ShaderModule,
    pipeline_layout: vk::PipelineLayout,
    color_format: vk::Format,
    depth_format: vk::Format,
) -> Result<vk::Pipeline, RenderError> {
    let entry_point = c"main";

    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_module)
            .name(entry_point),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment_module)
            .name(entry_point),
    ];

    // Both vertex streams are tightly packed vec3s.
    let binding_descriptions: Vec<vk::VertexInputBindingDescription> = desc
        .vertex_input
        .buffers
        .iter()
        .map(|buffer| {
            vk::VertexInputBindingDescription::default()
                .binding(buffer.binding)
                .stride(buffer.stride)
                .input_rate(vk::VertexInputRate::VERTEX)
        })
        .collect();

    let attribute_descriptions: Vec<vk::VertexInputAttributeDescription> = desc
        .vertex_input
        .attributes
        .iter()
        .map(|attr| {
            vk::VertexInputAttributeDescription::default()
                .location(attr.location)
                .binding(attr.binding)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(attr.offset)
        })
        .collect();

    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&binding_descriptions)
        .vertex_attribute_descriptions(&attribute_descriptions);

    // Static values double as the baked fallback when a category is not
    // in the dynamic set.
    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(convert_topology(desc.topology))
        .primitive_restart_enable(desc.primitive_restart);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(convert_cull_mode(desc.cull_mode))
        .front_face(convert_front_face(desc.front_face))
        .depth_bias_enable(false);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(convert_sample_count(desc.sample_count));

    let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(desc.depth_test)
        .depth_write_enable(desc.depth_write)
        .depth_compare_op(convert_compare_op(desc.depth_compare))
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

    let color_blend_attachments = [convert_blend_mode(desc.blend)];

    // The logic op value is a placeholder: when enabled it is always in
    // the dynamic set and the recorder supplies the real value.
    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(desc.logic_op_enable)
        .logic_op(vk::LogicOp::COPY)
        .attachments(&color_blend_attachments);

    let dynamic_states = convert_dynamic_states(desc.dynamic);
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let color_attachment_formats = [color_format];
    let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&color_attachment_formats)
        .depth_attachment_format(depth_format);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .depth_stencil_state(&depth_stencil_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(pipeline_layout)
        .push_next(&mut rendering_info);

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, e)| {
        RenderError::ResourceCreation(format!(
            "Failed to create {} pipeline: {:?}",
            desc.variant.name(),
            e
        ))
    })?;

    Ok(pipelines[0])
}
