//! Native Vulkan device built on ash.
//!
//! Renders into an offscreen color/depth target using dynamic rendering
//! (VK_KHR_dynamic_rendering); no surface or swapchain is created. Extended
//! dynamic state support is negotiated at construction time:
//!
//! - VK_EXT_extended_dynamic_state supplies dynamic primitive topology;
//! - VK_EXT_extended_dynamic_state2 supplies the restart, discard and
//!   depth-bias toggles plus the logic op selector.
//!
//! Whatever the device lacks is reported honestly through
//! [`RenderDevice::features`] and the pipeline builder bakes it instead.
//! Resources live in slot arenas keyed by the small ids the rest of the
//! renderer records against; memory comes from `gpu-allocator`.

mod conversion;
mod init;
mod pipeline;

use std::ffi::CStr;
use std::mem::ManuallyDrop;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;

use marigold_core::texture::CpuTexture;

use crate::bindings::BindingLayout;
use crate::capability::DeviceFeatures;
use crate::commands::{CommandSequence, RenderCommand};
use crate::device::{
    BindingLayoutId, BoundResource, BufferDesc, BufferId, DescriptorSetId, PipelineId,
    RenderDevice, SamplerDesc, SamplerId, TextureId,
};
use crate::error::RenderError;
use crate::pipeline::{PipelineDescription, ShaderSet};
use crate::types::Extent2d;

use self::conversion::{
    convert_address_mode, convert_buffer_usage, convert_filter_mode, convert_index_format,
    convert_logic_op, convert_mipmap_filter_mode, convert_topology,
};

/// Offscreen color target format.
const COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Offscreen depth target format.
const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Construction parameters for [`VulkanDevice`].
#[derive(Debug, Clone)]
pub struct VulkanDeviceConfig {
    /// Offscreen render target size.
    pub extent: Extent2d,
    /// Whether to request validation layers.
    pub validation: bool,
}

impl Default for VulkanDeviceConfig {
    fn default() -> Self {
        Self {
            extent: Extent2d::default(),
            validation: cfg!(debug_assertions),
        }
    }
}

// ============================================================================
// Resource arenas
// ============================================================================

struct VulkanBuffer {
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
}

struct VulkanTexture {
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
}

struct VulkanBindingLayout {
    layout: vk::DescriptorSetLayout,
    /// Binding index per layout entry, in declaration order. Descriptor
    /// writes are matched positionally against this.
    bindings: Vec<u32>,
}

struct VulkanPipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

#[derive(Default)]
struct VulkanArenas {
    buffers: Vec<Option<VulkanBuffer>>,
    textures: Vec<Option<VulkanTexture>>,
    samplers: Vec<Option<vk::Sampler>>,
    layouts: Vec<Option<VulkanBindingLayout>>,
    sets: Vec<Option<vk::DescriptorSet>>,
    pipelines: Vec<Option<VulkanPipeline>>,
}

impl VulkanArenas {
    fn buffer(&self, id: BufferId) -> Option<&VulkanBuffer> {
        self.buffers.get(id.to_raw() as usize).and_then(Option::as_ref)
    }

    fn texture(&self, id: TextureId) -> Option<&VulkanTexture> {
        self.textures.get(id.to_raw() as usize).and_then(Option::as_ref)
    }

    fn sampler(&self, id: SamplerId) -> Option<vk::Sampler> {
        self.samplers.get(id.to_raw() as usize).and_then(|slot| *slot)
    }

    fn layout(&self, id: BindingLayoutId) -> Option<&VulkanBindingLayout> {
        self.layouts.get(id.to_raw() as usize).and_then(Option::as_ref)
    }

    fn set(&self, id: DescriptorSetId) -> Option<vk::DescriptorSet> {
        self.sets.get(id.to_raw() as usize).and_then(|slot| *slot)
    }

    fn pipeline(&self, id: PipelineId) -> Option<&VulkanPipeline> {
        self.pipelines.get(id.to_raw() as usize).and_then(Option::as_ref)
    }

    fn live_count(&self) -> usize {
        self.buffers.iter().flatten().count()
            + self.textures.iter().flatten().count()
            + self.samplers.iter().flatten().count()
            + self.layouts.iter().flatten().count()
            + self.sets.iter().flatten().count()
            + self.pipelines.iter().flatten().count()
    }
}

fn slot_index<T>(slots: &mut Vec<Option<T>>, value: T) -> u32 {
    for (index, slot) in slots.iter_mut().enumerate() {
        if slot.is_none() {
            *slot = Some(value);
            return index as u32;
        }
    }
    slots.push(Some(value));
    (slots.len() - 1) as u32
}

// ============================================================================
// Offscreen target
// ============================================================================

struct OffscreenTarget {
    extent: vk::Extent2D,
    color_image: vk::Image,
    color_view: vk::ImageView,
    color_allocation: Option<Allocation>,
    depth_image: vk::Image,
    depth_view: vk::ImageView,
    depth_allocation: Option<Allocation>,
}

fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Create a 2D image with bound memory and a matching view.
fn create_image(
    device: &ash::Device,
    allocator: &mut Allocator,
    extent: vk::Extent2D,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    aspect: vk::ImageAspectFlags,
    name: &str,
) -> Result<(vk::Image, vk::ImageView, Allocation), RenderError> {
    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let image = unsafe { device.create_image(&image_info, None) }.map_err(|e| {
        RenderError::ResourceCreation(format!("Failed to create image '{}': {:?}", name, e))
    })?;

    let requirements = unsafe { device.get_image_memory_requirements(image) };

    let allocation = allocator
        .allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
        .map_err(|e| {
            unsafe { device.destroy_image(image, None) };
            RenderError::ResourceCreation(format!(
                "Failed to allocate memory for image '{}': {}",
                name, e
            ))
        })?;

    if let Err(e) =
        unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) }
    {
        let _ = allocator.free(allocation);
        unsafe { device.destroy_image(image, None) };
        return Err(RenderError::ResourceCreation(format!(
            "Failed to bind memory for image '{}': {:?}",
            name, e
        )));
    }

    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(subresource_range(aspect));

    let view = match unsafe { device.create_image_view(&view_info, None) } {
        Ok(view) => view,
        Err(e) => {
            let _ = allocator.free(allocation);
            unsafe { device.destroy_image(image, None) };
            return Err(RenderError::ResourceCreation(format!(
                "Failed to create view for image '{}': {:?}",
                name, e
            )));
        }
    };

    Ok((image, view, allocation))
}

fn create_offscreen_target(
    device: &ash::Device,
    allocator: &mut Allocator,
    extent: Extent2d,
) -> Result<OffscreenTarget, RenderError> {
    let vk_extent = vk::Extent2D {
        width: extent.width,
        height: extent.height,
    };

    let (color_image, color_view, color_allocation) = create_image(
        device,
        allocator,
        vk_extent,
        COLOR_FORMAT,
        vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
        vk::ImageAspectFlags::COLOR,
        "offscreen color",
    )?;

    let depth = create_image(
        device,
        allocator,
        vk_extent,
        DEPTH_FORMAT,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        vk::ImageAspectFlags::DEPTH,
        "offscreen depth",
    );

    let (depth_image, depth_view, depth_allocation) = match depth {
        Ok(depth) => depth,
        Err(e) => {
            unsafe {
                device.destroy_image_view(color_view, None);
                device.destroy_image(color_image, None);
            }
            let _ = allocator.free(color_allocation);
            return Err(e);
        }
    };

    Ok(OffscreenTarget {
        extent: vk_extent,
        color_image,
        color_view,
        color_allocation: Some(color_allocation),
        depth_image,
        depth_view,
        depth_allocation: Some(depth_allocation),
    })
}

// ============================================================================
// Device
// ============================================================================

/// [`RenderDevice`] implementation over a real Vulkan device.
pub struct VulkanDevice {
    /// Keeps the loader library alive for the lifetime of the instance.
    #[allow(dead_code)]
    entry: ash::Entry,
    instance: ash::Instance,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    device: ash::Device,
    queue: vk::Queue,
    adapter_name: String,
    max_anisotropy: f32,
    features: DeviceFeatures,
    allocator: Mutex<ManuallyDrop<Allocator>>,
    command_pool: vk::CommandPool,
    frame_command_buffer: vk::CommandBuffer,
    submit_fence: vk::Fence,
    dynamic_rendering: ash::khr::dynamic_rendering::Device,
    extended_dynamic_state: Option<ash::ext::extended_dynamic_state::Device>,
    extended_dynamic_state2: Option<ash::ext::extended_dynamic_state2::Device>,
    descriptor_pool: vk::DescriptorPool,
    target: OffscreenTarget,
    arenas: Mutex<VulkanArenas>,
}

impl std::fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDevice")
            .field("adapter", &self.adapter_name)
            .field("features", &self.features)
            .finish()
    }
}

impl VulkanDevice {
    /// Create a device with default parameters.
    pub fn new() -> Result<Self, RenderError> {
        Self::with_config(&VulkanDeviceConfig::default())
    }

    /// Create a device, selecting an adapter and negotiating the extended
    /// dynamic state extensions.
    pub fn with_config(config: &VulkanDeviceConfig) -> Result<Self, RenderError> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| RenderError::BackendUnavailable(format!("Failed to load Vulkan: {}", e)))?;

        let (instance, debug_messenger, debug_utils) =
            init::create_instance(&entry, config.validation)?;

        let physical_device = init::select_physical_device(&instance)?;
        let graphics_queue_family = init::find_graphics_queue_family(&instance, physical_device)?;
        let supported = init::query_supported_features(&instance, physical_device);

        let device = init::create_logical_device(
            &instance,
            physical_device,
            graphics_queue_family,
            &supported,
        )?;

        let queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let adapter_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        let max_anisotropy = properties.limits.max_sampler_anisotropy;

        let mut allocator = init::create_allocator(&instance, physical_device, device.clone())?;

        let command_pool = init::create_command_pool(&device, graphics_queue_family)?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffers =
            unsafe { device.allocate_command_buffers(&alloc_info) }.map_err(|e| {
                RenderError::BackendUnavailable(format!(
                    "Failed to allocate frame command buffer: {:?}",
                    e
                ))
            })?;
        let frame_command_buffer = command_buffers[0];

        let fence_info = vk::FenceCreateInfo::default();
        let submit_fence = unsafe { device.create_fence(&fence_info, None) }.map_err(|e| {
            RenderError::BackendUnavailable(format!("Failed to create submit fence: {:?}", e))
        })?;

        let dynamic_rendering = ash::khr::dynamic_rendering::Device::new(&instance, &device);
        let extended_dynamic_state = supported
            .extended_dynamic_state
            .then(|| ash::ext::extended_dynamic_state::Device::new(&instance, &device));
        let extended_dynamic_state2 = (supported.extended_dynamic_state2
            || supported.extended_dynamic_state2_logic_op)
            .then(|| ash::ext::extended_dynamic_state2::Device::new(&instance, &device));

        let descriptor_pool = pipeline::create_descriptor_pool(&device)?;

        let target = create_offscreen_target(&device, &mut allocator, config.extent)?;

        // Framebuffer logic ops need both the dynamic-state2 bit and the
        // base blend-stage feature.
        let features = DeviceFeatures {
            dynamic_primitive_topology: supported.extended_dynamic_state,
            dynamic_primitive_restart: supported.extended_dynamic_state2,
            dynamic_rasterizer_discard: supported.extended_dynamic_state2,
            dynamic_depth_bias_enable: supported.extended_dynamic_state2,
            dynamic_logic_op: supported.extended_dynamic_state2_logic_op && supported.logic_op,
            sampler_anisotropy: supported.sampler_anisotropy,
        };

        log::info!(
            "Vulkan device initialized: {} (validation: {})",
            adapter_name,
            config.validation
        );
        log::debug!("advertised dynamic-state features: {:?}", features);

        Ok(Self {
            entry,
            instance,
            debug_messenger,
            debug_utils,
            device,
            queue,
            adapter_name,
            max_anisotropy,
            features,
            allocator: Mutex::new(ManuallyDrop::new(allocator)),
            command_pool,
            frame_command_buffer,
            submit_fence,
            dynamic_rendering,
            extended_dynamic_state,
            extended_dynamic_state2,
            descriptor_pool,
            target,
            arenas: Mutex::new(VulkanArenas::default()),
        })
    }

    /// Run a one-time command buffer and wait for it to finish.
    fn submit_one_time(&self, record: impl FnOnce(vk::CommandBuffer)) -> Result<(), RenderError> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffers =
            unsafe { self.device.allocate_command_buffers(&alloc_info) }.map_err(|e| {
                RenderError::ResourceCreation(format!(
                    "Failed to allocate upload command buffer: {:?}",
                    e
                ))
            })?;
        let cmd = command_buffers[0];

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        let result = unsafe { self.device.begin_command_buffer(cmd, &begin_info) }
            .map_err(|e| {
                RenderError::ResourceCreation(format!("Failed to begin upload commands: {:?}", e))
            })
            .and_then(|_| {
                record(cmd);
                unsafe { self.device.end_command_buffer(cmd) }.map_err(|e| {
                    RenderError::ResourceCreation(format!("Failed to end upload commands: {:?}", e))
                })
            })
            .and_then(|_| {
                let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
                unsafe {
                    self.device
                        .queue_submit(self.queue, &[submit_info], vk::Fence::null())
                }
                .map_err(|e| {
                    RenderError::ResourceCreation(format!(
                        "Failed to submit upload commands: {:?}",
                        e
                    ))
                })
            })
            .and_then(|_| {
                unsafe { self.device.queue_wait_idle(self.queue) }.map_err(|e| {
                    RenderError::ResourceCreation(format!("Failed to wait for upload: {:?}", e))
                })
            });

        unsafe {
            self.device
                .free_command_buffers(self.command_pool, &command_buffers);
        }

        result
    }

    /// Copy pixel data into an image via a staging buffer, leaving it in
    /// SHADER_READ_ONLY_OPTIMAL.
    fn upload_pixels(&self, image: vk::Image, texture: &CpuTexture) -> Result<(), RenderError> {
        let data = texture.pixels();

        let staging_info = vk::BufferCreateInfo::default()
            .size(data.len() as u64)
            .usage(vk::BufferUsageFlags::TRANSFER_SRC)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let staging_buffer =
            unsafe { self.device.create_buffer(&staging_info, None) }.map_err(|e| {
                RenderError::ResourceCreation(format!("Failed to create staging buffer: {:?}", e))
            })?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(staging_buffer) };

        let staging_allocation = {
            let mut allocator = self.allocator.lock();
            match allocator.allocate(&AllocationCreateDesc {
                name: "texture staging",
                requirements,
                location: MemoryLocation::CpuToGpu,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            }) {
                Ok(allocation) => allocation,
                Err(e) => {
                    unsafe { self.device.destroy_buffer(staging_buffer, None) };
                    return Err(RenderError::ResourceCreation(format!(
                        "Failed to allocate staging memory: {}",
                        e
                    )));
                }
            }
        };

        let release_staging = |allocation: Allocation| {
            let mut allocator = self.allocator.lock();
            let _ = allocator.free(allocation);
            unsafe { self.device.destroy_buffer(staging_buffer, None) };
        };

        if let Err(e) = unsafe {
            self.device.bind_buffer_memory(
                staging_buffer,
                staging_allocation.memory(),
                staging_allocation.offset(),
            )
        } {
            release_staging(staging_allocation);
            return Err(RenderError::ResourceCreation(format!(
                "Failed to bind staging memory: {:?}",
                e
            )));
        }

        let Some(mapped_ptr) = staging_allocation.mapped_ptr() else {
            release_staging(staging_allocation);
            return Err(RenderError::ResourceCreation(
                "staging buffer is not host-visible".to_string(),
            ));
        };

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped_ptr.as_ptr() as *mut u8, data.len());
        }

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width: texture.width(),
                height: texture.height(),
                depth: 1,
            });

        let result = self.submit_one_time(|cmd| {
            let to_transfer = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(subresource_range(vk::ImageAspectFlags::COLOR))
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);

            unsafe {
                self.device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_transfer],
                );
                self.device.cmd_copy_buffer_to_image(
                    cmd,
                    staging_buffer,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }

            let to_sampled = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(subresource_range(vk::ImageAspectFlags::COLOR))
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ);

            unsafe {
                self.device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_sampled],
                );
            }
        });

        // The submit waited for the queue, so staging can go either way.
        release_staging(staging_allocation);

        result
    }

    fn encode_command(
        &self,
        arenas: &VulkanArenas,
        cmd: vk::CommandBuffer,
        command: &RenderCommand,
        bound_layout: &mut Option<vk::PipelineLayout>,
    ) -> Result<(), RenderError> {
        match command {
            RenderCommand::BeginRendering {
                clear_color,
                clear_depth,
            } => {
                let color_barrier = vk::ImageMemoryBarrier::default()
                    .old_layout(vk::ImageLayout::UNDEFINED)
                    .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(self.target.color_image)
                    .subresource_range(subresource_range(vk::ImageAspectFlags::COLOR))
                    .src_access_mask(vk::AccessFlags::empty())
                    .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

                let depth_barrier = vk::ImageMemoryBarrier::default()
                    .old_layout(vk::ImageLayout::UNDEFINED)
                    .new_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(self.target.depth_image)
                    .subresource_range(subresource_range(vk::ImageAspectFlags::DEPTH))
                    .src_access_mask(vk::AccessFlags::empty())
                    .dst_access_mask(
                        vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                    );

                unsafe {
                    self.device.cmd_pipeline_barrier(
                        cmd,
                        vk::PipelineStageFlags::TOP_OF_PIPE,
                        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[color_barrier, depth_barrier],
                    );
                }

                let color_attachments = [vk::RenderingAttachmentInfo::default()
                    .image_view(self.target.color_view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(vk::ClearValue {
                        color: vk::ClearColorValue {
                            float32: *clear_color,
                        },
                    })];

                let depth_attachment = vk::RenderingAttachmentInfo::default()
                    .image_view(self.target.depth_view)
                    .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .clear_value(vk::ClearValue {
                        depth_stencil: vk::ClearDepthStencilValue {
                            depth: *clear_depth,
                            stencil: 0,
                        },
                    });

                let rendering_info = vk::RenderingInfo::default()
                    .render_area(vk::Rect2D {
                        offset: vk::Offset2D { x: 0, y: 0 },
                        extent: self.target.extent,
                    })
                    .layer_count(1)
                    .color_attachments(&color_attachments)
                    .depth_attachment(&depth_attachment);

                unsafe {
                    self.dynamic_rendering.cmd_begin_rendering(cmd, &rendering_info);
                }
            }
            RenderCommand::SetViewport(viewport) => {
                let vk_viewport = vk::Viewport {
                    x: viewport.x,
                    y: viewport.y,
                    width: viewport.width,
                    height: viewport.height,
                    min_depth: viewport.min_depth,
                    max_depth: viewport.max_depth,
                };
                unsafe { self.device.cmd_set_viewport(cmd, 0, &[vk_viewport]) };
            }
            RenderCommand::SetScissor(scissor) => {
                let rect = vk::Rect2D {
                    offset: vk::Offset2D {
                        x: scissor.x,
                        y: scissor.y,
                    },
                    extent: vk::Extent2D {
                        width: scissor.width,
                        height: scissor.height,
                    },
                };
                unsafe { self.device.cmd_set_scissor(cmd, 0, &[rect]) };
            }
            RenderCommand::BindPipeline { pipeline, .. } => {
                let entry = arenas.pipeline(*pipeline).ok_or_else(|| {
                    RenderError::Recording(format!("unknown pipeline id {}", pipeline.to_raw()))
                })?;
                unsafe {
                    self.device.cmd_bind_pipeline(
                        cmd,
                        vk::PipelineBindPoint::GRAPHICS,
                        entry.pipeline,
                    );
                }
                *bound_layout = Some(entry.layout);
            }
            RenderCommand::BindDescriptorSet { set, .. } => {
                let layout = bound_layout.ok_or_else(|| {
                    RenderError::Recording("descriptor set bound before any pipeline".to_string())
                })?;
                let set = arenas.set(*set).ok_or_else(|| {
                    RenderError::Recording(format!("unknown descriptor set id {}", set.to_raw()))
                })?;
                unsafe {
                    self.device.cmd_bind_descriptor_sets(
                        cmd,
                        vk::PipelineBindPoint::GRAPHICS,
                        layout,
                        0,
                        &[set],
                        &[],
                    );
                }
            }
            RenderCommand::SetLogicOp(op) => {
                let eds2 = self.extended_dynamic_state2.as_ref().ok_or_else(|| {
                    RenderError::Recording(
                        "dynamic logic op recorded without VK_EXT_extended_dynamic_state2"
                            .to_string(),
                    )
                })?;
                unsafe { eds2.cmd_set_logic_op(cmd, convert_logic_op(*op)) };
            }
            RenderCommand::SetPrimitiveTopology(topology) => {
                let eds = self.extended_dynamic_state.as_ref().ok_or_else(|| {
                    RenderError::Recording(
                        "dynamic topology recorded without VK_EXT_extended_dynamic_state"
                            .to_string(),
                    )
                })?;
                unsafe { eds.cmd_set_primitive_topology(cmd, convert_topology(*topology)) };
            }
            RenderCommand::SetPrimitiveRestart(enable) => {
                let eds2 = self.extended_dynamic_state2.as_ref().ok_or_else(|| {
                    RenderError::Recording(
                        "dynamic primitive restart recorded without VK_EXT_extended_dynamic_state2"
                            .to_string(),
                    )
                })?;
                unsafe { eds2.cmd_set_primitive_restart_enable(cmd, *enable) };
            }
            RenderCommand::SetRasterizerDiscard(enable) => {
                let eds2 = self.extended_dynamic_state2.as_ref().ok_or_else(|| {
                    RenderError::Recording(
                        "dynamic rasterizer discard recorded without VK_EXT_extended_dynamic_state2"
                            .to_string(),
                    )
                })?;
                unsafe { eds2.cmd_set_rasterizer_discard_enable(cmd, *enable) };
            }
            RenderCommand::SetDepthBiasEnable(enable) => {
                let eds2 = self.extended_dynamic_state2.as_ref().ok_or_else(|| {
                    RenderError::Recording(
                        "dynamic depth bias recorded without VK_EXT_extended_dynamic_state2"
                            .to_string(),
                    )
                })?;
                unsafe { eds2.cmd_set_depth_bias_enable(cmd, *enable) };
            }
            RenderCommand::PushConstants(block) => {
                let layout = bound_layout.ok_or_else(|| {
                    RenderError::Recording("push constants recorded before any pipeline".to_string())
                })?;
                unsafe {
                    self.device.cmd_push_constants(
                        cmd,
                        layout,
                        vk::ShaderStageFlags::VERTEX,
                        0,
                        bytemuck::bytes_of(block),
                    );
                }
            }
            RenderCommand::BindVertexBuffers { positions, normals } => {
                let positions = arenas.buffer(*positions).ok_or_else(|| {
                    RenderError::Recording(format!(
                        "unknown position buffer id {}",
                        positions.to_raw()
                    ))
                })?;
                let normals = arenas.buffer(*normals).ok_or_else(|| {
                    RenderError::Recording(format!("unknown normal buffer id {}", normals.to_raw()))
                })?;
                unsafe {
                    self.device.cmd_bind_vertex_buffers(
                        cmd,
                        0,
                        &[positions.buffer, normals.buffer],
                        &[0, 0],
                    );
                }
            }
            RenderCommand::BindIndexBuffer { buffer, format } => {
                let entry = arenas.buffer(*buffer).ok_or_else(|| {
                    RenderError::Recording(format!("unknown index buffer id {}", buffer.to_raw()))
                })?;
                unsafe {
                    self.device.cmd_bind_index_buffer(
                        cmd,
                        entry.buffer,
                        0,
                        convert_index_format(*format),
                    );
                }
            }
            RenderCommand::DrawIndexed { index_count } => unsafe {
                self.device.cmd_draw_indexed(cmd, *index_count, 1, 0, 0, 0);
            },
            RenderCommand::EndRendering => unsafe {
                self.dynamic_rendering.cmd_end_rendering(cmd);
            },
        }

        Ok(())
    }
}

impl RenderDevice for VulkanDevice {
    fn name(&self) -> &str {
        &self.adapter_name
    }

    fn features(&self) -> DeviceFeatures {
        self.features
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferId, RenderError> {
        if desc.size == 0 {
            return Err(RenderError::InvalidParameter(format!(
                "buffer '{}' has zero size",
                desc.label
            )));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(convert_buffer_usage(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }.map_err(|e| {
            RenderError::ResourceCreation(format!(
                "Failed to create buffer '{}': {:?}",
                desc.label, e
            ))
        })?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        // Every buffer is written directly from the CPU, so all of them
        // live in host-visible memory.
        let allocation = {
            let mut allocator = self.allocator.lock();
            match allocator.allocate(&AllocationCreateDesc {
                name: &desc.label,
                requirements,
                location: MemoryLocation::CpuToGpu,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            }) {
                Ok(allocation) => allocation,
                Err(e) => {
                    unsafe { self.device.destroy_buffer(buffer, None) };
                    return Err(RenderError::ResourceCreation(format!(
                        "Failed to allocate memory for buffer '{}': {}",
                        desc.label, e
                    )));
                }
            }
        };

        if let Err(e) = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            {
                let mut allocator = self.allocator.lock();
                let _ = allocator.free(allocation);
            }
            unsafe { self.device.destroy_buffer(buffer, None) };
            return Err(RenderError::ResourceCreation(format!(
                "Failed to bind memory for buffer '{}': {:?}",
                desc.label, e
            )));
        }

        let mut arenas = self.arenas.lock();
        let index = slot_index(
            &mut arenas.buffers,
            VulkanBuffer {
                buffer,
                allocation: Some(allocation),
                size: desc.size,
            },
        );
        Ok(BufferId::from_raw(index))
    }

    fn write_buffer(&self, buffer: BufferId, data: &[u8]) -> Result<(), RenderError> {
        let arenas = self.arenas.lock();
        let entry = arenas.buffer(buffer).ok_or_else(|| {
            RenderError::InvalidParameter(format!("unknown buffer id {}", buffer.to_raw()))
        })?;

        if data.len() as u64 > entry.size {
            return Err(RenderError::InvalidParameter(format!(
                "write of {} bytes exceeds buffer size {}",
                data.len(),
                entry.size
            )));
        }

        let mapped_ptr = entry
            .allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_ptr())
            .ok_or_else(|| {
                RenderError::InvalidParameter(format!(
                    "buffer {} is not host-visible",
                    buffer.to_raw()
                ))
            })?;

        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                mapped_ptr.as_ptr() as *mut u8,
                data.len(),
            );
        }
        Ok(())
    }

    fn create_texture(&self, texture: &CpuTexture) -> Result<TextureId, RenderError> {
        let extent = vk::Extent2D {
            width: texture.width(),
            height: texture.height(),
        };

        let (image, view, allocation) = {
            let mut allocator = self.allocator.lock();
            create_image(
                &self.device,
                &mut allocator,
                extent,
                COLOR_FORMAT,
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
                vk::ImageAspectFlags::COLOR,
                texture.label().unwrap_or("texture"),
            )?
        };

        if let Err(e) = self.upload_pixels(image, texture) {
            unsafe {
                self.device.destroy_image_view(view, None);
                self.device.destroy_image(image, None);
            }
            let mut allocator = self.allocator.lock();
            let _ = allocator.free(allocation);
            return Err(e);
        }

        let mut arenas = self.arenas.lock();
        let index = slot_index(
            &mut arenas.textures,
            VulkanTexture {
                image,
                view,
                allocation: Some(allocation),
            },
        );
        Ok(TextureId::from_raw(index))
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerId, RenderError> {
        let anisotropy_enable =
            self.features.sampler_anisotropy && desc.filter == crate::device::FilterMode::Linear;

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(convert_filter_mode(desc.filter))
            .min_filter(convert_filter_mode(desc.filter))
            .mipmap_mode(convert_mipmap_filter_mode(desc.filter))
            .address_mode_u(convert_address_mode(desc.address_mode))
            .address_mode_v(convert_address_mode(desc.address_mode))
            .address_mode_w(convert_address_mode(desc.address_mode))
            .mip_lod_bias(0.0)
            .anisotropy_enable(anisotropy_enable)
            .max_anisotropy(self.max_anisotropy)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK)
            .unnormalized_coordinates(false);

        let sampler = unsafe { self.device.create_sampler(&sampler_info, None) }.map_err(|e| {
            RenderError::ResourceCreation(format!("Failed to create sampler: {:?}", e))
        })?;

        let mut arenas = self.arenas.lock();
        let index = slot_index(&mut arenas.samplers, sampler);
        Ok(SamplerId::from_raw(index))
    }

    fn create_binding_layout(
        &self,
        layout: &BindingLayout,
    ) -> Result<BindingLayoutId, RenderError> {
        let vk_layout = pipeline::create_descriptor_set_layout(&self.device, layout)?;
        let bindings = layout.entries.iter().map(|entry| entry.binding).collect();

        let mut arenas = self.arenas.lock();
        let index = slot_index(
            &mut arenas.layouts,
            VulkanBindingLayout {
                layout: vk_layout,
                bindings,
            },
        );
        Ok(BindingLayoutId::from_raw(index))
    }

    fn create_descriptor_set(
        &self,
        layout: BindingLayoutId,
        resources: &[BoundResource],
    ) -> Result<DescriptorSetId, RenderError> {
        let mut arenas = self.arenas.lock();

        let (vk_layout, bindings) = {
            let entry = arenas.layout(layout).ok_or_else(|| {
                RenderError::InvalidParameter(format!(
                    "unknown binding layout id {}",
                    layout.to_raw()
                ))
            })?;
            (entry.layout, entry.bindings.clone())
        };

        if resources.len() != bindings.len() {
            return Err(RenderError::InvalidParameter(format!(
                "layout expects {} resources, got {}",
                bindings.len(),
                resources.len()
            )));
        }

        // Infos must be collected before the writes that borrow them.
        let mut buffer_infos = Vec::new();
        let mut image_infos = Vec::new();
        for resource in resources {
            match resource {
                BoundResource::UniformBuffer(buffer) => {
                    let entry = arenas.buffer(*buffer).ok_or_else(|| {
                        RenderError::InvalidParameter(format!(
                            "unknown buffer id {}",
                            buffer.to_raw()
                        ))
                    })?;
                    buffer_infos.push(vk::DescriptorBufferInfo {
                        buffer: entry.buffer,
                        offset: 0,
                        range: entry.size,
                    });
                }
                BoundResource::CombinedImageSampler { texture, sampler } => {
                    let texture_entry = arenas.texture(*texture).ok_or_else(|| {
                        RenderError::InvalidParameter(format!(
                            "unknown texture id {}",
                            texture.to_raw()
                        ))
                    })?;
                    let vk_sampler = arenas.sampler(*sampler).ok_or_else(|| {
                        RenderError::InvalidParameter(format!(
                            "unknown sampler id {}",
                            sampler.to_raw()
                        ))
                    })?;
                    image_infos.push(vk::DescriptorImageInfo {
                        sampler: vk_sampler,
                        image_view: texture_entry.view,
                        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    });
                }
            }
        }

        let set = pipeline::allocate_descriptor_set(&self.device, self.descriptor_pool, vk_layout)?;

        let mut writes = Vec::new();
        let mut buffer_index = 0;
        let mut image_index = 0;
        for (resource, binding) in resources.iter().zip(bindings.iter()) {
            let write = match resource {
                BoundResource::UniformBuffer(_) => {
                    let info = &buffer_infos[buffer_index..buffer_index + 1];
                    buffer_index += 1;
                    vk::WriteDescriptorSet::default()
                        .dst_set(set)
                        .dst_binding(*binding)
                        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                        .buffer_info(info)
                }
                BoundResource::CombinedImageSampler { .. } => {
                    let info = &image_infos[image_index..image_index + 1];
                    image_index += 1;
                    vk::WriteDescriptorSet::default()
                        .dst_set(set)
                        .dst_binding(*binding)
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .image_info(info)
                }
            };
            writes.push(write);
        }

        unsafe { self.device.update_descriptor_sets(&writes, &[]) };

        let index = slot_index(&mut arenas.sets, set);
        Ok(DescriptorSetId::from_raw(index))
    }

    fn create_pipeline(
        &self,
        desc: &PipelineDescription,
        shaders: &ShaderSet,
        layout: BindingLayoutId,
    ) -> Result<PipelineId, RenderError> {
        let set_layout = {
            let arenas = self.arenas.lock();
            arenas
                .layout(layout)
                .ok_or_else(|| {
                    RenderError::InvalidParameter(format!(
                        "unknown binding layout id {}",
                        layout.to_raw()
                    ))
                })?
                .layout
        };

        let pipeline_layout =
            pipeline::create_pipeline_layout(&self.device, set_layout, &desc.push_constants)?;

        let vk_pipeline = match pipeline::create_graphics_pipeline(
            &self.device,
            desc,
            shaders,
            pipeline_layout,
            COLOR_FORMAT,
            DEPTH_FORMAT,
        ) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                unsafe { self.device.destroy_pipeline_layout(pipeline_layout, None) };
                return Err(e);
            }
        };

        log::debug!(
            "created {} pipeline (dynamic: {:?})",
            desc.variant.name(),
            desc.dynamic
        );

        let mut arenas = self.arenas.lock();
        let index = slot_index(
            &mut arenas.pipelines,
            VulkanPipeline {
                pipeline: vk_pipeline,
                layout: pipeline_layout,
            },
        );
        Ok(PipelineId::from_raw(index))
    }

    fn execute(&self, sequence: &CommandSequence) -> Result<(), RenderError> {
        if sequence.is_empty() {
            return Ok(());
        }

        let arenas = self.arenas.lock();
        let cmd = self.frame_command_buffer;

        // The pool carries RESET_COMMAND_BUFFER, so begin implicitly
        // resets the previous recording.
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(cmd, &begin_info) }.map_err(|e| {
            RenderError::Recording(format!("Failed to begin frame command buffer: {:?}", e))
        })?;

        let mut bound_layout = None;
        for command in sequence.commands() {
            self.encode_command(&arenas, cmd, command, &mut bound_layout)?;
        }

        unsafe { self.device.end_command_buffer(cmd) }.map_err(|e| {
            RenderError::Recording(format!("Failed to end frame command buffer: {:?}", e))
        })?;

        let command_buffers = [cmd];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info], self.submit_fence)
        }
        .map_err(|e| RenderError::Recording(format!("Failed to submit frame: {:?}", e)))?;

        unsafe {
            self.device
                .wait_for_fences(&[self.submit_fence], true, u64::MAX)
        }
        .map_err(|e| RenderError::Recording(format!("Failed to wait for frame fence: {:?}", e)))?;
        unsafe { self.device.reset_fences(&[self.submit_fence]) }
            .map_err(|e| RenderError::Recording(format!("Failed to reset frame fence: {:?}", e)))?;

        log::trace!(
            "executed frame {} ({} commands)",
            sequence.frame_index(),
            sequence.len()
        );
        Ok(())
    }

    fn wait_idle(&self) {
        if let Err(e) = unsafe { self.device.device_wait_idle() } {
            log::warn!("device_wait_idle failed: {:?}", e);
        }
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        let mut arenas = self.arenas.lock();
        let Some(slot) = arenas.buffers.get_mut(buffer.to_raw() as usize) else {
            log::warn!("destroy of unknown buffer id {}", buffer.to_raw());
            return;
        };
        if let Some(mut entry) = slot.take() {
            if let Some(allocation) = entry.allocation.take() {
                let mut allocator = self.allocator.lock();
                let _ = allocator.free(allocation);
            }
            unsafe { self.device.destroy_buffer(entry.buffer, None) };
        } else {
            log::warn!("destroy of unknown buffer id {}", buffer.to_raw());
        }
    }

    fn destroy_texture(&self, texture: TextureId) {
        let mut arenas = self.arenas.lock();
        let Some(slot) = arenas.textures.get_mut(texture.to_raw() as usize) else {
            log::warn!("destroy of unknown texture id {}", texture.to_raw());
            return;
        };
        if let Some(mut entry) = slot.take() {
            unsafe {
                self.device.destroy_image_view(entry.view, None);
                self.device.destroy_image(entry.image, None);
            }
            if let Some(allocation) = entry.allocation.take() {
                let mut allocator = self.allocator.lock();
                let _ = allocator.free(allocation);
            }
        } else {
            log::warn!("destroy of unknown texture id {}", texture.to_raw());
        }
    }

    fn destroy_sampler(&self, sampler: SamplerId) {
        let mut arenas = self.arenas.lock();
        let Some(slot) = arenas.samplers.get_mut(sampler.to_raw() as usize) else {
            log::warn!("destroy of unknown sampler id {}", sampler.to_raw());
            return;
        };
        if let Some(vk_sampler) = slot.take() {
            unsafe { self.device.destroy_sampler(vk_sampler, None) };
        } else {
            log::warn!("destroy of unknown sampler id {}", sampler.to_raw());
        }
    }

    fn destroy_binding_layout(&self, layout: BindingLayoutId) {
        let mut arenas = self.arenas.lock();
        let Some(slot) = arenas.layouts.get_mut(layout.to_raw() as usize) else {
            log::warn!("destroy of unknown binding layout id {}", layout.to_raw());
            return;
        };
        if let Some(entry) = slot.take() {
            unsafe {
                self.device
                    .destroy_descriptor_set_layout(entry.layout, None)
            };
        } else {
            log::warn!("destroy of unknown binding layout id {}", layout.to_raw());
        }
    }

    fn destroy_descriptor_set(&self, set: DescriptorSetId) {
        let mut arenas = self.arenas.lock();
        let Some(slot) = arenas.sets.get_mut(set.to_raw() as usize) else {
            log::warn!("destroy of unknown descriptor set id {}", set.to_raw());
            return;
        };
        if let Some(vk_set) = slot.take() {
            if let Err(e) = unsafe {
                self.device
                    .free_descriptor_sets(self.descriptor_pool, &[vk_set])
            } {
                log::warn!("failed to free descriptor set: {:?}", e);
            }
        } else {
            log::warn!("destroy of unknown descriptor set id {}", set.to_raw());
        }
    }

    fn destroy_pipeline(&self, pipeline: PipelineId) {
        let mut arenas = self.arenas.lock();
        let Some(slot) = arenas.pipelines.get_mut(pipeline.to_raw() as usize) else {
            log::warn!("destroy of unknown pipeline id {}", pipeline.to_raw());
            return;
        };
        if let Some(entry) = slot.take() {
            unsafe {
                self.device.destroy_pipeline(entry.pipeline, None);
                self.device.destroy_pipeline_layout(entry.layout, None);
            }
        } else {
            log::warn!("destroy of unknown pipeline id {}", pipeline.to_raw());
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
        }

        let arenas = std::mem::take(self.arenas.get_mut());
        let leaked = arenas.live_count();
        if leaked > 0 {
            log::warn!("VulkanDevice dropped with {} live resources", leaked);
        }

        {
            let allocator = self.allocator.get_mut();

            for mut entry in arenas.buffers.into_iter().flatten() {
                if let Some(allocation) = entry.allocation.take() {
                    let _ = allocator.free(allocation);
                }
                unsafe { self.device.destroy_buffer(entry.buffer, None) };
            }

            for mut entry in arenas.textures.into_iter().flatten() {
                unsafe {
                    self.device.destroy_image_view(entry.view, None);
                    self.device.destroy_image(entry.image, None);
                }
                if let Some(allocation) = entry.allocation.take() {
                    let _ = allocator.free(allocation);
                }
            }

            if let Some(allocation) = self.target.color_allocation.take() {
                let _ = allocator.free(allocation);
            }
            if let Some(allocation) = self.target.depth_allocation.take() {
                let _ = allocator.free(allocation);
            }
        }

        for sampler in arenas.samplers.into_iter().flatten() {
            unsafe { self.device.destroy_sampler(sampler, None) };
        }
        for entry in arenas.layouts.into_iter().flatten() {
            unsafe {
                self.device
                    .destroy_descriptor_set_layout(entry.layout, None)
            };
        }
        for entry in arenas.pipelines.into_iter().flatten() {
            unsafe {
                self.device.destroy_pipeline(entry.pipeline, None);
                self.device.destroy_pipeline_layout(entry.layout, None);
            }
        }

        unsafe {
            // Leaked sets are freed with the pool.
            self.device
                .destroy_descriptor_pool(self.descriptor_pool, None);

            self.device.destroy_image_view(self.target.color_view, None);
            self.device.destroy_image(self.target.color_image, None);
            self.device.destroy_image_view(self.target.depth_view, None);
            self.device.destroy_image(self.target.depth_image, None);

            self.device.destroy_fence(self.submit_fence, None);
            self.device.destroy_command_pool(self.command_pool, None);
        }

        // The allocator must go before the device it allocates from.
        // SAFETY: self is being dropped, nothing reads the allocator again.
        unsafe {
            drop(ManuallyDrop::take(self.allocator.get_mut()));
        }

        unsafe {
            self.device.destroy_device(None);

            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

static_assertions::assert_impl_all!(VulkanDevice: Send, Sync);
