//! Vulkan instance, device and allocator setup.
//!
//! Everything here runs once while constructing a
//! [`VulkanDevice`](super::VulkanDevice). The renderer is headless, so no
//! surface or swapchain extensions are requested; the only hard extension
//! requirements are dynamic rendering and, when present, the two extended
//! dynamic state extensions this renderer is built around.

use std::ffi::{CStr, CString};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};

use crate::error::RenderError;

/// Required Vulkan API version.
/// On macOS with MoltenVK, only Vulkan 1.2 is supported.
#[cfg(target_os = "macos")]
pub(super) const REQUIRED_API_VERSION: u32 = vk::make_api_version(0, 1, 2, 0);

#[cfg(not(target_os = "macos"))]
pub(super) const REQUIRED_API_VERSION: u32 = vk::make_api_version(0, 1, 3, 0);

/// Validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Create a headless Vulkan instance with optional validation layers.
pub(super) fn create_instance(
    entry: &ash::Entry,
    validation_enabled: bool,
) -> Result<
    (
        ash::Instance,
        Option<vk::DebugUtilsMessengerEXT>,
        Option<ash::ext::debug_utils::Instance>,
    ),
    RenderError,
> {
    let validation_available = validation_enabled && check_validation_layer_support(entry);

    if validation_enabled && !validation_available {
        log::warn!("Validation layers requested but not available");
    }

    let app_name = CString::new("Marigold").map_err(|e| {
        RenderError::BackendUnavailable(format!("Invalid application name: {}", e))
    })?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(&app_name)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(REQUIRED_API_VERSION);

    // No surface extensions: rendering goes to an offscreen target.
    let mut extensions: Vec<*const i8> = Vec::new();

    if validation_available {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    #[cfg(target_os = "macos")]
    {
        extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
    }

    let layer_names: Vec<*const i8> = if validation_available {
        vec![VALIDATION_LAYER_NAME.as_ptr()]
    } else {
        vec![]
    };

    #[allow(unused_mut)]
    let mut create_flags = vk::InstanceCreateFlags::empty();

    #[cfg(target_os = "macos")]
    {
        create_flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    }

    let create_info = vk::InstanceCreateInfo::default()
        .flags(create_flags)
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layer_names);

    let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
        RenderError::BackendUnavailable(format!("Failed to create Vulkan instance: {:?}", e))
    })?;

    let (debug_messenger, debug_utils) = if validation_available {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, &instance);
        let messenger = create_debug_messenger(&debug_utils)?;
        (Some(messenger), Some(debug_utils))
    } else {
        (None, None)
    };

    Ok((instance, debug_messenger, debug_utils))
}

/// Check if the validation layer is available.
fn check_validation_layer_support(entry: &ash::Entry) -> bool {
    let available_layers = match unsafe { entry.enumerate_instance_layer_properties() } {
        Ok(layers) => layers,
        Err(_) => return false,
    };

    for layer in &available_layers {
        let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
        if name == VALIDATION_LAYER_NAME {
            return true;
        }
    }

    false
}

/// Create a debug messenger for validation layer output.
fn create_debug_messenger(
    debug_utils: &ash::ext::debug_utils::Instance,
) -> Result<vk::DebugUtilsMessengerEXT, RenderError> {
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
        .map_err(|e| {
            RenderError::BackendUnavailable(format!("Failed to create debug messenger: {:?}", e))
        })?;

    Ok(messenger)
}

/// Debug callback routing validation messages into the log.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = if callback_data.is_null() {
        String::from("(no message)")
    } else {
        // SAFETY: callback_data is guaranteed to be valid by the Vulkan driver
        let data = unsafe { *callback_data };
        if data.p_message.is_null() {
            String::from("(null message)")
        } else {
            // SAFETY: p_message is a valid null-terminated string from the driver
            unsafe { CStr::from_ptr(data.p_message) }
                .to_string_lossy()
                .into_owned()
        }
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::info!("[Vulkan {}] {}", type_str, message);
        }
        _ => {
            log::debug!("[Vulkan {}] {}", type_str, message);
        }
    }

    vk::FALSE
}

/// Select the best physical device for rendering.
///
/// Prefers discrete GPUs, then devices whose blend stage supports logic
/// operations, since the object pass cannot run without them.
pub(super) fn select_physical_device(
    instance: &ash::Instance,
) -> Result<vk::PhysicalDevice, RenderError> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        RenderError::BackendUnavailable(format!("Failed to enumerate physical devices: {:?}", e))
    })?;

    if devices.is_empty() {
        return Err(RenderError::BackendUnavailable(
            "No Vulkan-capable GPU found".to_string(),
        ));
    }

    let mut best_device = None;
    let mut best_score = 0;

    for device in devices {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };

        let mut score = 0;

        if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            score += 1000;
        } else if properties.device_type == vk::PhysicalDeviceType::INTEGRATED_GPU {
            score += 100;
        }

        if features.logic_op != vk::FALSE {
            score += 500;
        }

        score += properties.limits.max_image_dimension2_d / 1024;

        if score > best_score {
            best_score = score;
            best_device = Some(device);
        }

        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
        log::info!(
            "Found GPU: {:?} (type: {:?}, score: {})",
            device_name,
            properties.device_type,
            score
        );
    }

    best_device
        .ok_or_else(|| RenderError::BackendUnavailable("No suitable GPU found".to_string()))
}

/// Find a queue family that supports graphics operations.
pub(super) fn find_graphics_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<u32, RenderError> {
    let queue_families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    for (index, family) in queue_families.iter().enumerate() {
        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            return Ok(index as u32);
        }
    }

    Err(RenderError::BackendUnavailable(
        "No graphics queue family found".to_string(),
    ))
}

/// Extension and feature bits this renderer cares about, as supported by
/// the selected physical device.
#[derive(Debug, Clone, Copy)]
pub(super) struct SupportedFeatures {
    /// VK_EXT_extended_dynamic_state present with its feature bit set.
    pub extended_dynamic_state: bool,
    /// VK_EXT_extended_dynamic_state2 present with the base feature bit set.
    pub extended_dynamic_state2: bool,
    /// The logic-op bit of VK_EXT_extended_dynamic_state2.
    pub extended_dynamic_state2_logic_op: bool,
    /// Base framebuffer logic op feature; required for logic_op_enable
    /// pipelines regardless of how the op itself is set.
    pub logic_op: bool,
    /// Base anisotropic filtering feature.
    pub sampler_anisotropy: bool,
}

/// Query the extension and feature support relevant to this renderer.
pub(super) fn query_supported_features(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> SupportedFeatures {
    let extensions =
        unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .unwrap_or_default();
    let has_extension = |name: &CStr| {
        extensions
            .iter()
            .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == name)
    };

    let eds1_present = has_extension(ash::ext::extended_dynamic_state::NAME);
    let eds2_present = has_extension(ash::ext::extended_dynamic_state2::NAME);

    let mut eds1 = vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT::default();
    let mut eds2 = vk::PhysicalDeviceExtendedDynamicState2FeaturesEXT::default();

    let (logic_op, sampler_anisotropy) = {
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut eds1)
            .push_next(&mut eds2);
        unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };
        (
            features2.features.logic_op != vk::FALSE,
            features2.features.sampler_anisotropy != vk::FALSE,
        )
    };

    SupportedFeatures {
        extended_dynamic_state: eds1_present && eds1.extended_dynamic_state != vk::FALSE,
        extended_dynamic_state2: eds2_present && eds2.extended_dynamic_state2 != vk::FALSE,
        extended_dynamic_state2_logic_op: eds2_present
            && eds2.extended_dynamic_state2_logic_op != vk::FALSE,
        logic_op,
        sampler_anisotropy,
    }
}

/// Create a logical device with dynamic rendering and whichever extended
/// dynamic state features the physical device supports.
pub(super) fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    graphics_queue_family: u32,
    supported: &SupportedFeatures,
) -> Result<ash::Device, RenderError> {
    let queue_priorities = [1.0f32];
    let queue_create_info = vk::DeviceQueueCreateInfo::default()
        .queue_family_index(graphics_queue_family)
        .queue_priorities(&queue_priorities);

    let queue_create_infos = [queue_create_info];

    let mut device_extensions = vec![ash::khr::dynamic_rendering::NAME.as_ptr()];
    if supported.extended_dynamic_state {
        device_extensions.push(ash::ext::extended_dynamic_state::NAME.as_ptr());
    }
    if supported.extended_dynamic_state2 || supported.extended_dynamic_state2_logic_op {
        device_extensions.push(ash::ext::extended_dynamic_state2::NAME.as_ptr());
    }

    let features = vk::PhysicalDeviceFeatures::default()
        .logic_op(supported.logic_op)
        .sampler_anisotropy(supported.sampler_anisotropy);

    let mut dynamic_rendering_features =
        vk::PhysicalDeviceDynamicRenderingFeatures::default().dynamic_rendering(true);

    let mut eds1_features = vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT::default()
        .extended_dynamic_state(true);

    let mut eds2_features = vk::PhysicalDeviceExtendedDynamicState2FeaturesEXT::default()
        .extended_dynamic_state2(supported.extended_dynamic_state2)
        .extended_dynamic_state2_logic_op(supported.extended_dynamic_state2_logic_op);

    let mut create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&device_extensions)
        .enabled_features(&features)
        .push_next(&mut dynamic_rendering_features);

    if supported.extended_dynamic_state {
        create_info = create_info.push_next(&mut eds1_features);
    }
    if supported.extended_dynamic_state2 || supported.extended_dynamic_state2_logic_op {
        create_info = create_info.push_next(&mut eds2_features);
    }

    let device =
        unsafe { instance.create_device(physical_device, &create_info, None) }.map_err(|e| {
            RenderError::BackendUnavailable(format!("Failed to create logical device: {:?}", e))
        })?;

    Ok(device)
}

/// Create a memory allocator for the Vulkan device.
pub(super) fn create_allocator(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
) -> Result<Allocator, RenderError> {
    let allocator = Allocator::new(&AllocatorCreateDesc {
        instance: instance.clone(),
        device,
        physical_device,
        debug_settings: Default::default(),
        buffer_device_address: false,
        allocation_sizes: gpu_allocator::AllocationSizes::default(),
    })
    .map_err(|e| {
        RenderError::BackendUnavailable(format!("Failed to create memory allocator: {}", e))
    })?;

    Ok(allocator)
}

/// Create a command pool for graphics operations.
pub(super) fn create_command_pool(
    device: &ash::Device,
    queue_family_index: u32,
) -> Result<vk::CommandPool, RenderError> {
    let pool_info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(queue_family_index)
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

    let pool = unsafe { device.create_command_pool(&pool_info, None) }.map_err(|e| {
        RenderError::BackendUnavailable(format!("Failed to create command pool: {:?}", e))
    })?;

    Ok(pool)
}
