//! Vulkan context management
//!
//! Owns the entry, instance, optional debug messenger, the chosen physical
//! device and the logical device with its single graphics+transfer queue.
//! Everything else in the renderer borrows from here, so the context is the
//! last thing to be dropped.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::vk;
use ash::{Device, Entry, Instance};
use std::ffi::{c_char, CStr, CString};
use thiserror::Error;

use crate::core::config::VulkanRendererConfig;
use crate::render::vulkan::window::WindowError;

const VALIDATION_LAYER: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// A required instance or device extension is missing
    #[error("Required extension not present: {0}")]
    ExtensionNotPresent(String),

    /// A requested layer is missing
    #[error("Required layer not present: {0}")]
    LayerNotPresent(String),

    /// No GPU satisfies the renderer's requirements
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// The selected queue family cannot present to the window surface
    #[error("Queue family {0} cannot present to the surface")]
    PresentationNotSupported(u32),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// None of the candidate formats supports the requested features
    #[error("No supported format among candidates")]
    NoSupportedFormat,

    /// Image layout transition without a known barrier
    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        /// Current layout
        old: vk::ImageLayout,
        /// Requested layout
        new: vk::ImageLayout,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Reading an asset from disk failed
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that could not be read
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// Decoding an image file failed
    #[error("Failed to decode image {path}: {source}")]
    ImageDecode {
        /// File that could not be decoded
        path: String,
        /// Underlying error
        source: image::ImageError,
    },

    /// Window system error
    #[error(transparent)]
    Window(#[from] WindowError),
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Extract the name out of a fixed-size Vulkan string array
fn raw_name(raw: &[c_char]) -> &CStr {
    // SAFETY: Vulkan guarantees these arrays are NUL-terminated.
    unsafe { CStr::from_ptr(raw.as_ptr()) }
}

/// Names from `required` that are absent from `available`
pub fn missing_names<'a>(required: &[&'a CStr], available: &[&CStr]) -> Vec<&'a CStr> {
    required
        .iter()
        .copied()
        .filter(|name| !available.contains(name))
        .collect()
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    /// Surface extension loader
    pub surface_loader: Surface,
    debug_messenger: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create the instance, validating extensions and layers first
    pub fn new(config: &VulkanRendererConfig, window_extensions: &[String]) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        let mut validation = config.validation_enabled();
        if validation && !Self::validation_layer_available(&entry)? {
            if config.enable_validation == Some(true) {
                return Err(VulkanError::LayerNotPresent(VALIDATION_LAYER.to_string_lossy().into_owned()));
            }
            log::warn!("Validation layer not available, continuing without it");
            validation = false;
        }

        let mut extension_names = window_extensions
            .iter()
            .map(|name| CString::new(name.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VulkanError::InitializationFailed(format!("Bad extension name: {e}")))?;
        if validation {
            extension_names.push(DebugUtils::name().to_owned());
        }
        Self::check_instance_extensions(&entry, &extension_names)?;

        let app_name = CString::new(config.application_name.as_str())
            .map_err(|e| VulkanError::InitializationFailed(format!("Bad application name: {e}")))?;
        let engine_name = CString::new(config.engine_name.as_str())
            .map_err(|e| VulkanError::InitializationFailed(format!("Bad engine name: {e}")))?;
        let (major, minor, patch) = config.application_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        let extension_ptrs: Vec<*const c_char> = extension_names.iter().map(|name| name.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> = if validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None).map_err(VulkanError::Api)? };

        let debug_messenger = if validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        let surface_loader = Surface::new(&entry, &instance);
        log::info!(
            "Vulkan instance created (validation {})",
            if validation { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            surface_loader,
            debug_messenger,
        })
    }

    fn validation_layer_available(entry: &Entry) -> VulkanResult<bool> {
        let layers = entry.enumerate_instance_layer_properties().map_err(VulkanError::Api)?;
        Ok(layers.iter().any(|layer| raw_name(&layer.layer_name) == VALIDATION_LAYER))
    }

    fn check_instance_extensions(entry: &Entry, required: &[CString]) -> VulkanResult<()> {
        let properties = entry
            .enumerate_instance_extension_properties(None)
            .map_err(VulkanError::Api)?;
        let available: Vec<&CStr> = properties.iter().map(|p| raw_name(&p.extension_name)).collect();
        let required: Vec<&CStr> = required.iter().map(CString::as_c_str).collect();

        match missing_names(&required, &available).first() {
            Some(missing) => Err(VulkanError::ExtensionNotPresent(missing.to_string_lossy().into_owned())),
            None => Ok(()),
        }
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_messenger.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
///
/// Never asks the driver to abort the call.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::info!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Preference order for GPU types: discrete, then integrated, then anything
pub fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 2,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        _ => 0,
    }
}

/// Index of the most preferred device type; ties keep enumeration order
pub fn preferred_device_index(device_types: &[vk::PhysicalDeviceType]) -> Option<usize> {
    device_types
        .iter()
        .enumerate()
        .min_by_key(|(_, device_type)| std::cmp::Reverse(device_type_rank(**device_type)))
        .map(|(index, _)| index)
}

/// First queue family that supports both graphics and transfer work
pub fn find_queue_family(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    let required = vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER;
    families
        .iter()
        .position(|family| family.queue_count > 0 && family.queue_flags.contains(required))
        .map(|index| index as u32)
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Optional features that were found and will be enabled
    pub enabled_features: vk::PhysicalDeviceFeatures,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics+transfer queue family
    pub queue_family: u32,
}

impl PhysicalDeviceInfo {
    /// Select the preferred GPU among those meeting every requirement
    pub fn select_suitable_device(instance: &Instance) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices().map_err(VulkanError::Api)? };

        let candidates: Vec<Self> = devices
            .into_iter()
            .filter_map(|device| match Self::evaluate_device(instance, device) {
                Ok(info) => Some(info),
                Err(reason) => {
                    log::debug!("Skipping GPU {:?}: {}", device, reason);
                    None
                }
            })
            .collect();

        let types: Vec<_> = candidates.iter().map(|info| info.properties.device_type).collect();
        let index = preferred_device_index(&types).ok_or(VulkanError::NoSuitableDevice)?;
        let selected = candidates.into_iter().nth(index).ok_or(VulkanError::NoSuitableDevice)?;

        log::info!(
            "Selected GPU: {} ({:?})",
            selected.name(),
            selected.properties.device_type
        );
        Ok(selected)
    }

    fn evaluate_device(instance: &Instance, device: vk::PhysicalDevice) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        if properties.api_version < vk::API_VERSION_1_3 {
            return Err(VulkanError::InitializationFailed("Vulkan 1.3 not supported".to_string()));
        }

        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let queue_family = find_queue_family(&queue_families)
            .ok_or_else(|| VulkanError::InitializationFailed("No graphics+transfer queue family".to_string()))?;

        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };
        let available: Vec<&CStr> = extensions.iter().map(|p| raw_name(&p.extension_name)).collect();
        if let Some(missing) = missing_names(&[SwapchainLoader::name()], &available).first() {
            return Err(VulkanError::ExtensionNotPresent(missing.to_string_lossy().into_owned()));
        }

        let mut dynamic_rendering = vk::PhysicalDeviceDynamicRenderingFeatures::default();
        let supported = {
            let mut features2 = vk::PhysicalDeviceFeatures2::builder().push_next(&mut dynamic_rendering);
            unsafe { instance.get_physical_device_features2(device, &mut features2) };
            features2.features
        };
        if dynamic_rendering.dynamic_rendering != vk::TRUE {
            return Err(VulkanError::InitializationFailed("Dynamic rendering not supported".to_string()));
        }

        let enabled_features = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: supported.sampler_anisotropy,
            fill_mode_non_solid: supported.fill_mode_non_solid,
            ..Default::default()
        };

        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

        Ok(Self {
            device,
            properties,
            enabled_features,
            memory_properties,
            queue_family,
        })
    }

    /// Human-readable device name
    pub fn name(&self) -> String {
        raw_name(&self.properties.device_name).to_string_lossy().into_owned()
    }

    /// Whether anisotropic sampling was enabled on the logical device
    pub fn anisotropy_enabled(&self) -> bool {
        self.enabled_features.sampler_anisotropy == vk::TRUE
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics + transfer queue
    pub queue: vk::Queue,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create the logical device with dynamic rendering enabled
    pub fn new(instance: &Instance, physical_device: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let priorities = [1.0_f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(physical_device.queue_family)
            .queue_priorities(&priorities)
            .build()];

        let extension_ptrs = [SwapchainLoader::name().as_ptr()];
        let mut dynamic_rendering = vk::PhysicalDeviceDynamicRenderingFeatures::builder().dynamic_rendering(true);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&physical_device.enabled_features)
            .push_next(&mut dynamic_rendering);

        let device = unsafe {
            instance
                .create_device(physical_device.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let queue = unsafe { device.get_device_queue(physical_device.queue_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            queue,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Main Vulkan context that owns all core Vulkan resources
///
/// Field order is drop order: the device goes before the instance.
pub struct VulkanContext {
    /// Logical device and queue
    pub device: LogicalDevice,
    /// Selected physical device information
    pub physical_device: PhysicalDeviceInfo,
    /// Vulkan instance and debug utilities
    pub instance: VulkanInstance,
}

impl VulkanContext {
    /// Create a new context
    ///
    /// `window_extensions` are the instance extensions the window system needs
    /// to create a surface; pass an empty slice for headless use.
    pub fn new(config: &VulkanRendererConfig, window_extensions: &[String]) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(config, window_extensions)?;
        let physical_device = PhysicalDeviceInfo::select_suitable_device(&instance.instance)?;
        let device = LogicalDevice::new(&instance.instance, &physical_device)?;

        Ok(Self {
            device,
            physical_device,
            instance,
        })
    }

    /// Get a reference to the Vulkan entry
    pub fn entry(&self) -> &Entry {
        &self.instance.entry
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Get the surface loader
    pub fn surface_loader(&self) -> &Surface {
        &self.instance.surface_loader
    }

    /// Get the physical device info
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Get the logical device
    pub fn device(&self) -> &Device {
        &self.device.device
    }

    /// Get the swapchain loader
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.device.swapchain_loader
    }

    /// Get the graphics + transfer queue
    pub fn queue(&self) -> vk::Queue {
        self.device.queue
    }

    /// Get the queue family index
    pub fn queue_family_index(&self) -> u32 {
        self.physical_device.queue_family
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn test_discrete_gpu_preferred_over_integrated() {
        let types = [
            vk::PhysicalDeviceType::CPU,
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            vk::PhysicalDeviceType::DISCRETE_GPU,
        ];
        assert_eq!(preferred_device_index(&types), Some(2));
    }

    #[test]
    fn test_integrated_gpu_used_as_fallback() {
        let types = [vk::PhysicalDeviceType::VIRTUAL_GPU, vk::PhysicalDeviceType::INTEGRATED_GPU];
        assert_eq!(preferred_device_index(&types), Some(1));
    }

    #[test]
    fn test_first_device_wins_ties() {
        let types = [vk::PhysicalDeviceType::DISCRETE_GPU, vk::PhysicalDeviceType::DISCRETE_GPU];
        assert_eq!(preferred_device_index(&types), Some(0));
        assert_eq!(preferred_device_index(&[]), None);
    }

    #[test]
    fn test_queue_family_needs_graphics_and_transfer() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, 0),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 4),
        ];
        assert_eq!(find_queue_family(&families), Some(3));
        assert_eq!(find_queue_family(&families[..3]), None);
    }

    #[test]
    fn test_missing_extension_names() {
        let swapchain = SwapchainLoader::name();
        let surface = Surface::name();
        let available = [surface];

        assert_eq!(missing_names(&[surface, swapchain], &available), vec![swapchain]);
        assert!(missing_names(&[surface], &available).is_empty());
    }
}
