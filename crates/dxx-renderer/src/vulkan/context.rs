//! Vulkan context: instance, physical device, logical device, and queue.

use ash::khr::{surface, swapchain};
use ash::{vk, Device, Entry, Instance};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use super::{APP_NAME, ENGINE_NAME, ENGINE_VERSION, REQUIRED_VK_VERSION};

/// Main Vulkan context holding all core Vulkan objects.
///
/// Created once at renderer init and borrowed by every other component;
/// destroyed (via `Drop`) only after all derived resources are gone.
pub struct VulkanContext {
    pub entry: Entry,
    pub instance: Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: Device,
    pub queue_family: u32,
    pub graphics_queue: vk::Queue,

    // Extension loaders
    pub surface_loader: surface::Instance,
    pub swapchain_loader: swapchain::Device,

    pub device_properties: vk::PhysicalDeviceProperties,

    // Debug messenger (only in debug builds)
    #[cfg(debug_assertions)]
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    #[cfg(debug_assertions)]
    debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
}

impl VulkanContext {
    /// Create a new Vulkan context.
    ///
    /// Selects the first physical device exposing a graphics queue family;
    /// on the target mobile platform there is typically exactly one GPU, and
    /// its graphics queue also supports presentation.
    pub unsafe fn new(display_handle: raw_window_handle::RawDisplayHandle) -> Result<Self, String> {
        let entry = Entry::linked();

        let enable_validation = cfg!(debug_assertions);
        let instance = Self::create_instance(&entry, display_handle, enable_validation)?;

        #[cfg(debug_assertions)]
        let (debug_utils_loader, debug_messenger) = if enable_validation {
            Self::setup_debug_messenger(&entry, &instance).unwrap_or((None, None))
        } else {
            (None, None)
        };

        let surface_loader = surface::Instance::new(&entry, &instance);

        let (physical_device, queue_family) = Self::pick_physical_device(&instance)?;
        let device_properties = instance.get_physical_device_properties(physical_device);

        let name = CStr::from_ptr(device_properties.device_name.as_ptr()).to_string_lossy();
        log::info!("Using GPU: {}", name);

        let (device, graphics_queue) =
            Self::create_logical_device(&instance, physical_device, queue_family)?;

        let swapchain_loader = swapchain::Device::new(&instance, &device);

        Ok(Self {
            entry,
            instance,
            physical_device,
            device,
            queue_family,
            graphics_queue,
            surface_loader,
            swapchain_loader,
            device_properties,
            #[cfg(debug_assertions)]
            debug_messenger,
            #[cfg(debug_assertions)]
            debug_utils_loader,
        })
    }

    /// Create the Vulkan instance with the surface extensions the window
    /// system requires.
    unsafe fn create_instance(
        entry: &Entry,
        display_handle: raw_window_handle::RawDisplayHandle,
        enable_validation: bool,
    ) -> Result<Instance, String> {
        let app_info = vk::ApplicationInfo::default()
            .application_name(APP_NAME)
            .application_version(ENGINE_VERSION)
            .engine_name(ENGINE_NAME)
            .engine_version(ENGINE_VERSION)
            .api_version(REQUIRED_VK_VERSION);

        let mut extensions = ash_window::enumerate_required_extensions(display_handle)
            .map_err(|e| format!("Failed to get required extensions: {:?}", e))?
            .to_vec();

        #[cfg(debug_assertions)]
        if enable_validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layer_names: Vec<CString> = if enable_validation {
            vec![CString::new("VK_LAYER_KHRONOS_validation").unwrap()]
        } else {
            vec![]
        };
        let layer_name_ptrs: Vec<*const c_char> =
            layer_names.iter().map(|n| n.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_name_ptrs);

        match entry.create_instance(&create_info, None) {
            Ok(instance) => Ok(instance),
            Err(e) if enable_validation => {
                // The validation layer may be absent on end-user devices;
                // retry without it.
                log::warn!("Instance creation with validation failed ({:?}), retrying without", e);
                let create_info = vk::InstanceCreateInfo::default()
                    .application_info(&app_info)
                    .enabled_extension_names(&extensions);
                entry
                    .create_instance(&create_info, None)
                    .map_err(|e| format!("Failed to create Vulkan instance: {:?}", e))
            }
            Err(e) => Err(format!("Failed to create Vulkan instance: {:?}", e)),
        }
    }

    /// Setup debug messenger for validation layers.
    #[cfg(debug_assertions)]
    unsafe fn setup_debug_messenger(
        entry: &Entry,
        instance: &Instance,
    ) -> Result<
        (
            Option<ash::ext::debug_utils::Instance>,
            Option<vk::DebugUtilsMessengerEXT>,
        ),
        String,
    > {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = debug_utils
            .create_debug_utils_messenger(&create_info, None)
            .map_err(|e| format!("Failed to create debug messenger: {:?}", e))?;

        Ok((Some(debug_utils), Some(messenger)))
    }

    /// Select the first physical device with a graphics queue family.
    unsafe fn pick_physical_device(
        instance: &Instance,
    ) -> Result<(vk::PhysicalDevice, u32), String> {
        let devices = instance
            .enumerate_physical_devices()
            .map_err(|e| format!("Failed to enumerate physical devices: {:?}", e))?;

        if devices.is_empty() {
            return Err("No Vulkan-capable GPU found".to_string());
        }

        for &device in &devices {
            if let Some(family) = Self::find_graphics_family(instance, device) {
                return Ok((device, family));
            }
        }

        Err("No GPU with a graphics queue family found".to_string())
    }

    /// Find the first queue family supporting graphics.
    unsafe fn find_graphics_family(
        instance: &Instance,
        device: vk::PhysicalDevice,
    ) -> Option<u32> {
        let families = instance.get_physical_device_queue_family_properties(device);
        families
            .iter()
            .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|i| i as u32)
    }

    /// Create the logical device with a single graphics+present queue.
    unsafe fn create_logical_device(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<(Device, vk::Queue), String> {
        let queue_priorities = [1.0f32];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)];

        let extensions: Vec<*const c_char> = vec![swapchain::NAME.as_ptr()];

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions);

        let device = instance
            .create_device(physical_device, &create_info, None)
            .map_err(|e| format!("Failed to create logical device: {:?}", e))?;

        let graphics_queue = device.get_device_queue(queue_family, 0);

        Ok((device, graphics_queue))
    }

    /// Wait for all device operations to complete.
    pub fn wait_idle(&self) {
        unsafe {
            let _ = self.device.device_wait_idle();
        }
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            self.wait_idle();

            #[cfg(debug_assertions)]
            if let (Some(loader), Some(messenger)) = (&self.debug_utils_loader, self.debug_messenger) {
                loader.destroy_debug_utils_messenger(messenger, None);
            }

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers.
#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _ty: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*data).p_message).to_string_lossy();

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[VK] {}", message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("[VK] {}", message);
    }

    vk::FALSE
}
