//! Vulkan surface creation from window handles.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};

use super::VulkanContext;

/// Wrapper around a Vulkan presentation surface.
pub struct VulkanSurface {
    pub handle: vk::SurfaceKHR,
    pub format: vk::SurfaceFormatKHR,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
}

impl VulkanSurface {
    /// Create a new Vulkan surface from window handles.
    ///
    /// # Safety
    /// The window handles must be valid and outlive the surface.
    pub unsafe fn new(
        ctx: &VulkanContext,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> Result<Self, String> {
        let handle = ash_window::create_surface(
            &ctx.entry,
            &ctx.instance,
            display_handle,
            window_handle,
            None,
        )
        .map_err(|e| format!("Failed to create Vulkan surface: {:?}", e))?;

        let capabilities = ctx
            .surface_loader
            .get_physical_device_surface_capabilities(ctx.physical_device, handle)
            .map_err(|e| format!("Failed to get surface capabilities: {:?}", e))?;

        let formats = ctx
            .surface_loader
            .get_physical_device_surface_formats(ctx.physical_device, handle)
            .map_err(|e| format!("Failed to get surface formats: {:?}", e))?;

        if formats.is_empty() {
            return Err("Surface reports no formats".to_string());
        }

        let format = Self::choose_surface_format(&formats);

        Ok(Self {
            handle,
            format,
            capabilities,
        })
    }

    /// Create a surface from a winit window.
    pub unsafe fn from_winit(
        ctx: &VulkanContext,
        window: &winit::window::Window,
    ) -> Result<Self, String> {
        let display_handle = window
            .display_handle()
            .map_err(|e| format!("Failed to get display handle: {:?}", e))?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| format!("Failed to get window handle: {:?}", e))?
            .as_raw();

        Self::new(ctx, display_handle, window_handle)
    }

    /// Choose the surface format: prefer sRGB, fall back to the first
    /// available.
    fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
        for format in formats {
            if format.format == vk::Format::B8G8R8A8_SRGB
                || format.format == vk::Format::R8G8B8A8_SRGB
            {
                return *format;
            }
        }
        formats[0]
    }

    /// Present mode for the swapchain. FIFO is the only mode Vulkan
    /// guarantees, and it gives vsync on the target display.
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        vk::PresentModeKHR::FIFO
    }

    /// Refresh surface capabilities (e.g., after window resize).
    pub unsafe fn refresh_capabilities(&mut self, ctx: &VulkanContext) -> Result<(), String> {
        self.capabilities = ctx
            .surface_loader
            .get_physical_device_surface_capabilities(ctx.physical_device, self.handle)
            .map_err(|e| format!("Failed to refresh surface capabilities: {:?}", e))?;
        Ok(())
    }

    /// Get the current extent, clamped to surface capabilities.
    pub fn get_extent(&self, desired_width: u32, desired_height: u32) -> vk::Extent2D {
        if self.capabilities.current_extent.width != u32::MAX {
            // The surface size is defined
            self.capabilities.current_extent
        } else {
            vk::Extent2D {
                width: desired_width.clamp(
                    self.capabilities.min_image_extent.width,
                    self.capabilities.max_image_extent.width,
                ),
                height: desired_height.clamp(
                    self.capabilities.min_image_extent.height,
                    self.capabilities.max_image_extent.height,
                ),
            }
        }
    }

    /// Destroy the surface.
    pub unsafe fn destroy(&mut self, ctx: &VulkanContext) {
        ctx.surface_loader.destroy_surface(self.handle, None);
        self.handle = vk::SurfaceKHR::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_format_prefers_srgb() {
        let formats = [
            fmt(vk::Format::B8G8R8A8_UNORM),
            fmt(vk::Format::R8G8B8A8_SRGB),
        ];
        let chosen = VulkanSurface::choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_SRGB);
    }

    #[test]
    fn test_format_falls_back_to_first() {
        let formats = [
            fmt(vk::Format::R5G6B5_UNORM_PACK16),
            fmt(vk::Format::B8G8R8A8_UNORM),
        ];
        let chosen = VulkanSurface::choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::R5G6B5_UNORM_PACK16);
    }

    fn surface_with_caps(capabilities: vk::SurfaceCapabilitiesKHR) -> VulkanSurface {
        VulkanSurface {
            handle: vk::SurfaceKHR::null(),
            format: fmt(vk::Format::B8G8R8A8_SRGB),
            capabilities,
        }
    }

    #[test]
    fn test_extent_uses_surface_size_when_defined() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            ..Default::default()
        };
        let surface = surface_with_caps(caps);
        let extent = surface.get_extent(800, 600);
        assert_eq!(extent.width, 1280);
        assert_eq!(extent.height, 720);
    }

    #[test]
    fn test_extent_clamps_when_surface_flexible() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 320,
                height: 240,
            },
            max_image_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };
        let surface = surface_with_caps(caps);
        assert_eq!(
            surface.get_extent(800, 600),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
        assert_eq!(
            surface.get_extent(10000, 100),
            vk::Extent2D {
                width: 1920,
                height: 240
            }
        );
    }
}
