//! GPU memory management using gpu-allocator.

use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use std::sync::Arc;

use super::VulkanContext;

/// GPU buffer with associated memory.
pub struct Buffer {
    pub handle: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub size: vk::DeviceSize,
}

impl Buffer {
    /// Map the buffer memory for CPU access.
    ///
    /// Only valid for buffers created in CPU-visible memory.
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .map(|p| p.as_ptr() as *mut u8)
    }

    /// Write raw bytes at a byte offset into a mapped buffer.
    ///
    /// # Safety
    /// Buffer must be mappable and `offset + data.len()` must fit.
    pub unsafe fn write_bytes(&self, offset: usize, data: &[u8]) {
        if let Some(ptr) = self.mapped_ptr() {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset), data.len());
        }
    }
}

/// GPU image with view and associated memory.
pub struct Image {
    pub handle: vk::Image,
    pub view: vk::ImageView,
    pub allocation: Option<Allocation>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

/// Memory manager wrapping gpu-allocator.
pub struct MemoryManager {
    allocator: Arc<Mutex<Allocator>>,
    device: ash::Device,
}

impl MemoryManager {
    /// Create a new memory manager.
    pub unsafe fn new(ctx: &VulkanContext) -> Result<Self, String> {
        let mut debug_settings = gpu_allocator::AllocatorDebugSettings::default();
        debug_settings.log_memory_information = cfg!(debug_assertions);
        debug_settings.log_leaks_on_shutdown = true;

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: ctx.instance.clone(),
            device: ctx.device.clone(),
            physical_device: ctx.physical_device,
            debug_settings,
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| format!("Failed to create allocator: {:?}", e))?;

        Ok(Self {
            allocator: Arc::new(Mutex::new(allocator)),
            device: ctx.device.clone(),
        })
    }

    /// Create a buffer with the specified usage and memory location.
    pub unsafe fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<Buffer, String> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = self
            .device
            .create_buffer(&buffer_info, None)
            .map_err(|e| format!("Failed to create buffer: {:?}", e))?;

        let requirements = self.device.get_buffer_memory_requirements(handle);

        let allocation = match self.allocator.lock().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(a) => a,
            Err(e) => {
                self.device.destroy_buffer(handle, None);
                return Err(format!("Failed to allocate buffer memory: {:?}", e));
            }
        };

        if let Err(e) = self
            .device
            .bind_buffer_memory(handle, allocation.memory(), allocation.offset())
        {
            self.device.destroy_buffer(handle, None);
            let _ = self.allocator.lock().free(allocation);
            return Err(format!("Failed to bind buffer memory: {:?}", e));
        }

        Ok(Buffer {
            handle,
            allocation: Some(allocation),
            size,
        })
    }

    /// Create a staging buffer (CPU-visible, transfer source, mapped).
    pub unsafe fn create_staging_buffer(
        &self,
        size: vk::DeviceSize,
        name: &str,
    ) -> Result<Buffer, String> {
        self.create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            name,
        )
    }

    /// Create a per-frame vertex ring buffer (CPU-visible, mapped, used
    /// directly as the vertex source without a device-local copy).
    pub unsafe fn create_vertex_ring_buffer(
        &self,
        size: vk::DeviceSize,
        name: &str,
    ) -> Result<Buffer, String> {
        self.create_buffer(
            size,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            MemoryLocation::CpuToGpu,
            name,
        )
    }

    /// Create a 2D image with a matching view.
    pub unsafe fn create_image(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect_mask: vk::ImageAspectFlags,
        name: &str,
    ) -> Result<Image, String> {
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

        let handle = self
            .device
            .create_image(&image_info, None)
            .map_err(|e| format!("Failed to create image: {:?}", e))?;

        let requirements = self.device.get_image_memory_requirements(handle);

        let allocation = match self.allocator.lock().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(a) => a,
            Err(e) => {
                self.device.destroy_image(handle, None);
                return Err(format!("Failed to allocate image memory: {:?}", e));
            }
        };

        if let Err(e) = self
            .device
            .bind_image_memory(handle, allocation.memory(), allocation.offset())
        {
            self.device.destroy_image(handle, None);
            let _ = self.allocator.lock().free(allocation);
            return Err(format!("Failed to bind image memory: {:?}", e));
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(handle)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = match self.device.create_image_view(&view_info, None) {
            Ok(v) => v,
            Err(e) => {
                self.device.destroy_image(handle, None);
                let _ = self.allocator.lock().free(allocation);
                return Err(format!("Failed to create image view: {:?}", e));
            }
        };

        Ok(Image {
            handle,
            view,
            allocation: Some(allocation),
            format,
            extent,
        })
    }

    /// Create a sampled 2D texture image (transfer destination).
    pub unsafe fn create_texture_2d(
        &self,
        width: u32,
        height: u32,
        name: &str,
    ) -> Result<Image, String> {
        self.create_image(
            vk::Extent2D { width, height },
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            vk::ImageAspectFlags::COLOR,
            name,
        )
    }

    /// Create a depth buffer matching the swapchain extent.
    pub unsafe fn create_depth_buffer(
        &self,
        extent: vk::Extent2D,
        name: &str,
    ) -> Result<Image, String> {
        self.create_image(
            extent,
            vk::Format::D32_SFLOAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
            name,
        )
    }

    /// Destroy a buffer.
    pub unsafe fn destroy_buffer(&self, mut buffer: Buffer) {
        self.device.destroy_buffer(buffer.handle, None);
        if let Some(allocation) = buffer.allocation.take() {
            let _ = self.allocator.lock().free(allocation);
        }
    }

    /// Destroy an image and its view.
    pub unsafe fn destroy_image(&self, mut image: Image) {
        self.device.destroy_image_view(image.view, None);
        self.device.destroy_image(image.handle, None);
        if let Some(allocation) = image.allocation.take() {
            let _ = self.allocator.lock().free(allocation);
        }
    }
}
