//! Swapchain, depth buffer, render pass, and framebuffers.
//!
//! These live and die together: the render pass is the one stable object
//! (attachment formats never change across resizes), everything else is
//! rebuilt by `recreate` when the window size or orientation changes.

use ash::vk;

use super::memory::Image;
use super::{MemoryManager, VulkanContext, VulkanSurface};

/// Depth attachment format, fixed for the lifetime of the renderer.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Vulkan swapchain with its presentation targets.
pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub depth: Image,
    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl Swapchain {
    /// Create a new swapchain with depth buffer, render pass, and one
    /// framebuffer per swapchain image.
    pub unsafe fn new(
        ctx: &VulkanContext,
        surface: &VulkanSurface,
        memory: &MemoryManager,
        width: u32,
        height: u32,
    ) -> Result<Self, String> {
        let format = surface.format.format;
        let (handle, extent) =
            Self::create_swapchain_handle(ctx, surface, width, height, vk::SwapchainKHR::null())?;

        let images = match ctx.swapchain_loader.get_swapchain_images(handle) {
            Ok(images) => images,
            Err(e) => {
                ctx.swapchain_loader.destroy_swapchain(handle, None);
                return Err(format!("Failed to get swapchain images: {:?}", e));
            }
        };

        let image_views = match Self::create_image_views(ctx, &images, format) {
            Ok(views) => views,
            Err(e) => {
                ctx.swapchain_loader.destroy_swapchain(handle, None);
                return Err(e);
            }
        };

        let depth = match memory.create_depth_buffer(extent, "depth buffer") {
            Ok(depth) => depth,
            Err(e) => {
                for view in &image_views {
                    ctx.device.destroy_image_view(*view, None);
                }
                ctx.swapchain_loader.destroy_swapchain(handle, None);
                return Err(e);
            }
        };

        let render_pass = match Self::create_render_pass(ctx, format) {
            Ok(rp) => rp,
            Err(e) => {
                memory.destroy_image(depth);
                for view in &image_views {
                    ctx.device.destroy_image_view(*view, None);
                }
                ctx.swapchain_loader.destroy_swapchain(handle, None);
                return Err(e);
            }
        };

        let framebuffers =
            match Self::create_framebuffers(ctx, render_pass, &image_views, depth.view, extent) {
                Ok(fbs) => fbs,
                Err(e) => {
                    ctx.device.destroy_render_pass(render_pass, None);
                    memory.destroy_image(depth);
                    for view in &image_views {
                        ctx.device.destroy_image_view(*view, None);
                    }
                    ctx.swapchain_loader.destroy_swapchain(handle, None);
                    return Err(e);
                }
            };

        log::debug!(
            "Swapchain created {}x{}, {} images",
            extent.width,
            extent.height,
            images.len()
        );

        Ok(Self {
            handle,
            images,
            image_views,
            format,
            extent,
            depth,
            render_pass,
            framebuffers,
        })
    }

    /// Create the raw swapchain handle, chaining from `old_swapchain` so
    /// the driver can recycle in-flight presentation state. The old handle
    /// is destroyed after the new one exists.
    unsafe fn create_swapchain_handle(
        ctx: &VulkanContext,
        surface: &VulkanSurface,
        width: u32,
        height: u32,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<(vk::SwapchainKHR, vk::Extent2D), String> {
        let caps = &surface.capabilities;
        let extent = surface.get_extent(width, height);

        let mut image_count = caps.min_image_count + 1;
        if caps.max_image_count > 0 && image_count > caps.max_image_count {
            image_count = caps.max_image_count;
        }

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle)
            .min_image_count(image_count)
            .image_format(surface.format.format)
            .image_color_space(surface.format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(surface.present_mode())
            .clipped(true)
            .old_swapchain(old_swapchain);

        let handle = ctx
            .swapchain_loader
            .create_swapchain(&create_info, None)
            .map_err(|e| format!("Failed to create swapchain: {:?}", e))?;

        if old_swapchain != vk::SwapchainKHR::null() {
            ctx.swapchain_loader.destroy_swapchain(old_swapchain, None);
        }

        Ok((handle, extent))
    }

    /// Create image views for swapchain images.
    unsafe fn create_image_views(
        ctx: &VulkanContext,
        images: &[vk::Image],
        format: vk::Format,
    ) -> Result<Vec<vk::ImageView>, String> {
        let mut views = Vec::with_capacity(images.len());
        for &image in images {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            match ctx.device.create_image_view(&create_info, None) {
                Ok(view) => views.push(view),
                Err(e) => {
                    for view in &views {
                        ctx.device.destroy_image_view(*view, None);
                    }
                    return Err(format!("Failed to create swapchain image view: {:?}", e));
                }
            }
        }
        Ok(views)
    }

    /// Create the render pass: color cleared and presented, depth cleared
    /// and discarded after the frame.
    unsafe fn create_render_pass(
        ctx: &VulkanContext,
        format: vk::Format,
    ) -> Result<vk::RenderPass, String> {
        let attachments = [
            // Color
            vk::AttachmentDescription::default()
                .format(format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
            // Depth: never read back, so the store is discarded
            vk::AttachmentDescription::default()
                .format(DEPTH_FORMAT)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        ];

        let color_ref = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_ref)
            .depth_stencil_attachment(&depth_ref)];

        // Stall attachment writes until prior use of these images completes.
        let dependencies = [vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        ctx.device
            .create_render_pass(&create_info, None)
            .map_err(|e| format!("Failed to create render pass: {:?}", e))
    }

    /// Create one framebuffer per swapchain image, all sharing the depth
    /// attachment.
    unsafe fn create_framebuffers(
        ctx: &VulkanContext,
        render_pass: vk::RenderPass,
        image_views: &[vk::ImageView],
        depth_view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> Result<Vec<vk::Framebuffer>, String> {
        let mut framebuffers = Vec::with_capacity(image_views.len());
        for &view in image_views {
            let attachments = [view, depth_view];
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            match ctx.device.create_framebuffer(&create_info, None) {
                Ok(fb) => framebuffers.push(fb),
                Err(e) => {
                    for fb in &framebuffers {
                        ctx.device.destroy_framebuffer(*fb, None);
                    }
                    return Err(format!("Failed to create framebuffer: {:?}", e));
                }
            }
        }
        Ok(framebuffers)
    }

    /// Recreate swapchain-derived state after a resize or orientation
    /// change. Waits for the device to go idle first; resizes are rare and
    /// correctness wins over latency here. The render pass is kept — the
    /// surface format does not change, so pipelines stay valid.
    pub unsafe fn recreate(
        &mut self,
        ctx: &VulkanContext,
        surface: &VulkanSurface,
        memory: &MemoryManager,
        width: u32,
        height: u32,
    ) -> Result<(), String> {
        ctx.wait_idle();

        for fb in self.framebuffers.drain(..) {
            ctx.device.destroy_framebuffer(fb, None);
        }
        for view in self.image_views.drain(..) {
            ctx.device.destroy_image_view(view, None);
        }

        let (handle, extent) =
            Self::create_swapchain_handle(ctx, surface, width, height, self.handle)?;
        self.handle = handle;
        self.extent = extent;

        self.images = ctx
            .swapchain_loader
            .get_swapchain_images(handle)
            .map_err(|e| format!("Failed to get swapchain images: {:?}", e))?;
        self.image_views = Self::create_image_views(ctx, &self.images, self.format)?;

        let new_depth = memory.create_depth_buffer(extent, "depth buffer")?;
        let old_depth = std::mem::replace(&mut self.depth, new_depth);
        memory.destroy_image(old_depth);

        self.framebuffers = Self::create_framebuffers(
            ctx,
            self.render_pass,
            &self.image_views,
            self.depth.view,
            extent,
        )?;

        log::debug!(
            "Swapchain recreated {}x{}, {} images",
            extent.width,
            extent.height,
            self.images.len()
        );

        Ok(())
    }

    /// Destroy the swapchain and all derived resources.
    pub unsafe fn destroy(&mut self, ctx: &VulkanContext, memory: &MemoryManager) {
        ctx.wait_idle();

        for fb in self.framebuffers.drain(..) {
            ctx.device.destroy_framebuffer(fb, None);
        }
        ctx.device.destroy_render_pass(self.render_pass, None);
        self.render_pass = vk::RenderPass::null();

        let depth = std::mem::replace(
            &mut self.depth,
            Image {
                handle: vk::Image::null(),
                view: vk::ImageView::null(),
                allocation: None,
                format: DEPTH_FORMAT,
                extent: vk::Extent2D::default(),
            },
        );
        if depth.handle != vk::Image::null() {
            memory.destroy_image(depth);
        }

        for view in self.image_views.drain(..) {
            ctx.device.destroy_image_view(view, None);
        }
        if self.handle != vk::SwapchainKHR::null() {
            ctx.swapchain_loader.destroy_swapchain(self.handle, None);
            self.handle = vk::SwapchainKHR::null();
        }
    }
}
