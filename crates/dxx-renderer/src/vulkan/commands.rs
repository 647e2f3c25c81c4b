//! Command buffer management.
//!
//! One primary command buffer per frame-in-flight slot, plus a transient
//! pool for the synchronous single-use submissions texture upload needs.

use ash::vk;

use super::{VulkanContext, MAX_FRAMES_IN_FLIGHT};

/// Command pool and per-frame primary command buffers.
pub struct CommandManager {
    pool: vk::CommandPool,
    buffers: Vec<vk::CommandBuffer>,
    transient_pool: vk::CommandPool,
    device: ash::Device,
}

impl CommandManager {
    /// Create a new command manager.
    pub unsafe fn new(ctx: &VulkanContext) -> Result<Self, String> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(ctx.queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = ctx
            .device
            .create_command_pool(&pool_info, None)
            .map_err(|e| format!("Failed to create command pool: {:?}", e))?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(MAX_FRAMES_IN_FLIGHT as u32);

        let buffers = match ctx.device.allocate_command_buffers(&alloc_info) {
            Ok(buffers) => buffers,
            Err(e) => {
                ctx.device.destroy_command_pool(pool, None);
                return Err(format!("Failed to allocate command buffers: {:?}", e));
            }
        };

        let transient_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(ctx.queue_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);

        let transient_pool = match ctx.device.create_command_pool(&transient_info, None) {
            Ok(p) => p,
            Err(e) => {
                ctx.device.destroy_command_pool(pool, None);
                return Err(format!("Failed to create transient pool: {:?}", e));
            }
        };

        Ok(Self {
            pool,
            buffers,
            transient_pool,
            device: ctx.device.clone(),
        })
    }

    /// Get the primary command buffer for a frame slot.
    pub fn buffer(&self, slot: usize) -> vk::CommandBuffer {
        self.buffers[slot]
    }

    /// Reset and begin recording a frame slot's command buffer.
    pub unsafe fn begin_frame(&self, slot: usize) -> Result<vk::CommandBuffer, String> {
        let cmd = self.buffers[slot];

        self.device
            .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
            .map_err(|e| format!("Failed to reset command buffer: {:?}", e))?;

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        self.device
            .begin_command_buffer(cmd, &begin_info)
            .map_err(|e| format!("Failed to begin command buffer: {:?}", e))?;

        Ok(cmd)
    }

    /// End recording a frame slot's command buffer.
    pub unsafe fn end_frame(&self, slot: usize) -> Result<(), String> {
        self.device
            .end_command_buffer(self.buffers[slot])
            .map_err(|e| format!("Failed to end command buffer: {:?}", e))
    }

    /// Submit a frame slot's commands to the graphics queue.
    ///
    /// Waits on `wait_semaphore` at the color-attachment-output stage and
    /// signals `signal_semaphore` plus `fence` on completion.
    pub unsafe fn submit_frame(
        &self,
        ctx: &VulkanContext,
        slot: usize,
        wait_semaphore: vk::Semaphore,
        signal_semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<(), String> {
        let wait_semaphores = [wait_semaphore];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [signal_semaphore];
        let command_buffers = [self.buffers[slot]];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        ctx.device
            .queue_submit(ctx.graphics_queue, &[submit_info], fence)
            .map_err(|e| format!("Failed to submit command buffer: {:?}", e))
    }

    /// Begin a single-use command buffer from the transient pool.
    pub unsafe fn begin_single_time(&self) -> Result<vk::CommandBuffer, String> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.transient_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let cmd = self
            .device
            .allocate_command_buffers(&alloc_info)
            .map_err(|e| format!("Failed to allocate command buffer: {:?}", e))?[0];

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        if let Err(e) = self.device.begin_command_buffer(cmd, &begin_info) {
            self.device.free_command_buffers(self.transient_pool, &[cmd]);
            return Err(format!("Failed to begin command buffer: {:?}", e));
        }

        Ok(cmd)
    }

    /// End and submit a single-use command buffer, waiting for completion.
    ///
    /// Synchronous by design: this path only runs for texture uploads,
    /// which are not per-frame work.
    pub unsafe fn end_single_time(
        &self,
        ctx: &VulkanContext,
        cmd: vk::CommandBuffer,
    ) -> Result<(), String> {
        let result = self
            .device
            .end_command_buffer(cmd)
            .map_err(|e| format!("Failed to end command buffer: {:?}", e))
            .and_then(|_| {
                let command_buffers = [cmd];
                let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

                ctx.device
                    .queue_submit(ctx.graphics_queue, &[submit_info], vk::Fence::null())
                    .map_err(|e| format!("Failed to submit command buffer: {:?}", e))?;

                ctx.device
                    .queue_wait_idle(ctx.graphics_queue)
                    .map_err(|e| format!("Failed to wait for queue: {:?}", e))
            });

        self.device.free_command_buffers(self.transient_pool, &[cmd]);
        result
    }

    /// Record an image layout transition.
    pub unsafe fn transition_image_layout(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        aspect_mask: vk::ImageAspectFlags,
    ) {
        let (src_access, dst_access, src_stage, dst_stage) = match (old_layout, new_layout) {
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
            ),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ),
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
                vk::AccessFlags::empty(),
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            ),
            _ => (
                vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::PipelineStageFlags::ALL_COMMANDS,
            ),
        };

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(src_access)
            .dst_access_mask(dst_access);

        self.device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }

    /// Copy a staging buffer into a 2D image.
    pub unsafe fn copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        image: vk::Image,
        width: u32,
        height: u32,
    ) {
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
                width,
                height,
                depth: 1,
            });

        self.device.cmd_copy_buffer_to_image(
            cmd,
            buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
    }

    /// Destroy all command pools.
    pub unsafe fn destroy(&mut self, ctx: &VulkanContext) {
        ctx.device.destroy_command_pool(self.pool, None);
        ctx.device.destroy_command_pool(self.transient_pool, None);
        self.pool = vk::CommandPool::null();
        self.transient_pool = vk::CommandPool::null();
    }
}
