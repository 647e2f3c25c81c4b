//! Per-frame resources and the frame lifecycle state machine.
//!
//! Two frames in flight: the CPU records frame N+1 while the GPU finishes
//! frame N, throttled by each slot's fence. Every slot carries a mapped
//! vertex ring buffer that the draw facade appends into; the write offset
//! resets at the start of the frame and only ever advances within it.

use ash::vk;

use crate::renderer::Vertex;

use super::memory::Buffer;
use super::{
    CommandManager, MemoryManager, Swapchain, VulkanContext, MAX_FRAMES_IN_FLIGHT,
    VERTEX_RING_SIZE,
};

/// Whether appending `needed` bytes at `offset` stays within the ring.
fn append_fits(offset: vk::DeviceSize, needed: vk::DeviceSize) -> bool {
    offset + needed <= VERTEX_RING_SIZE
}

/// Per-frame synchronization and the vertex ring buffer.
pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub fence: vk::Fence,
    vertex_ring: Buffer,
    ring_offset: vk::DeviceSize,
}

/// Frame-slot rotation and the open/closed frame state machine.
pub struct FrameManager {
    slots: Vec<FrameSlot>,
    current_frame: usize,
    image_index: u32,
    frame_open: bool,
    render_pass_open: bool,
}

impl FrameManager {
    /// Create the frame slots: semaphore pair, signaled fence, and a
    /// mapped vertex ring buffer each.
    pub unsafe fn new(ctx: &VulkanContext, memory: &MemoryManager) -> Result<Self, String> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        // Fences start signaled so the first begin_frame doesn't stall
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        let mut slots: Vec<FrameSlot> = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);

        for i in 0..MAX_FRAMES_IN_FLIGHT {
            let build = || -> Result<FrameSlot, String> {
                let image_available = ctx
                    .device
                    .create_semaphore(&semaphore_info, None)
                    .map_err(|e| format!("Failed to create semaphore: {:?}", e))?;
                let render_finished = match ctx.device.create_semaphore(&semaphore_info, None) {
                    Ok(s) => s,
                    Err(e) => {
                        ctx.device.destroy_semaphore(image_available, None);
                        return Err(format!("Failed to create semaphore: {:?}", e));
                    }
                };
                let fence = match ctx.device.create_fence(&fence_info, None) {
                    Ok(f) => f,
                    Err(e) => {
                        ctx.device.destroy_semaphore(render_finished, None);
                        ctx.device.destroy_semaphore(image_available, None);
                        return Err(format!("Failed to create fence: {:?}", e));
                    }
                };
                let vertex_ring = match memory
                    .create_vertex_ring_buffer(VERTEX_RING_SIZE, &format!("vertex ring {}", i))
                {
                    Ok(b) => b,
                    Err(e) => {
                        ctx.device.destroy_fence(fence, None);
                        ctx.device.destroy_semaphore(render_finished, None);
                        ctx.device.destroy_semaphore(image_available, None);
                        return Err(e);
                    }
                };
                if vertex_ring.mapped_ptr().is_none() {
                    memory.destroy_buffer(vertex_ring);
                    ctx.device.destroy_fence(fence, None);
                    ctx.device.destroy_semaphore(render_finished, None);
                    ctx.device.destroy_semaphore(image_available, None);
                    return Err("Vertex ring buffer is not host-visible".to_string());
                }
                Ok(FrameSlot {
                    image_available,
                    render_finished,
                    fence,
                    vertex_ring,
                    ring_offset: 0,
                })
            };

            match build() {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    let mut partial = Self {
                        slots,
                        current_frame: 0,
                        image_index: 0,
                        frame_open: false,
                        render_pass_open: false,
                    };
                    partial.destroy(ctx, memory);
                    return Err(e);
                }
            }
        }

        Ok(Self {
            slots,
            current_frame: 0,
            image_index: 0,
            frame_open: false,
            render_pass_open: false,
        })
    }

    /// Index of the slot currently being recorded.
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Swapchain image acquired for this frame.
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// True between a successful `begin_frame` and `end_frame`.
    pub fn frame_open(&self) -> bool {
        self.frame_open
    }

    /// The current slot's vertex ring buffer handle.
    pub fn ring_buffer(&self) -> vk::Buffer {
        self.slots[self.current_frame].vertex_ring.handle
    }

    /// Current write offset into the ring buffer.
    pub fn ring_offset(&self) -> vk::DeviceSize {
        self.slots[self.current_frame].ring_offset
    }

    /// Begin a frame: throttle on the slot fence, acquire a swapchain
    /// image, reset the command buffer and ring offset, open the render
    /// pass with a fixed clear.
    ///
    /// Returns `Ok(false)` when the swapchain is out of date — the caller
    /// recreates it and skips this frame; that is an operational event,
    /// not an error.
    pub unsafe fn begin_frame(
        &mut self,
        ctx: &VulkanContext,
        commands: &CommandManager,
        swapchain: &Swapchain,
    ) -> Result<bool, String> {
        let slot = &mut self.slots[self.current_frame];

        // Throttle: the GPU must be done with this slot's previous frame
        ctx.device
            .wait_for_fences(&[slot.fence], true, u64::MAX)
            .map_err(|e| format!("Failed to wait for fence: {:?}", e))?;

        let acquire = ctx.swapchain_loader.acquire_next_image(
            swapchain.handle,
            u64::MAX,
            slot.image_available,
            vk::Fence::null(),
        );
        match acquire {
            Ok((index, _suboptimal)) => self.image_index = index,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Ok(false),
            Err(e) => return Err(format!("Failed to acquire swapchain image: {:?}", e)),
        }

        ctx.device
            .reset_fences(&[slot.fence])
            .map_err(|e| format!("Failed to reset fence: {:?}", e))?;

        let cmd = commands.begin_frame(self.current_frame)?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(swapchain.render_pass)
            .framebuffer(swapchain.framebuffers[self.image_index as usize])
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: swapchain.extent,
            })
            .clear_values(&clear_values);

        ctx.device
            .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);

        slot.ring_offset = 0;
        self.frame_open = true;
        self.render_pass_open = true;

        Ok(true)
    }

    /// Close the render pass and command buffer. Idempotent: calling with
    /// no frame open does nothing.
    pub unsafe fn end_frame(&mut self, ctx: &VulkanContext, commands: &CommandManager) {
        if !self.frame_open {
            return;
        }

        let cmd = commands.buffer(self.current_frame);
        if self.render_pass_open {
            ctx.device.cmd_end_render_pass(cmd);
            self.render_pass_open = false;
        }

        if let Err(e) = commands.end_frame(self.current_frame) {
            log::error!("{}", e);
        }
        self.frame_open = false;
    }

    /// Submit the recorded frame and queue it for presentation, then
    /// advance to the next slot.
    ///
    /// Returns `Ok(false)` when presentation reports the swapchain out of
    /// date or suboptimal; the caller recreates it.
    pub unsafe fn present(
        &mut self,
        ctx: &VulkanContext,
        commands: &CommandManager,
        swapchain: &Swapchain,
    ) -> Result<bool, String> {
        let slot = &self.slots[self.current_frame];

        commands.submit_frame(
            ctx,
            self.current_frame,
            slot.image_available,
            slot.render_finished,
            slot.fence,
        )?;

        let wait_semaphores = [slot.render_finished];
        let swapchains = [swapchain.handle];
        let image_indices = [self.image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = ctx
            .swapchain_loader
            .queue_present(ctx.graphics_queue, &present_info);

        self.current_frame = (self.current_frame + 1) % self.slots.len();

        match result {
            Ok(false) => Ok(true),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) | Err(vk::Result::SUBOPTIMAL_KHR) => {
                Ok(false)
            }
            Err(e) => Err(format!("Failed to present: {:?}", e)),
        }
    }

    /// Append vertices to the current frame's ring buffer.
    ///
    /// Returns the byte offset the data landed at, or `None` when the
    /// append would overflow the ring — the draw is dropped and the offset
    /// left unchanged.
    pub fn push_vertices(&mut self, verts: &[Vertex]) -> Option<vk::DeviceSize> {
        let slot = &mut self.slots[self.current_frame];
        let needed = std::mem::size_of_val(verts) as vk::DeviceSize;

        if !append_fits(slot.ring_offset, needed) {
            return None;
        }

        let bytes: &[u8] = bytemuck::cast_slice(verts);
        // Mapped pointer presence was checked at slot creation
        unsafe {
            slot.vertex_ring.write_bytes(slot.ring_offset as usize, bytes);
        }

        let offset = slot.ring_offset;
        slot.ring_offset += needed;
        Some(offset)
    }

    /// Destroy all frame slots.
    pub unsafe fn destroy(&mut self, ctx: &VulkanContext, memory: &MemoryManager) {
        for slot in self.slots.drain(..) {
            ctx.device.destroy_fence(slot.fence, None);
            ctx.device.destroy_semaphore(slot.render_finished, None);
            ctx.device.destroy_semaphore(slot.image_available, None);
            memory.destroy_buffer(slot.vertex_ring);
        }
        self.frame_open = false;
        self.render_pass_open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERT_SIZE: vk::DeviceSize = std::mem::size_of::<Vertex>() as vk::DeviceSize;

    #[test]
    fn test_append_fits_empty_ring() {
        assert!(append_fits(0, VERT_SIZE));
        assert!(append_fits(0, VERTEX_RING_SIZE));
        assert!(append_fits(0, 0));
    }

    #[test]
    fn test_append_rejected_past_capacity() {
        assert!(!append_fits(0, VERTEX_RING_SIZE + 1));
        assert!(!append_fits(VERTEX_RING_SIZE, 1));
        assert!(!append_fits(VERTEX_RING_SIZE - VERT_SIZE + 1, VERT_SIZE));
    }

    #[test]
    fn test_append_exact_fill() {
        // The last vertex that exactly reaches capacity is accepted.
        assert!(append_fits(VERTEX_RING_SIZE - VERT_SIZE, VERT_SIZE));
    }

    #[test]
    fn test_offset_advances_monotonically() {
        // Simulate a frame's worth of appends: the offset strictly
        // increases by each draw's byte size and a rejected append leaves
        // it unchanged.
        let mut offset: vk::DeviceSize = 0;
        for batch in [3u64, 6, 600, 1500] {
            let needed = batch * VERT_SIZE;
            assert!(append_fits(offset, needed));
            let prev = offset;
            offset += needed;
            assert!(offset > prev);
        }

        let huge = VERTEX_RING_SIZE;
        assert!(!append_fits(offset, huge));
        // offset unchanged by the rejected append
        assert_eq!(offset, (3 + 6 + 600 + 1500) * VERT_SIZE);
    }
}
