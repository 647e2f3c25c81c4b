//! The immediate-mode renderer facade.
//!
//! Legacy draw routines were written against a fixed-function GL: set a
//! matrix, set a blend mode, bind a texture, emit a fan. [`Renderer`] keeps
//! that contract on top of the explicit Vulkan backend: state setters only
//! mutate CPU-side state, and each draw entry point compiles the current
//! state into one pipeline bind + push-constant update + draw call.
//!
//! One instance per process is the expected use (a game client), but the
//! context is threaded explicitly rather than held in a global.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::matrix::{Mat4, TransformState};
use crate::vulkan::{
    BlendMode, CommandManager, FrameManager, MemoryManager, PipelineSet, PipelineVariant,
    PushConstants, Swapchain, Texture, TextureDescriptors, TextureManager, VulkanContext,
    VulkanSurface, ALPHA_TEST_REF,
};

/// The single vertex interchange format: every draw entry point normalizes
/// its input into sequences of this type.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(position: [f32; 3], color: [f32; 4], uv: [f32; 2]) -> Self {
        Self {
            position,
            color,
            uv,
        }
    }
}

/// Flatten a triangle fan into a triangle list: {0,1,2, 0,2,3, 0,3,4, ...}.
///
/// Returns an empty list for fans shorter than 3 vertices. The explicit
/// GPU API offers no portable fan primitive, so this runs before any fan
/// reaches a pipeline.
pub fn fan_to_list(fan: &[Vertex]) -> Vec<Vertex> {
    if fan.len() < 3 {
        return Vec::new();
    }
    let tri_count = fan.len() - 2;
    let mut list = Vec::with_capacity(tri_count * 3);
    for i in 0..tri_count {
        list.push(fan[0]);
        list.push(fan[i + 1]);
        list.push(fan[i + 2]);
    }
    list
}

/// The renderer: owns the whole Vulkan backend plus the fixed-function
/// emulation state.
pub struct Renderer {
    // Field order is drop order: the allocator must release its memory
    // blocks before the context destroys the device.
    surface: VulkanSurface,
    commands: CommandManager,
    swapchain: Swapchain,
    descriptors: TextureDescriptors,
    pipelines: PipelineSet,
    textures: TextureManager,
    frames: FrameManager,
    memory: MemoryManager,
    ctx: VulkanContext,

    transform: TransformState,
    blend: BlendMode,
    screen_width: u32,
    screen_height: u32,
    shut_down: bool,
}

impl Renderer {
    /// Initialize the renderer against a native window.
    ///
    /// On any failure every component created so far is destroyed in
    /// reverse order before the error is returned; no partially
    /// initialized renderer is ever left running.
    ///
    /// # Safety
    /// The window handles must be valid and outlive the renderer.
    pub unsafe fn new(
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
        width: u32,
        height: u32,
    ) -> Result<Self, String> {
        // VulkanContext cleans itself up via Drop on every early return.
        let ctx = VulkanContext::new(display_handle)?;

        let mut surface = VulkanSurface::new(&ctx, display_handle, window_handle)?;

        let memory = match MemoryManager::new(&ctx) {
            Ok(m) => m,
            Err(e) => {
                surface.destroy(&ctx);
                return Err(e);
            }
        };

        let mut commands = match CommandManager::new(&ctx) {
            Ok(c) => c,
            Err(e) => {
                surface.destroy(&ctx);
                return Err(e);
            }
        };

        let mut swapchain = match Swapchain::new(&ctx, &surface, &memory, width, height) {
            Ok(s) => s,
            Err(e) => {
                commands.destroy(&ctx);
                surface.destroy(&ctx);
                return Err(e);
            }
        };

        let mut descriptors = match TextureDescriptors::new(&ctx) {
            Ok(d) => d,
            Err(e) => {
                swapchain.destroy(&ctx, &memory);
                commands.destroy(&ctx);
                surface.destroy(&ctx);
                return Err(e);
            }
        };

        let mut pipelines =
            match PipelineSet::new(&ctx, swapchain.render_pass, descriptors.layout()) {
                Ok(p) => p,
                Err(e) => {
                    descriptors.destroy(&ctx);
                    swapchain.destroy(&ctx, &memory);
                    commands.destroy(&ctx);
                    surface.destroy(&ctx);
                    return Err(e);
                }
            };

        let mut textures = match TextureManager::new(&ctx, &memory, &commands, &descriptors) {
            Ok(t) => t,
            Err(e) => {
                pipelines.destroy(&ctx);
                descriptors.destroy(&ctx);
                swapchain.destroy(&ctx, &memory);
                commands.destroy(&ctx);
                surface.destroy(&ctx);
                return Err(e);
            }
        };

        let frames = match FrameManager::new(&ctx, &memory) {
            Ok(f) => f,
            Err(e) => {
                textures.destroy(&ctx, &memory, &descriptors);
                pipelines.destroy(&ctx);
                descriptors.destroy(&ctx);
                swapchain.destroy(&ctx, &memory);
                commands.destroy(&ctx);
                surface.destroy(&ctx);
                return Err(e);
            }
        };

        let (screen_width, screen_height) = (swapchain.extent.width, swapchain.extent.height);
        log::info!("Renderer initialized {}x{}", screen_width, screen_height);

        Ok(Self {
            surface,
            commands,
            swapchain,
            descriptors,
            pipelines,
            textures,
            frames,
            memory,
            ctx,
            transform: TransformState::new(),
            blend: BlendMode::Normal,
            screen_width,
            screen_height,
            shut_down: false,
        })
    }

    /// Initialize the renderer against a winit window.
    ///
    /// # Safety
    /// The window must outlive the renderer.
    pub unsafe fn from_winit(
        window: &winit::window::Window,
        width: u32,
        height: u32,
    ) -> Result<Self, String> {
        use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
        let display_handle = window
            .display_handle()
            .map_err(|e| format!("Failed to get display handle: {:?}", e))?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| format!("Failed to get window handle: {:?}", e))?
            .as_raw();
        Self::new(display_handle, window_handle, width, height)
    }

    /// Tear down every GPU resource. Must be the last call on this
    /// renderer; safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.ctx.wait_idle();
        unsafe {
            self.frames.destroy(&self.ctx, &self.memory);
            self.textures.destroy(&self.ctx, &self.memory, &self.descriptors);
            self.pipelines.destroy(&self.ctx);
            self.descriptors.destroy(&self.ctx);
            self.swapchain.destroy(&self.ctx, &self.memory);
            self.commands.destroy(&self.ctx);
            self.surface.destroy(&self.ctx);
        }
        // MemoryManager and VulkanContext finish the teardown on drop.
        log::info!("Renderer shut down");
    }

    // ========================================================================
    // Frame lifecycle
    // ========================================================================

    /// Begin a frame. Returns `Ok(false)` when the frame was skipped
    /// because the swapchain had to be recreated (resize, rotation).
    pub fn begin_frame(&mut self) -> Result<bool, String> {
        if self.shut_down {
            return Ok(false);
        }
        let acquired = unsafe {
            self.frames
                .begin_frame(&self.ctx, &self.commands, &self.swapchain)?
        };
        if !acquired {
            self.recreate_swapchain(self.screen_width, self.screen_height)?;
            return Ok(false);
        }
        self.textures.reset_binding();
        Ok(true)
    }

    /// End the current frame's render pass and command buffer. Idempotent.
    pub fn end_frame(&mut self) {
        unsafe {
            self.frames.end_frame(&self.ctx, &self.commands);
        }
    }

    /// Submit and present the frame, advancing the frame-in-flight slot.
    /// An out-of-date swapchain triggers a recreate instead of an error.
    pub fn present(&mut self) -> Result<(), String> {
        let presented = unsafe {
            self.frames
                .present(&self.ctx, &self.commands, &self.swapchain)?
        };
        if !presented {
            self.recreate_swapchain(self.screen_width, self.screen_height)?;
        }
        Ok(())
    }

    /// The legacy swap-buffers call site: close and present the current
    /// frame, then immediately open the next one, so game code keeps its
    /// one-flip-per-frame structure.
    pub fn flip(&mut self) -> Result<(), String> {
        if !self.frames.frame_open() && !self.begin_frame()? {
            return Ok(());
        }
        self.end_frame();
        self.present()?;
        self.begin_frame()?;
        Ok(())
    }

    /// Rebuild swapchain-derived state for a new window size.
    pub fn recreate_swapchain(&mut self, width: u32, height: u32) -> Result<(), String> {
        unsafe {
            self.surface.refresh_capabilities(&self.ctx)?;
            self.swapchain
                .recreate(&self.ctx, &self.surface, &self.memory, width, height)?;
        }
        self.screen_width = self.swapchain.extent.width;
        self.screen_height = self.swapchain.extent.height;
        Ok(())
    }

    pub fn screen_width(&self) -> u32 {
        self.screen_width
    }

    pub fn screen_height(&self) -> u32 {
        self.screen_height
    }

    /// True between a successful `begin_frame` and `end_frame`.
    pub fn frame_open(&self) -> bool {
        self.frames.frame_open()
    }

    // ========================================================================
    // Fixed-function state setters
    // ========================================================================

    pub fn set_blend_mode(&mut self, blend: BlendMode) {
        self.blend = blend;
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend
    }

    pub fn set_projection_ortho(&mut self, l: f32, r: f32, b: f32, t: f32, n: f32, f: f32) {
        self.transform.set_ortho(l, r, b, t, n, f);
    }

    pub fn set_projection_perspective(&mut self, fovy_deg: f32, aspect: f32, near: f32, far: f32) {
        self.transform.set_perspective(fovy_deg, aspect, near, far);
    }

    pub fn set_modelview(&mut self, m: Mat4) {
        self.transform.set_modelview(m);
    }

    pub fn set_modelview_identity(&mut self) {
        self.transform.load_identity_modelview();
    }

    pub fn mult_modelview(&mut self, m: &Mat4) {
        self.transform.mult_modelview(m);
    }

    pub fn push_projection(&mut self) {
        self.transform.push_projection();
    }

    pub fn pop_projection(&mut self) {
        self.transform.pop_projection();
    }

    pub fn push_modelview(&mut self) {
        self.transform.push_modelview();
    }

    pub fn pop_modelview(&mut self) {
        self.transform.pop_modelview();
    }

    /// Select the texture for subsequent textured draws; `None` selects
    /// the reserved white texture.
    pub fn bind_texture(&mut self, texture: Option<&Texture>) {
        self.textures.bind(texture);
    }

    // ========================================================================
    // Texture lifecycle
    // ========================================================================

    /// Upload an RGBA pixel buffer as a new texture.
    pub fn create_texture(&self, width: u32, height: u32, rgba: &[u8]) -> Result<Texture, String> {
        unsafe {
            TextureManager::create(
                &self.ctx,
                &self.memory,
                &self.commands,
                &self.descriptors,
                width,
                height,
                rgba,
            )
        }
    }

    /// Destroy a texture. Idempotent.
    pub fn destroy_texture(&self, texture: &mut Texture) {
        unsafe {
            TextureManager::destroy_texture(&self.ctx, &self.memory, &self.descriptors, texture);
        }
    }

    // ========================================================================
    // Draw entry points
    // ========================================================================

    /// Draw a triangle list.
    pub fn draw_triangles(&mut self, verts: &[Vertex], textured: bool, is_3d: bool) {
        self.emit_draw(PipelineVariant::for_triangles(textured, is_3d), verts);
    }

    /// Draw a triangle fan. Fans with fewer than 3 vertices are a no-op;
    /// anything else is flattened to a triangle list first.
    pub fn draw_triangle_fan(&mut self, verts: &[Vertex], textured: bool, is_3d: bool) {
        if verts.len() < 3 {
            return;
        }
        let list = fan_to_list(verts);
        self.draw_triangles(&list, textured, is_3d);
    }

    /// Draw a line list. Callers supply vertex pairs; an odd count is
    /// passed through unchanged and the rasterizer ignores the dangling
    /// vertex, matching the behavior draw routines have always seen.
    pub fn draw_lines(&mut self, verts: &[Vertex], is_3d: bool) {
        self.emit_draw(PipelineVariant::for_lines(is_3d), verts);
    }

    /// Append vertices to the frame's ring buffer and record one draw.
    fn emit_draw(&mut self, variant: PipelineVariant, verts: &[Vertex]) {
        if !self.frames.frame_open() || verts.is_empty() {
            return;
        }

        let Some(offset) = self.frames.push_vertices(verts) else {
            log::debug!(
                "vertex ring buffer full, dropping draw of {} vertices",
                verts.len()
            );
            return;
        };

        let cmd = self.commands.buffer(self.frames.current_frame());
        let device = &self.ctx.device;
        let extent = self.swapchain.extent;

        unsafe {
            device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipelines.get(variant, self.blend),
            );

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(cmd, 0, &[viewport]);

            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            device.cmd_set_scissor(cmd, 0, &[scissor]);

            let push = PushConstants {
                mvp: *self.transform.mvp(),
                alpha_ref: ALPHA_TEST_REF,
                pad: [0.0; 3],
            };
            device.cmd_push_constants(
                cmd,
                self.pipelines.layout(),
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                bytemuck::bytes_of(&push),
            );

            let sets = [self.textures.bound_set()];
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipelines.layout(),
                0,
                &sets,
                &[],
            );

            device.cmd_bind_vertex_buffers(cmd, 0, &[self.frames.ring_buffer()], &[offset]);
            device.cmd_draw(cmd, verts.len() as u32, 1, 0, 0);
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f32, y: f32) -> Vertex {
        Vertex::new([x, y, 0.0], [1.0, 1.0, 1.0, 1.0], [0.0, 0.0])
    }

    // ============================================================
    // fan_to_list
    // ============================================================

    #[test]
    fn test_fan_too_short_is_empty() {
        assert!(fan_to_list(&[]).is_empty());
        assert!(fan_to_list(&[v(0.0, 0.0)]).is_empty());
        assert!(fan_to_list(&[v(0.0, 0.0), v(1.0, 0.0)]).is_empty());
    }

    #[test]
    fn test_fan_of_three_is_one_triangle() {
        let fan = [v(0.0, 0.0), v(1.0, 0.0), v(1.0, 1.0)];
        let list = fan_to_list(&fan);
        assert_eq!(list.len(), 3);
        assert_eq!(list, fan.to_vec());
    }

    #[test]
    fn test_fan_quad_splits_into_two_triangles() {
        let fan = [v(0.0, 0.0), v(1.0, 0.0), v(1.0, 1.0), v(0.0, 1.0)];
        let list = fan_to_list(&fan);
        assert_eq!(list.len(), 6);
        assert_eq!(&list[0..3], &[fan[0], fan[1], fan[2]]);
        assert_eq!(&list[3..6], &[fan[0], fan[2], fan[3]]);
    }

    #[test]
    fn test_fan_topology_general() {
        // For all i in [0, n-3): triangle i = (v0, v_{i+1}, v_{i+2})
        let n = 9;
        let fan: Vec<Vertex> = (0..n).map(|i| v(i as f32, 0.0)).collect();
        let list = fan_to_list(&fan);
        assert_eq!(list.len(), 3 * (n - 2));
        for i in 0..n - 2 {
            assert_eq!(list[i * 3], fan[0]);
            assert_eq!(list[i * 3 + 1], fan[i + 1]);
            assert_eq!(list[i * 3 + 2], fan[i + 2]);
        }
    }

    // ============================================================
    // Ring-buffer arithmetic
    // ============================================================

    #[test]
    fn test_ring_capacity_in_vertices() {
        // A full-capacity frame fits an exact number of 36-byte vertices.
        let per_vertex = std::mem::size_of::<Vertex>() as u64;
        assert_eq!(per_vertex, 36);
        let capacity = crate::vulkan::VERTEX_RING_SIZE / per_vertex;
        assert!(capacity > 100_000);
    }
}
