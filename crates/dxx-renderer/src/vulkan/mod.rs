//! Vulkan 1.1 renderer backend.
//!
//! This module implements the GPU-facing half of the renderer: device and
//! swapchain ownership, memory allocation, command recording, the baked
//! pipeline table, texture upload, and the per-frame vertex ring buffers.
//! The immediate-mode draw API on top of it lives in `crate::renderer`.

pub mod commands;
pub mod context;
pub mod descriptors;
pub mod frame;
pub mod memory;
pub mod pipelines;
pub mod surface;
pub mod swapchain;
pub mod textures;

pub use commands::CommandManager;
pub use context::VulkanContext;
pub use descriptors::TextureDescriptors;
pub use frame::FrameManager;
pub use memory::{Buffer, Image, MemoryManager};
pub use pipelines::{BlendMode, PipelineSet, PipelineVariant, PushConstants};
pub use surface::VulkanSurface;
pub use swapchain::Swapchain;
pub use textures::{Texture, TextureManager};

use ash::vk;
use std::ffi::CStr;

/// Required Vulkan version. Android loaders cannot statically link past 1.1.
pub const REQUIRED_VK_VERSION: u32 = vk::make_api_version(0, 1, 1, 0);

/// Application name for the Vulkan instance.
pub const APP_NAME: &CStr = c"D1X-Rebirth";

/// Engine name for the Vulkan instance.
pub const ENGINE_NAME: &CStr = c"DXX-Rebirth";

/// Engine version.
pub const ENGINE_VERSION: u32 = vk::make_api_version(0, 0, 61, 0);

/// Number of frames in flight for double-buffering.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Per-frame ring buffer size for vertex data (4MB per frame).
pub const VERTEX_RING_SIZE: vk::DeviceSize = 4 * 1024 * 1024;

/// Alpha-test reference pushed with every draw. Fragments below this
/// alpha are discarded, reproducing the fixed-function cutout semantics
/// the legacy draw routines rely on.
pub const ALPHA_TEST_REF: f32 = 0.02;
