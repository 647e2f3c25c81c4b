#![allow(clippy::too_many_arguments)]
// Vulkan immediate-mode rendering backend for the legacy fixed-function
// draw API the game code is written against.

pub mod draw2d;
pub mod matrix;
pub mod renderer;
pub mod vulkan;

pub use matrix::{Mat4, TransformState};
pub use renderer::{Renderer, Vertex};
pub use vulkan::{BlendMode, PipelineVariant, Texture};
