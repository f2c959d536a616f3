//! Platform layer for vkframe.
//!
//! This crate provides:
//! - Window management via winit
//! - Resize notification through [`ResizeSignal`] subscriptions
//! - Vulkan surface creation from raw window handles

mod resize;
mod window;

pub use resize::ResizeSignal;
pub use window::{Surface, Window, get_required_extensions};

pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
