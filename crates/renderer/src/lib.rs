//! Frame loop and mesh renderer.
//!
//! This crate sequences the RHI objects into a running viewer:
//! - [`FrameScheduler`] paces frames and recovers from stale swapchains
//! - [`Renderer`] owns the GPU resources for one spinning mesh
//! - Depth buffer and uniform data helpers

pub mod depth_buffer;
mod error;
pub mod frame_scheduler;
mod renderer;
pub mod ubo;

pub use error::{RendererError, RendererResult};
pub use frame_scheduler::{
    FrameBackend, FrameScheduler, FrameSlot, FrameStatus, RecreateOutcome,
};
pub use renderer::Renderer;

/// Maximum number of frames that can be in flight simultaneously.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
