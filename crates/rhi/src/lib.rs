//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Thin RAII wrappers over the `ash` objects a single-window mesh viewer
//! needs:
//! - Instance, GPU selection and logical device
//! - Swapchain negotiation and recreation
//! - Render pass, framebuffers and the fixed mesh pipeline
//! - Buffers, descriptor sets and command recording
//! - Fences and semaphores for frame pacing

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
