//! RHI-specific error types.
//!
//! Every variant here is fatal to the caller: it aborts the current
//! initialization step or frame. Stale-surface conditions are not errors and
//! never reach this type; acquire and present hand back the raw
//! [`ash::vk::Result`] so the frame loop can recover from them in place.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error, including the absence of a compatible memory type
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// The driver refused to create an object
    #[error("Failed to create {object}: {result}")]
    Creation {
        object: &'static str,
        result: vk::Result,
    },

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// None of the candidate depth formats supports depth attachments
    #[error("No supported depth format among {0:?}")]
    UnsupportedDepthFormat(Vec<vk::Format>),

    /// Image layout transition with no known access/stage mapping
    #[error("Unsupported layout transition: {from:?} -> {to:?}")]
    UnsupportedLayoutTransition {
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    },

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Acquire or present failed with something other than a stale surface
    #[error("Presentation failed: {0}")]
    PresentationError(vk::Result),

    /// Queue submission failed
    #[error("Queue submission failed: {0}")]
    SubmitError(vk::Result),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Invalid buffer size or out-of-range write
    #[error("Buffer error: {0}")]
    BufferError(String),

    /// Another thread panicked while holding the allocator lock
    #[error("GPU allocator lock poisoned")]
    AllocatorPoisoned,
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_error_names_object() {
        let err = RhiError::Creation {
            object: "fence",
            result: vk::Result::ERROR_OUT_OF_HOST_MEMORY,
        };
        assert!(err.to_string().starts_with("Failed to create fence"));
    }

    #[test]
    fn test_vk_result_converts() {
        let err: RhiError = vk::Result::ERROR_DEVICE_LOST.into();
        assert!(matches!(
            err,
            RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST)
        ));
    }
}
