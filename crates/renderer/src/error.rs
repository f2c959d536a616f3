//! Renderer-level error type.

use thiserror::Error;

use vkframe_resources::ResourceError;
use vkframe_rhi::RhiError;

/// Errors raised while setting up or running the renderer.
#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error("Mesh loading failed: {0}")]
    Resource(#[from] ResourceError),

    /// Window-side failures such as surface creation.
    #[error("Platform error: {0}")]
    Platform(#[from] vkframe_core::Error),
}

pub type RendererResult<T> = Result<T, RendererError>;
