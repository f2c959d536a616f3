//! Core utilities for vkframe.
//!
//! This crate provides foundational types used across the viewer:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing and FPS measurement
//! - Configuration loading

mod config;
mod error;
mod logging;
mod timer;

pub use config::{AssetConfig, CameraConfig, ValidationConfig, ViewerConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::{FpsCounter, Timer};
