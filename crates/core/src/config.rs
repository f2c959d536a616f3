//! Viewer configuration.
//!
//! Configuration is an immutable value read once at startup and handed to the
//! components that need it. Files are TOML; every field has a default, so a
//! file only needs to name what it changes.
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//!
//! [validation]
//! enabled = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

/// Top-level configuration for the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub window: WindowConfig,
    pub validation: ValidationConfig,
    pub assets: AssetConfig,
    pub camera: CameraConfig,
    /// Spin applied to the mesh about +Y, in radians per second. Negative
    /// values turn clockwise when seen from above.
    pub spin_speed: f32,
    /// RGBA clear color for the color attachment.
    pub clear_color: [f32; 4],
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            validation: ValidationConfig::default(),
            assets: AssetConfig::default(),
            camera: CameraConfig::default(),
            spin_speed: -1.0,
            clear_color: [0.2, 0.2, 0.2, 1.0],
        }
    }
}

impl ViewerConfig {
    /// Reads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Config`]
    /// if it is not valid TOML for this schema or fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        let camera = &self.camera;
        if !(camera.near > 0.0 && camera.far > camera.near) {
            return Err(Error::Config(format!(
                "camera clip planes must satisfy 0 < near < far, got near={} far={}",
                camera.near, camera.far
            )));
        }
        if !(camera.fov_y > 0.0 && camera.fov_y < std::f32::consts::PI) {
            return Err(Error::Config(format!(
                "camera fov_y must be in (0, pi) radians, got {}",
                camera.fov_y
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "vkframe".to_string(),
            width: 900,
            height: 900,
            resizable: true,
        }
    }
}

/// Validation-layer settings, fixed for the lifetime of the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Request `VK_LAYER_KHRONOS_validation` and a debug messenger.
    pub enabled: bool,
    /// Forward INFO and VERBOSE messages too, not only warnings and errors.
    pub verbose: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: cfg!(debug_assertions),
            verbose: false,
        }
    }
}

/// Paths of the mesh and pre-compiled SPIR-V shaders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub mesh: PathBuf,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            mesh: PathBuf::from("assets/models/octahedron.obj"),
            vertex_shader: PathBuf::from("shaders/spirv/mesh.vert.spv"),
            fragment_shader: PathBuf::from("shaders/spirv/mesh.frag.spv"),
        }
    }
}

/// Fixed camera looking at the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub eye: [f32; 3],
    pub target: [f32; 3],
    pub up: [f32; 3],
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            eye: [0.0, -0.1, 1.0],
            target: [0.0, -0.1, 0.0],
            up: [0.0, 1.0, 0.0],
            fov_y: 0.42173,
            near: 0.1,
            far: 250.0,
        }
    }
}
