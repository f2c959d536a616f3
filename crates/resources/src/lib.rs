//! Mesh import for vkframe.
//!
//! Wavefront OBJ files are read with `tobj`, triangulated and flattened into
//! a single vertex list with 32-bit triangle indices, ready for upload.

mod error;

pub mod model;

pub use error::{ResourceError, ResourceResult};
pub use model::MeshData;
