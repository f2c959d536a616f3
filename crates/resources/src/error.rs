//! Error types for resource loading.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The OBJ importer rejected the file.
    #[error("Failed to load OBJ file '{path}': {source}")]
    ObjLoad {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    /// The file parsed but holds no triangles.
    #[error("'{0}' contains no triangle geometry")]
    NoGeometry(PathBuf),

    /// The mesh has more vertices than a 32-bit index can address.
    #[error("Mesh has too many vertices for 32-bit indices: {0}")]
    TooManyVertices(usize),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
