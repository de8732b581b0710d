//! Error types for resource loading.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// Failed to load a glTF file.
    #[error("Failed to load glTF file '{path}': {message}")]
    GltfLoad {
        /// Path to the file that failed to load.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// glTF file has no scene to instantiate.
    #[error("glTF file '{0}' contains no scene")]
    NoScene(PathBuf),

    /// A mesh primitive has no position data.
    #[error("Mesh '{0}' has a primitive without position data")]
    NoPositionData(String),

    /// Decoded image data does not fit its declared format.
    #[error("Unsupported image data: {0}")]
    UnsupportedImage(String),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
