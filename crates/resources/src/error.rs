//! Error types for resource loading and mesh packing.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResourceError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Decoded image has a zero width or height.
    #[error("Image '{0}' has zero dimensions")]
    ZeroSize(PathBuf),

    /// Packed scene meshes exceed the lighting pass vertex table.
    #[error("Vertex table overflow: {what} needs {needed}, limit is {limit}")]
    VertexTableOverflow {
        what: &'static str,
        needed: usize,
        limit: usize,
    },
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
