//! Error types for terrain streaming and culling

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// A heightmap or tile file is absent. Load sites log it and report an
    /// empty result instead of returning it.
    #[error("Missing resource: {}", .0.display())]
    MissingResource(PathBuf),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A background task panicked or a shared lock was poisoned.
    #[error("Concurrency fault: {0}")]
    Concurrency(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("GPU error: {0}")]
    Gpu(String),
}
