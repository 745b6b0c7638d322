//! Error types for the restoration pipeline

use std::path::Path;
use thiserror::Error;

/// Result type alias for restoration operations
pub type Result<T> = std::result::Result<T, RestoreError>;

/// Errors that can occur during restoration operations
#[derive(Error, Debug)]
pub enum RestoreError {
    /// I/O operation failures
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding failures
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Pipeline stage failures
    #[error("Processing error: {0}")]
    Processing(String),

    /// External model invocation failures or malformed model output
    #[error("Inference error: {0}")]
    Inference(String),

    /// Reassembly received fewer restored tiles than the grid requires
    #[error("missing restored tiles: expected {expected}, got {actual}")]
    MissingTile {
        /// Tiles the grid requires
        expected: usize,
        /// Tiles actually received
        actual: usize,
    },
}

impl RestoreError {
    /// Create an invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create an inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Wrap an image decode failure with the offending path
    pub fn decode_error(path: &Path, error: image::ImageError) -> Self {
        Self::Processing(format!("Failed to decode '{}': {}", path.display(), error))
    }

    /// Create a processing error attributed to a pipeline stage
    pub fn stage_error<S: Into<String>>(stage: &str, details: S) -> Self {
        Self::Processing(format!("{} stage failed: {}", stage, details.into()))
    }
}
