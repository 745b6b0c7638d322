#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Mural Restoration Pipeline
//!
//! A Rust library for patch-based image restoration of damaged murals. The
//! pipeline turns user-marked damage regions into a feathered binary mask,
//! extracts a structural edge map, splits image, mask and edge map into
//! aligned overlapping patches for an external inpainting model, and blends
//! the restored patches back into a seamless full-size image.
//!
//! ## Pipeline stages
//!
//! - **Mask generation**: per-region segmentation with an area-based choice
//!   between a fast threshold path and a precise color-model path, plus
//!   connected-component cleanup and edge feathering
//! - **Edge extraction**: Canny edge map as structural guidance
//! - **Tiling**: overlapping fixed-size patches cut in lock step across the
//!   three channels, zero-padded at the boundary
//! - **Inference**: an [`InferenceBackend`] restores each patch; the
//!   [`IdentityBackend`] exercises the plumbing without a hosted model
//! - **Reassembly**: weighted averaging over valid (non-padded) pixels only
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mural_restore::{
//!     restore_from_bytes, IdentityBackend, ProcessorConfig, RegionBox,
//! };
//!
//! # async fn example(upload_bytes: Vec<u8>) -> mural_restore::Result<()> {
//! let boxes = vec![RegionBox::new(50, 50, 300, 300)];
//! let result = restore_from_bytes(
//!     &upload_bytes,
//!     &boxes,
//!     &ProcessorConfig::default(),
//!     Box::new(IdentityBackend::new()),
//! )
//! .await?;
//! result.save_png("restored.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! - `cli` (default): command-line interface and tracing initialization

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod dataset;
pub mod edge;
pub mod error;
pub mod inference;
pub mod masking;
pub mod processor;
pub mod services;
pub mod tiling;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

// Internal imports for lib functions
use tokio::io::AsyncRead;

// Public API exports
pub use config::{
    EdgeConfig, MaskConfig, ProcessorConfig, ProcessorConfigBuilder, TileConfig,
};
pub use dataset::{DatasetConfig, DatasetGenerator, DatasetSummary};
pub use edge::EdgeMapExtractor;
pub use error::{RestoreError, Result};
pub use inference::{IdentityBackend, InferenceBackend};
pub use masking::{FallbackReason, RegionMaskGenerator, SegmentationPath};
pub use processor::RestorationProcessor;
pub use services::{
    ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, ProcessingStage,
    ProgressReporter, ProgressTracker, ProgressUpdate,
};
pub use tiling::{patch_identifier, PatchBatch, PatchReassembler, PatchTiler};
pub use types::{FullSize, ProcessingTimings, RegionBox, RestorationResult};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig};

/// Restore an image provided as encoded bytes
///
/// Stream-oriented entry point for web servers and memory-based processing:
/// the bytes are decoded, the marked regions are masked, and the full
/// pipeline runs against the given backend.
///
/// # Errors
/// Returns `RestoreError::Image` when the bytes cannot be decoded, or any
/// pipeline error from [`RestorationProcessor::process`].
pub async fn restore_from_bytes(
    image_bytes: &[u8],
    boxes: &[RegionBox],
    config: &ProcessorConfig,
    backend: Box<dyn InferenceBackend>,
) -> Result<RestorationResult> {
    let image = ImageIOService::decode_bytes(image_bytes)?;
    restore_image(&image, boxes, config, backend)
}

/// Restore an image from an async reader stream
///
/// Accepts any async readable stream, for processing images from network
/// streams or large files.
///
/// # Errors
/// Returns `RestoreError::Processing` when the stream cannot be read, plus
/// the errors of [`restore_from_bytes`].
pub async fn restore_from_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    boxes: &[RegionBox],
    config: &ProcessorConfig,
    backend: Box<dyn InferenceBackend>,
) -> Result<RestorationResult> {
    let mut buffer = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buffer)
        .await
        .map_err(|e| RestoreError::processing(format!("Failed to read from stream: {}", e)))?;
    restore_from_bytes(&buffer, boxes, config, backend).await
}

/// Restore a decoded image synchronously
///
/// The most direct entry point: runs the full pipeline over an in-memory
/// RGB image without any I/O.
///
/// # Errors
/// Returns any pipeline error from [`RestorationProcessor::process`].
pub fn restore_image(
    image: &image::RgbImage,
    boxes: &[RegionBox],
    config: &ProcessorConfig,
    backend: Box<dyn InferenceBackend>,
) -> Result<RestorationResult> {
    let mut processor = RestorationProcessor::new(config.clone(), backend)?;
    processor.process(image, boxes)
}
