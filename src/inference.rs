//! Inference backend abstraction
//!
//! The restoration model is an external collaborator: an opaque batch
//! image-to-image transform over ordered patch triplets. Backends receive the
//! three parallel tile sequences and must return one restored sequence in the
//! same order; the processor validates count and dimensions on the way back.

use crate::{error::Result, tiling::PatchBatch};
use image::RgbImage;

/// Trait for restoration inference backends
pub trait InferenceBackend: Send {
    /// Restore the masked regions of every tile in the batch
    ///
    /// The returned sequence must be index-aligned with the batch: restored
    /// patch *i* corresponds to image/mask/edge patch *i*.
    ///
    /// # Errors
    /// Returns `RestoreError::Inference` when the model invocation fails.
    fn restore(&mut self, batch: &PatchBatch) -> Result<Vec<RgbImage>>;

    /// Human-readable backend name for logs
    fn name(&self) -> &str;
}

/// Pass-through backend that returns the image tiles unchanged
///
/// Used by tests and the CLI dry-run to exercise the full tiling and
/// reassembly plumbing without a hosted model.
#[derive(Debug, Default)]
pub struct IdentityBackend;

impl IdentityBackend {
    /// Create a new identity backend
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl InferenceBackend for IdentityBackend {
    fn restore(&mut self, batch: &PatchBatch) -> Result<Vec<RgbImage>> {
        Ok(batch.images.clone())
    }

    fn name(&self) -> &str {
        "identity"
    }
}
