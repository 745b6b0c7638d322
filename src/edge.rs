//! Structural edge-map extraction
//!
//! The restoration model consumes a binary edge channel as auxiliary
//! guidance. Extraction is deterministic and stateless: grayscale conversion
//! followed by Canny with a fixed hysteresis threshold pair.

use crate::config::EdgeConfig;
use image::{imageops, GrayImage, RgbImage};
use imageproc::edges::canny;

/// Derives a binary structural edge channel from the source image
pub struct EdgeMapExtractor;

impl EdgeMapExtractor {
    /// Extract the edge map: edge pixels 255, everything else 0
    #[must_use]
    pub fn extract(image: &RgbImage, config: &EdgeConfig) -> GrayImage {
        let gray = imageops::grayscale(image);
        canny(&gray, config.low, config.high)
    }
}
