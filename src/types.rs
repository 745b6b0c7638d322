//! Core data types shared across the restoration pipeline

use crate::error::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// User-selected axis-aligned rectangle marking a region to restore
///
/// Coordinates are accepted in any order and may lie outside the image;
/// normalization and clamping happen when the box is resolved against a
/// concrete image size. Inverted or out-of-bounds input never raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionBox {
    /// Left edge (inclusive)
    pub x1: i64,
    /// Top edge (inclusive)
    pub y1: i64,
    /// Right edge (exclusive)
    pub x2: i64,
    /// Bottom edge (exclusive)
    pub y2: i64,
}

impl RegionBox {
    /// Create a box from two corner points, normalizing the coordinate order
    #[must_use]
    pub fn new(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Create a box from an origin and extent (web-frontend rectangle form)
    #[must_use]
    pub fn from_origin_size(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    /// Area of the normalized rectangle before clamping
    ///
    /// Path selection in the mask generator keys off this value, matching the
    /// user's drawn extent rather than the in-bounds intersection.
    #[must_use]
    pub fn area(&self) -> u64 {
        let w = (self.x2 - self.x1).unsigned_abs();
        let h = (self.y2 - self.y1).unsigned_abs();
        w * h
    }

    /// Intersect with `[0, width) x [0, height)`
    ///
    /// Returns `None` when the clamped rectangle is degenerate (either side
    /// shorter than 2 px); such boxes contribute an empty mask region.
    #[must_use]
    pub fn clamp(&self, width: u32, height: u32) -> Option<ClampedBox> {
        let x1 = self.x1.clamp(0, i64::from(width));
        let y1 = self.y1.clamp(0, i64::from(height));
        let x2 = self.x2.clamp(0, i64::from(width));
        let y2 = self.y2.clamp(0, i64::from(height));
        if x2 - x1 < 2 || y2 - y1 < 2 {
            return None;
        }
        Some(ClampedBox {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        })
    }
}

/// A region box resolved against a concrete image: in-bounds, non-degenerate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampedBox {
    /// Left edge in image coordinates
    pub x: u32,
    /// Top edge in image coordinates
    pub y: u32,
    /// Width, at least 2
    pub width: u32,
    /// Height, at least 2
    pub height: u32,
}

/// Original raster dimensions, required to invert tiling during reassembly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullSize {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl FullSize {
    /// Capture the dimensions of an image
    #[must_use]
    pub fn of(image: &RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }
}

/// Wall-clock timings for each pipeline stage, in milliseconds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Total end-to-end time
    pub total_ms: u64,
    /// Mask synthesis from region boxes
    pub mask_ms: u64,
    /// Edge-map extraction
    pub edge_ms: u64,
    /// Patch decomposition
    pub tiling_ms: u64,
    /// External model invocation
    pub inference_ms: u64,
    /// Weighted reassembly
    pub reassembly_ms: u64,
}

/// Final output of a restoration request
#[derive(Debug, Clone)]
pub struct RestorationResult {
    /// Recomposited full-resolution image
    pub image: RgbImage,
    /// Number of tiles per channel that were processed
    pub patch_count: usize,
    /// Per-stage timings
    pub timings: ProcessingTimings,
}

impl RestorationResult {
    /// Output dimensions
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Save the result as PNG
    ///
    /// # Errors
    /// Returns `RestoreError::Image` on encoding failures or
    /// `RestoreError::Io` on filesystem errors.
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.image
            .save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }

    /// Encode the result to PNG bytes
    ///
    /// # Errors
    /// Returns `RestoreError::Image` on encoding failures.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.image.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_box_normalizes_inverted_corners() {
        let b = RegionBox::new(300, 200, 100, 50);
        assert_eq!(b.x1, 100);
        assert_eq!(b.y1, 50);
        assert_eq!(b.x2, 300);
        assert_eq!(b.y2, 200);
        assert_eq!(b.area(), 200 * 150);
    }

    #[test]
    fn test_region_box_clamp_out_of_bounds() {
        let b = RegionBox::new(-50, -50, 100, 100);
        let clamped = b.clamp(640, 480).unwrap();
        assert_eq!(clamped.x, 0);
        assert_eq!(clamped.y, 0);
        assert_eq!(clamped.width, 100);
        assert_eq!(clamped.height, 100);
    }

    #[test]
    fn test_region_box_clamp_degenerate() {
        // Entirely outside the image
        let b = RegionBox::new(700, 500, 800, 600);
        assert!(b.clamp(640, 480).is_none());

        // Clamps to a sliver thinner than 2 px
        let b = RegionBox::new(639, 0, 800, 100);
        assert!(b.clamp(640, 480).is_none());
    }

    #[test]
    fn test_region_box_from_origin_size() {
        let b = RegionBox::from_origin_size(50, 50, 250, 250);
        assert_eq!(b, RegionBox::new(50, 50, 300, 300));
        assert_eq!(b.area(), 62_500);
    }

    #[test]
    fn test_full_size_of_image() {
        let img = RgbImage::new(600, 400);
        let size = FullSize::of(&img);
        assert_eq!(size.width, 600);
        assert_eq!(size.height, 400);
    }

    #[test]
    fn test_result_png_round_trip() {
        let mut img = RgbImage::new(8, 8);
        for p in img.pixels_mut() {
            *p = image::Rgb([10, 200, 30]);
        }
        let result = RestorationResult {
            image: img.clone(),
            patch_count: 1,
            timings: ProcessingTimings::default(),
        };
        let bytes = result.to_png_bytes().unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(decoded, img);
    }
}
