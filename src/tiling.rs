//! Overlap-aware patch decomposition and seam-suppressing reassembly
//!
//! The tiler cuts aligned image/mask/edge rasters into a fixed-size,
//! fixed-stride grid of square patches in raster-scan order; the reassembler
//! inverts the grid with overlap-weighted averaging. Index *i* in every patch
//! sequence denotes the same spatial tile — everything downstream depends on
//! that ordering.

use crate::{
    config::TileConfig,
    error::{RestoreError, Result},
    types::FullSize,
};
use image::{GrayImage, ImageBuffer, Pixel, RgbImage};
use ndarray::{Array2, Array3};
use tracing::debug;

/// Stable identifier for the patch at `index`; sorts lexicographically in
/// raster-scan order
///
/// Six digits of zero padding keep the sort contract intact well past any
/// realistic grid (a 10_000-tile grid would overflow four digits).
#[must_use]
pub fn patch_identifier(index: usize) -> String {
    format!("patch_{:06}", index + 1)
}

/// Grid origins in raster-scan order: `y` outer, `x` inner, stepping by the
/// stride, inclusive of origins that produce a partial boundary tile
#[must_use]
pub fn grid_origins(full_size: FullSize, stride: u32) -> Vec<(u32, u32)> {
    let mut origins = Vec::new();
    let mut y = 0;
    while y < full_size.height {
        let mut x = 0;
        while x < full_size.width {
            origins.push((x, y));
            x += stride;
        }
        y += stride;
    }
    origins
}

/// Ordered, aligned patch sequences for the three input channels
///
/// All three vectors share one length and one ordering; the struct is only
/// constructed by [`PatchTiler::tile`], which guarantees the alignment.
#[derive(Debug, Clone)]
pub struct PatchBatch {
    /// RGB tiles of the source image
    pub images: Vec<RgbImage>,
    /// Binary mask tiles
    pub masks: Vec<GrayImage>,
    /// Binary edge tiles
    pub edges: Vec<GrayImage>,
    /// Dimensions of the raster the batch was cut from
    pub full_size: FullSize,
    /// Tiling parameters the batch was cut with
    pub tile: TileConfig,
}

impl PatchBatch {
    /// Number of tiles per channel
    #[must_use]
    pub fn patch_count(&self) -> usize {
        self.images.len()
    }

    /// Identifiers for every patch, in sequence order
    #[must_use]
    pub fn identifiers(&self) -> Vec<String> {
        (0..self.patch_count()).map(patch_identifier).collect()
    }
}

/// Decomposes aligned rasters into a fixed-size, fixed-stride patch grid
pub struct PatchTiler;

impl PatchTiler {
    /// Cut the aligned (image, mask, edge) triplet into patch sequences
    ///
    /// Boundary tiles whose window exceeds the raster are placed at the
    /// top-left of a zero-filled buffer (zero-padding, not edge replication).
    ///
    /// # Errors
    /// Returns `RestoreError::InvalidConfig` for a bad lattice and
    /// `RestoreError::Processing` when the channel dimensions disagree.
    pub fn tile(
        image: &RgbImage,
        mask: &GrayImage,
        edge: &GrayImage,
        config: &TileConfig,
    ) -> Result<PatchBatch> {
        config.validate()?;
        let full_size = FullSize::of(image);
        if mask.dimensions() != image.dimensions() || edge.dimensions() != image.dimensions() {
            return Err(RestoreError::stage_error(
                "tiling",
                "image, mask and edge rasters must share dimensions",
            ));
        }

        let origins = grid_origins(full_size, config.stride);
        let mut images = Vec::with_capacity(origins.len());
        let mut masks = Vec::with_capacity(origins.len());
        let mut edges = Vec::with_capacity(origins.len());

        // Lock-step emission: one origin produces index i in all three
        // sequences.
        for &(x, y) in &origins {
            images.push(crop_pad(image, x, y, config.size));
            masks.push(crop_pad(mask, x, y, config.size));
            edges.push(crop_pad(edge, x, y, config.size));
        }

        debug!(
            patches = origins.len(),
            width = full_size.width,
            height = full_size.height,
            "tiled request into patch grid"
        );

        Ok(PatchBatch {
            images,
            masks,
            edges,
            full_size,
            tile: *config,
        })
    }

    /// Expected patch count for a raster: `ceil(H/T) * ceil(W/T)`
    #[must_use]
    pub fn expected_count(full_size: FullSize, stride: u32) -> usize {
        let cols = ((full_size.width + stride - 1) / stride) as usize;
        let rows = ((full_size.height + stride - 1) / stride) as usize;
        cols * rows
    }
}

/// Crop a `size x size` window at (x, y), zero-padding past the raster edge
fn crop_pad<P>(src: &ImageBuffer<P, Vec<P::Subpixel>>, x: u32, y: u32, size: u32) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let mut out = ImageBuffer::new(size, size);
    let valid_w = size.min(src.width().saturating_sub(x));
    let valid_h = size.min(src.height().saturating_sub(y));
    for dy in 0..valid_h {
        for dx in 0..valid_w {
            out.put_pixel(dx, dy, *src.get_pixel(x + dx, y + dy));
        }
    }
    out
}

/// Recombines a restored patch sequence into one full-resolution image
pub struct PatchReassembler;

impl PatchReassembler {
    /// Reassemble restored patches by overlap-weighted averaging
    ///
    /// Walks the identical grid-origin order as the tiler. Each patch is
    /// clipped to its valid (non-padded) footprint before accumulation, so
    /// zero-padded border pixels never darken the averaged result. At the
    /// default stride = size/2, interior pixels receive up to 2x2
    /// contributions and the averaging is what suppresses tile seams.
    ///
    /// # Errors
    /// - `RestoreError::MissingTile` when the sequence length does not match
    ///   the grid; partial sequences are rejected rather than silently
    ///   under-weighting canvas regions.
    /// - `RestoreError::Processing` when a patch has the wrong dimensions.
    pub fn reassemble(
        patches: &[RgbImage],
        full_size: FullSize,
        config: &TileConfig,
    ) -> Result<RgbImage> {
        config.validate()?;
        let origins = grid_origins(full_size, config.stride);
        if patches.len() != origins.len() {
            return Err(RestoreError::MissingTile {
                expected: origins.len(),
                actual: patches.len(),
            });
        }

        let height = full_size.height as usize;
        let width = full_size.width as usize;
        let mut canvas = Array3::<f32>::zeros((height, width, 3));
        let mut weight = Array2::<f32>::zeros((height, width));

        for (index, (&(x, y), patch)) in origins.iter().zip(patches).enumerate() {
            if patch.dimensions() != (config.size, config.size) {
                return Err(RestoreError::processing(format!(
                    "restored patch {} has dimensions {:?}, expected {}x{}",
                    patch_identifier(index),
                    patch.dimensions(),
                    config.size,
                    config.size
                )));
            }
            let valid_w = config.size.min(full_size.width - x);
            let valid_h = config.size.min(full_size.height - y);
            for dy in 0..valid_h {
                for dx in 0..valid_w {
                    let pixel = patch.get_pixel(dx, dy);
                    let cy = (y + dy) as usize;
                    let cx = (x + dx) as usize;
                    for c in 0..3 {
                        canvas[[cy, cx, c]] += f32::from(pixel[c]);
                    }
                    weight[[cy, cx]] += 1.0;
                }
            }
        }

        // A complete, correctly-sized sequence covers every cell; the guard
        // only protects the division.
        let mut merged = RgbImage::new(full_size.width, full_size.height);
        for (px, py, pixel) in merged.enumerate_pixels_mut() {
            let cy = py as usize;
            let cx = px as usize;
            let w = weight[[cy, cx]].max(1.0);
            for c in 0..3 {
                pixel[c] = (canvas[[cy, cx, c]] / w).round().clamp(0.0, 255.0) as u8;
            }
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TileConfig;
    use image::{Luma, Rgb};

    fn tile_all(
        image: &RgbImage,
        config: &TileConfig,
    ) -> PatchBatch {
        let (w, h) = image.dimensions();
        let mask = GrayImage::new(w, h);
        let edge = GrayImage::new(w, h);
        PatchTiler::tile(image, &mask, &edge, config).unwrap()
    }

    #[test]
    fn test_patch_count_formula() {
        let config = TileConfig::default();
        for (w, h, expected) in [(600, 600, 9), (512, 512, 4), (100, 100, 1), (513, 256, 3)] {
            let image = RgbImage::new(w, h);
            let batch = tile_all(&image, &config);
            assert_eq!(batch.patch_count(), expected, "{w}x{h}");
            assert_eq!(
                PatchTiler::expected_count(FullSize { width: w, height: h }, config.stride),
                expected
            );
        }
    }

    #[test]
    fn test_raster_scan_ordering() {
        // Encode each origin in the red channel so tile i can be traced back
        // to its grid position.
        let config = TileConfig {
            size: 4,
            stride: 2,
        };
        let image = RgbImage::from_fn(6, 6, |x, y| Rgb([(y * 6 + x) as u8, 0, 0]));
        let batch = tile_all(&image, &config);
        let origins = grid_origins(FullSize { width: 6, height: 6 }, config.stride);
        assert_eq!(origins, vec![
            (0, 0), (2, 0), (4, 0),
            (0, 2), (2, 2), (4, 2),
            (0, 4), (2, 4), (4, 4),
        ]);
        for (i, &(x, y)) in origins.iter().enumerate() {
            assert_eq!(batch.images[i].get_pixel(0, 0)[0], (y * 6 + x) as u8);
        }
    }

    #[test]
    fn test_identifiers_sort_in_sequence_order() {
        let image = RgbImage::new(600, 600);
        let batch = tile_all(&image, &TileConfig::default());
        let ids = batch.identifiers();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(ids[0], "patch_000001");
        assert_eq!(ids[8], "patch_000009");
    }

    #[test]
    fn test_identifiers_sort_past_four_digits() {
        // The padding must hold the sequence/sort equivalence for grids
        // larger than 9_999 tiles.
        assert!(patch_identifier(1_999) < patch_identifier(9_999));
        assert!(patch_identifier(9_999) < patch_identifier(10_000));
        assert!(patch_identifier(10_000) < patch_identifier(123_456));
    }

    #[test]
    fn test_boundary_tiles_zero_padded() {
        let config = TileConfig::default();
        let image = RgbImage::from_pixel(600, 600, Rgb([200, 100, 50]));
        let batch = tile_all(&image, &config);
        // Last tile originates at (512, 512): valid region is 88x88.
        let last = batch.images.last().unwrap();
        assert_eq!(last.get_pixel(0, 0), &Rgb([200, 100, 50]));
        assert_eq!(last.get_pixel(87, 87), &Rgb([200, 100, 50]));
        assert_eq!(last.get_pixel(88, 88), &Rgb([0, 0, 0]));
        assert_eq!(last.get_pixel(511, 511), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_channels_emitted_in_lock_step() {
        let config = TileConfig {
            size: 8,
            stride: 4,
        };
        let image = RgbImage::from_pixel(10, 10, Rgb([1, 2, 3]));
        let mut mask = GrayImage::new(10, 10);
        mask.put_pixel(5, 5, Luma([255]));
        let edge = GrayImage::new(10, 10);
        let batch = PatchTiler::tile(&image, &mask, &edge, &config).unwrap();
        assert_eq!(batch.patch_count(), 9);
        assert_eq!(batch.masks.len(), batch.images.len());
        assert_eq!(batch.edges.len(), batch.images.len());
        // The mask pixel at (5,5) appears in tile (origin 4,4) at offset (1,1).
        let idx = 4; // origins: (0,0),(4,0),(8,0),(0,4),(4,4),...
        assert_eq!(batch.masks[idx].get_pixel(1, 1)[0], 255);
    }

    #[test]
    fn test_tile_rejects_mismatched_channels() {
        let image = RgbImage::new(64, 64);
        let mask = GrayImage::new(32, 32);
        let edge = GrayImage::new(64, 64);
        let result = PatchTiler::tile(&image, &mask, &edge, &TileConfig::default());
        assert!(matches!(result, Err(RestoreError::Processing(_))));
    }

    #[test]
    fn test_tile_reassemble_identity_uniform() {
        let config = TileConfig::default();
        let image = RgbImage::from_pixel(600, 600, Rgb([120, 80, 40]));
        let batch = tile_all(&image, &config);
        let merged =
            PatchReassembler::reassemble(&batch.images, batch.full_size, &config).unwrap();
        assert_eq!(merged, image);
    }

    #[test]
    fn test_tile_reassemble_identity_gradient() {
        // Overlap weights at stride = size/2 are powers of two, so averaging
        // untouched tiles is exact for arbitrary content.
        let config = TileConfig {
            size: 64,
            stride: 32,
        };
        let image = RgbImage::from_fn(150, 90, |x, y| {
            Rgb([(x % 251) as u8, (y % 251) as u8, ((x + y) % 251) as u8])
        });
        let batch = tile_all(&image, &config);
        let merged =
            PatchReassembler::reassemble(&batch.images, batch.full_size, &config).unwrap();
        assert_eq!(merged, image);
    }

    #[test]
    fn test_reassemble_rejects_missing_tiles() {
        let config = TileConfig::default();
        let image = RgbImage::new(600, 600);
        let batch = tile_all(&image, &config);
        let mut patches = batch.images.clone();
        patches.pop();
        let result = PatchReassembler::reassemble(&patches, batch.full_size, &config);
        match result {
            Err(RestoreError::MissingTile { expected, actual }) => {
                assert_eq!(expected, 9);
                assert_eq!(actual, 8);
            },
            other => panic!("expected MissingTile, got {other:?}"),
        }
    }

    #[test]
    fn test_reassemble_rejects_wrong_patch_size() {
        let config = TileConfig::default();
        let image = RgbImage::new(300, 300);
        let batch = tile_all(&image, &config);
        let mut patches = batch.images.clone();
        patches[0] = RgbImage::new(100, 100);
        let result = PatchReassembler::reassemble(&patches, batch.full_size, &config);
        assert!(matches!(result, Err(RestoreError::Processing(_))));
    }

    #[test]
    fn test_padded_pixels_never_contribute() {
        // A boundary tile filled with bright values in its padded area must
        // not bleed into the canvas.
        let config = TileConfig::default();
        let image = RgbImage::from_pixel(600, 600, Rgb([10, 10, 10]));
        let batch = tile_all(&image, &config);
        let mut patches = batch.images.clone();
        // Corrupt the padded region of the final tile.
        let last = patches.last_mut().unwrap();
        for y in 88..512 {
            for x in 88..512 {
                last.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let merged =
            PatchReassembler::reassemble(&patches, batch.full_size, &config).unwrap();
        assert_eq!(merged, image);
    }
}
