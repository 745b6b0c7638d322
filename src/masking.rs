//! Adaptive per-region mask synthesis from bounding boxes
//!
//! Each user-drawn box is converted to a binary mask fragment by one of two
//! segmentation paths selected by box area: a global Otsu threshold for large
//! regions where speed dominates, and an iterative color-model segmentation
//! for small regions where accuracy dominates. Fragments are noise-filtered,
//! unioned, and feathered so the restoration model never sees a hard mask
//! edge.

use crate::{
    config::MaskConfig,
    error::Result,
    types::{ClampedBox, RegionBox},
};
use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::{
    contrast::{otsu_level, threshold, ThresholdType},
    distance_transform::Norm,
    filter::gaussian_blur_f32,
    morphology,
    region_labelling::{connected_components, Connectivity},
};
use std::collections::HashMap;
use tracing::debug;

/// Margin around a box from which background color samples are drawn
const BACKGROUND_RING: u32 = 16;

/// Cluster count per color model on the precise path
const MODEL_CLUSTERS: usize = 5;

/// Segmentation algorithm chosen for a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationPath {
    /// Global Otsu threshold over the cropped region
    Fast,
    /// Iterative foreground/background color-model refinement
    Precise,
}

/// Why the precise path declined and the fast path was used instead
///
/// Fallbacks are handled locally: the reason is logged, never surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The box covers the whole image, leaving no background samples
    NoBackgroundSample,
    /// Refinement emptied the foreground set
    EmptyForeground,
    /// Color model collapsed to non-finite cluster centers
    DegenerateModel,
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoBackgroundSample => write!(f, "no background samples around box"),
            Self::EmptyForeground => write!(f, "refinement emptied the foreground"),
            Self::DegenerateModel => write!(f, "color model centers are non-finite"),
        }
    }
}

/// Converts a set of region boxes into one binary restoration mask
pub struct RegionMaskGenerator;

impl RegionMaskGenerator {
    /// Generate the full-image restoration mask for a set of boxes
    ///
    /// Degenerate boxes (clamped width or height < 2) contribute nothing.
    /// Output pixels are strictly 0 or 255.
    ///
    /// # Errors
    /// Currently infallible for valid configs; the `Result` return keeps the
    /// contract uniform with the other pipeline stages.
    pub fn generate(
        image: &RgbImage,
        boxes: &[RegionBox],
        config: &MaskConfig,
    ) -> Result<GrayImage> {
        let (width, height) = image.dimensions();
        let mut union = GrayImage::new(width, height);

        for region in boxes {
            let Some(clamped) = region.clamp(width, height) else {
                debug!(?region, "skipping degenerate region box");
                continue;
            };

            let fragment = match Self::select_path(region, config) {
                SegmentationPath::Fast => {
                    Self::fast_mask(image, clamped, config, config.fast_min_area)
                },
                SegmentationPath::Precise => {
                    match Self::precise_mask(image, clamped, config) {
                        Ok(mask) => mask,
                        Err(reason) => {
                            debug!(%reason, ?region, "precise segmentation fell back to threshold path");
                            // The fallback keeps the precise path's area
                            // filter so the region is cleaned at the same
                            // granularity it was selected for.
                            Self::fast_mask(image, clamped, config, config.precise_min_area)
                        },
                    }
                },
            };

            // Fragment is box-sized; OR it into the union at the box origin.
            for (fx, fy, pixel) in fragment.enumerate_pixels() {
                if pixel[0] > 0 {
                    union.put_pixel(clamped.x + fx, clamped.y + fy, Luma([255]));
                }
            }
        }

        Ok(Self::feather(&union, config))
    }

    /// Pick the segmentation path for a box by its drawn area
    #[must_use]
    pub fn select_path(region: &RegionBox, config: &MaskConfig) -> SegmentationPath {
        if region.area() > u64::from(config.area_threshold) {
            SegmentationPath::Fast
        } else {
            SegmentationPath::Precise
        }
    }

    /// Fast path: grayscale crop, Otsu threshold, polarity correction
    ///
    /// Otsu does not know which side of the threshold is the subject; when
    /// the mean intensity under the foreground label is darker than under
    /// the background label, the result is inverted.
    fn fast_mask(
        image: &RgbImage,
        region: ClampedBox,
        config: &MaskConfig,
        min_area: u32,
    ) -> GrayImage {
        let crop = imageops::crop_imm(image, region.x, region.y, region.width, region.height)
            .to_image();
        let gray = imageops::grayscale(&crop);

        let level = otsu_level(&gray);
        let mut binary = threshold(&gray, level, ThresholdType::Binary);

        if let Some((fg_mean, bg_mean)) = Self::label_means(&gray, &binary) {
            if fg_mean < bg_mean {
                for pixel in binary.pixels_mut() {
                    pixel[0] = 255 - pixel[0];
                }
            }
        }

        Self::component_filter(&binary, min_area, config.keep_small)
    }

    /// Mean gray intensity under the foreground and background labels
    ///
    /// `None` when either side is empty (threshold degenerated to one class),
    /// in which case polarity correction is meaningless.
    fn label_means(gray: &GrayImage, binary: &GrayImage) -> Option<(f64, f64)> {
        let mut fg_sum = 0u64;
        let mut fg_count = 0u64;
        let mut bg_sum = 0u64;
        let mut bg_count = 0u64;
        for (value, label) in gray.pixels().zip(binary.pixels()) {
            if label[0] > 0 {
                fg_sum += u64::from(value[0]);
                fg_count += 1;
            } else {
                bg_sum += u64::from(value[0]);
                bg_count += 1;
            }
        }
        if fg_count == 0 || bg_count == 0 {
            return None;
        }
        Some((fg_sum as f64 / fg_count as f64, bg_sum as f64 / bg_count as f64))
    }

    /// Precise path: iterative foreground/background color-model segmentation
    ///
    /// Seeds the background model from a ring of pixels around the box and
    /// the foreground from the box interior, then alternates model fitting
    /// and pixel reassignment for `refine_iters` rounds. Output is inherently
    /// constrained to the box region. Declines with an explicit reason
    /// instead of failing; the caller then runs the fast path.
    fn precise_mask(
        image: &RgbImage,
        region: ClampedBox,
        config: &MaskConfig,
    ) -> std::result::Result<GrayImage, FallbackReason> {
        let (width, height) = image.dimensions();

        // Background seed samples from a ring outside the box.
        let ring_x0 = region.x.saturating_sub(BACKGROUND_RING);
        let ring_y0 = region.y.saturating_sub(BACKGROUND_RING);
        let ring_x1 = (region.x + region.width + BACKGROUND_RING).min(width);
        let ring_y1 = (region.y + region.height + BACKGROUND_RING).min(height);

        let mut background: Vec<[f32; 3]> = Vec::new();
        for y in ring_y0..ring_y1 {
            for x in ring_x0..ring_x1 {
                let inside_box = x >= region.x
                    && x < region.x + region.width
                    && y >= region.y
                    && y < region.y + region.height;
                if !inside_box {
                    background.push(to_color(image.get_pixel(x, y)));
                }
            }
        }
        if background.is_empty() {
            return Err(FallbackReason::NoBackgroundSample);
        }

        // Box interior pixels, initially all probable foreground.
        let pixel_count = (region.width * region.height) as usize;
        let mut colors: Vec<[f32; 3]> = Vec::with_capacity(pixel_count);
        for y in region.y..region.y + region.height {
            for x in region.x..region.x + region.width {
                colors.push(to_color(image.get_pixel(x, y)));
            }
        }
        let mut is_foreground = vec![true; pixel_count];

        for _ in 0..config.refine_iters {
            let fg_samples: Vec<[f32; 3]> = colors
                .iter()
                .zip(&is_foreground)
                .filter_map(|(c, &fg)| fg.then_some(*c))
                .collect();
            if fg_samples.is_empty() {
                return Err(FallbackReason::EmptyForeground);
            }
            // Background model mixes the outside ring with interior pixels
            // already claimed by the background.
            let mut bg_samples = background.clone();
            bg_samples.extend(
                colors
                    .iter()
                    .zip(&is_foreground)
                    .filter_map(|(c, &fg)| (!fg).then_some(*c)),
            );

            let fg_centers =
                kmeans(&fg_samples, MODEL_CLUSTERS).ok_or(FallbackReason::DegenerateModel)?;
            let bg_centers =
                kmeans(&bg_samples, MODEL_CLUSTERS).ok_or(FallbackReason::DegenerateModel)?;

            // Ties go to the background; the foreground must win outright.
            for (color, label) in colors.iter().zip(is_foreground.iter_mut()) {
                *label = nearest_distance(color, &fg_centers)
                    < nearest_distance(color, &bg_centers);
            }
        }

        if !is_foreground.iter().any(|&fg| fg) {
            return Err(FallbackReason::EmptyForeground);
        }

        let mut mask = GrayImage::from_fn(region.width, region.height, |x, y| {
            let idx = (y * region.width + x) as usize;
            if is_foreground[idx] {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        mask = majority_smooth(&mask);

        Ok(Self::component_filter(
            &mask,
            config.precise_min_area,
            config.keep_small,
        ))
    }

    /// Connected-component area filter
    ///
    /// Labels 8-connected foreground components and discards any whose pixel
    /// count is below `min_area`. The background component never survives.
    /// `keep_small` retains sub-threshold components as well; it defaults to
    /// off everywhere in this crate.
    pub(crate) fn component_filter(mask: &GrayImage, min_area: u32, keep_small: bool) -> GrayImage {
        if keep_small {
            // Every labeled component survives; only normalize to {0,255}.
            return GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
                if mask.get_pixel(x, y)[0] > 0 {
                    Luma([255])
                } else {
                    Luma([0])
                }
            });
        }

        let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
        let mut areas: HashMap<u32, u32> = HashMap::new();
        for label in labels.pixels() {
            if label[0] != 0 {
                *areas.entry(label[0]).or_insert(0) += 1;
            }
        }

        GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
            let label = labels.get_pixel(x, y)[0];
            if label != 0 && areas.get(&label).copied().unwrap_or(0) >= min_area {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    /// Soften the mask union: dilate, blur, re-binarize
    ///
    /// Restores the {0,255} invariant after the blur.
    fn feather(mask: &GrayImage, config: &MaskConfig) -> GrayImage {
        let dilated = if config.dilate_radius > 0 {
            morphology::dilate(mask, Norm::LInf, config.dilate_radius)
        } else {
            mask.clone()
        };
        let blurred = gaussian_blur_f32(&dilated, config.blur_sigma);
        GrayImage::from_fn(blurred.width(), blurred.height(), |x, y| {
            if blurred.get_pixel(x, y)[0] > config.feather_threshold {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }
}

fn to_color(pixel: &image::Rgb<u8>) -> [f32; 3] {
    [
        f32::from(pixel[0]),
        f32::from(pixel[1]),
        f32::from(pixel[2]),
    ]
}

fn squared_distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    dr.mul_add(dr, dg.mul_add(dg, db * db))
}

fn nearest_distance(color: &[f32; 3], centers: &[[f32; 3]]) -> f32 {
    centers
        .iter()
        .map(|c| squared_distance(color, c))
        .fold(f32::INFINITY, f32::min)
}

/// Lloyd's k-means over RGB samples, deterministic initialization
///
/// Returns `None` when any center goes non-finite (degenerate input).
fn kmeans(samples: &[[f32; 3]], k: usize) -> Option<Vec<[f32; 3]>> {
    if samples.is_empty() {
        return None;
    }
    let k = k.min(samples.len());
    // Evenly spaced sample indices as initial centers.
    let mut centers: Vec<[f32; 3]> = (0..k)
        .map(|i| samples[i * samples.len() / k])
        .collect();

    for _ in 0..8 {
        let mut sums = vec![[0f64; 3]; k];
        let mut counts = vec![0u32; k];
        for sample in samples {
            let mut best = 0;
            let mut best_dist = f32::INFINITY;
            for (i, center) in centers.iter().enumerate() {
                let d = squared_distance(sample, center);
                if d < best_dist {
                    best_dist = d;
                    best = i;
                }
            }
            for c in 0..3 {
                sums[best][c] += f64::from(sample[c]);
            }
            counts[best] += 1;
        }
        for i in 0..k {
            if counts[i] > 0 {
                for c in 0..3 {
                    centers[i][c] = (sums[i][c] / f64::from(counts[i])) as f32;
                }
            }
        }
    }

    if centers.iter().flatten().any(|v| !v.is_finite()) {
        return None;
    }
    Some(centers)
}

/// One 3x3 majority-vote pass to smooth ragged label boundaries
fn majority_smooth(mask: &GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let mut fg = 0u32;
        let mut total = 0u32;
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let nx = i64::from(x) + dx;
                let ny = i64::from(y) + dy;
                if nx >= 0 && ny >= 0 && (nx as u32) < width && (ny as u32) < height {
                    total += 1;
                    if mask.get_pixel(nx as u32, ny as u32)[0] > 0 {
                        fg += 1;
                    }
                }
            }
        }
        if fg * 2 > total {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn image_with_bright_square(
        width: u32,
        height: u32,
        sq: (u32, u32, u32, u32),
    ) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let inside =
                x >= sq.0 && x < sq.0 + sq.2 && y >= sq.1 && y < sq.1 + sq.3;
            if inside {
                Rgb([230, 230, 230])
            } else {
                Rgb([20, 20, 20])
            }
        })
    }

    fn assert_binary(mask: &GrayImage) {
        assert!(
            mask.pixels().all(|p| p[0] == 0 || p[0] == 255),
            "mask contains intermediate gray values"
        );
    }

    #[test]
    fn test_path_selection_by_area() {
        let config = MaskConfig::default();
        // 250x250 = 62_500 > 22_500
        let large = RegionBox::new(50, 50, 300, 300);
        assert_eq!(
            RegionMaskGenerator::select_path(&large, &config),
            SegmentationPath::Fast
        );
        // 150x150 = 22_500, at the threshold -> precise
        let at_threshold = RegionBox::new(0, 0, 150, 150);
        assert_eq!(
            RegionMaskGenerator::select_path(&at_threshold, &config),
            SegmentationPath::Precise
        );
        let small = RegionBox::new(10, 10, 60, 60);
        assert_eq!(
            RegionMaskGenerator::select_path(&small, &config),
            SegmentationPath::Precise
        );
    }

    #[test]
    fn test_fast_path_marks_bright_subject() {
        let image = image_with_bright_square(400, 400, (100, 100, 120, 120));
        let boxes = [RegionBox::new(60, 60, 280, 280)]; // 220x220 > threshold
        let mask =
            RegionMaskGenerator::generate(&image, &boxes, &MaskConfig::default()).unwrap();
        assert_binary(&mask);
        // Subject center is marked, far corner is not.
        assert_eq!(mask.get_pixel(160, 160)[0], 255);
        assert_eq!(mask.get_pixel(390, 390)[0], 0);
    }

    #[test]
    fn test_polarity_keeps_brighter_side() {
        // Dark subject on a bright background inside the box: polarity
        // correction guarantees the foreground label lands on the brighter
        // side, so the bright surround is marked and the dark center is not.
        let image = RgbImage::from_fn(400, 400, |x, y| {
            let inside = x >= 150 && x < 250 && y >= 150 && y < 250;
            if inside {
                Rgb([15, 15, 15])
            } else {
                Rgb([240, 240, 240])
            }
        });
        let boxes = [RegionBox::new(100, 100, 300, 300)];
        let mask =
            RegionMaskGenerator::generate(&image, &boxes, &MaskConfig::default()).unwrap();
        assert_eq!(mask.get_pixel(120, 120)[0], 255);
        assert_eq!(mask.get_pixel(200, 200)[0], 0);
    }

    #[test]
    fn test_precise_path_segments_small_region() {
        let image = image_with_bright_square(300, 300, (120, 120, 40, 40));
        let boxes = [RegionBox::new(110, 110, 180, 180)]; // 70x70, precise path
        let mask =
            RegionMaskGenerator::generate(&image, &boxes, &MaskConfig::default()).unwrap();
        assert_binary(&mask);
        assert_eq!(mask.get_pixel(140, 140)[0], 255);
        // Output constrained to the box region plus the feathering dilation.
        assert_eq!(mask.get_pixel(20, 20)[0], 0);
    }

    #[test]
    fn test_precise_fallback_without_background_ring() {
        // Box covering the whole image leaves no background samples; the
        // generator must fall back to the fast path rather than fail.
        let image = image_with_bright_square(120, 120, (30, 30, 60, 60));
        let boxes = [RegionBox::new(0, 0, 120, 120)];
        let config = MaskConfig {
            area_threshold: 100_000, // force precise selection
            ..MaskConfig::default()
        };
        let mask = RegionMaskGenerator::generate(&image, &boxes, &config).unwrap();
        assert_binary(&mask);
        assert_eq!(mask.get_pixel(60, 60)[0], 255);
    }

    #[test]
    fn test_fallback_filters_at_precise_min_area() {
        // A whole-image box has no background ring, so the precise path
        // declines and the threshold path runs in its place. The fallback
        // must keep the precise path's area filter: a 6 px component sits
        // between precise_min_area (5) and fast_min_area (10) and has to
        // survive.
        let image = RgbImage::from_fn(60, 60, |x, y| {
            let inside = x >= 30 && x < 32 && y >= 30 && y < 33;
            if inside {
                Rgb([240, 240, 240])
            } else {
                Rgb([20, 20, 20])
            }
        });
        let boxes = [RegionBox::new(0, 0, 60, 60)];
        let config = MaskConfig {
            area_threshold: 100_000, // force precise selection
            ..MaskConfig::default()
        };
        let mask = RegionMaskGenerator::generate(&image, &boxes, &config).unwrap();
        assert_eq!(mask.get_pixel(31, 31)[0], 255);
    }

    #[test]
    fn test_degenerate_and_out_of_bounds_boxes() {
        let image = image_with_bright_square(200, 200, (50, 50, 80, 80));
        let boxes = [
            RegionBox::new(500, 500, 600, 600), // fully outside
            RegionBox::new(10, 10, 11, 180),    // 1 px wide after clamp
        ];
        let mask =
            RegionMaskGenerator::generate(&image, &boxes, &MaskConfig::default()).unwrap();
        assert!(mask.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_component_filter_drops_small_islands() {
        let mut mask = GrayImage::new(64, 64);
        // 5x5 = 25 px component
        for y in 10..15 {
            for x in 10..15 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        // 2x2 = 4 px component
        for y in 40..42 {
            for x in 40..42 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let filtered = RegionMaskGenerator::component_filter(&mask, 10, false);
        assert_eq!(filtered.get_pixel(12, 12)[0], 255);
        assert_eq!(filtered.get_pixel(40, 40)[0], 0);

        // Exactly at min_area is retained.
        let at_threshold = RegionMaskGenerator::component_filter(&mask, 4, false);
        assert_eq!(at_threshold.get_pixel(40, 40)[0], 255);

        // keep_small retains everything.
        let kept = RegionMaskGenerator::component_filter(&mask, 10, true);
        assert_eq!(kept.get_pixel(40, 40)[0], 255);
    }

    #[test]
    fn test_feathering_expands_and_stays_binary() {
        let image = image_with_bright_square(300, 300, (100, 100, 80, 80));
        let boxes = [RegionBox::new(40, 40, 260, 260)];
        let mask =
            RegionMaskGenerator::generate(&image, &boxes, &MaskConfig::default()).unwrap();
        assert_binary(&mask);
        // Dilation pushes the mask slightly past the subject boundary.
        assert_eq!(mask.get_pixel(98, 140)[0], 255);
    }

    #[test]
    fn test_kmeans_degenerate_input() {
        assert!(kmeans(&[], 5).is_none());
        let uniform = vec![[128.0, 128.0, 128.0]; 20];
        let centers = kmeans(&uniform, 5).unwrap();
        assert!(centers.iter().flatten().all(|v| v.is_finite()));
    }
}
