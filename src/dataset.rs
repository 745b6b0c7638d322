//! Offline training-dataset generation
//!
//! Builds a patch dataset from a directory of source images: full-size
//! patches are cut on the tile grid, paired with synthetic stroke masks and
//! recomputed edge maps, shuffled, and written into train/val/test splits.
//! Only positions where a complete tile fits are used; boundary remainders
//! are skipped rather than padded, since padded zeros would teach the model
//! false content.

use crate::{
    config::{EdgeConfig, TileConfig},
    edge::EdgeMapExtractor,
    error::{Result, RestoreError},
    services::ImageIOService,
};
use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use imageproc::filter::gaussian_blur_f32;
use log::{debug, info};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Dataset split names, in output-directory order
const SPLITS: [&str; 3] = ["train", "val", "test"];

/// Channel subdirectories written under each split
const CHANNELS: [&str; 3] = ["images", "masks", "edges"];

/// Configuration for offline dataset generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Tile geometry used to cut patches
    pub tile: TileConfig,
    /// Edge extraction thresholds for the edge channel
    pub edge: EdgeConfig,
    /// Fraction of patches assigned to the training split
    pub train_ratio: f32,
    /// Fraction of patches assigned to the validation split
    pub val_ratio: f32,
    /// Extra augmented copies written per training patch
    pub augment_times: usize,
    /// RNG seed; `None` draws from entropy
    pub seed: Option<u64>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            tile: TileConfig::default(),
            edge: EdgeConfig::default(),
            train_ratio: 0.7,
            val_ratio: 0.2,
            augment_times: 0,
            seed: None,
        }
    }
}

impl DatasetConfig {
    /// Validate ratio and tile settings
    ///
    /// # Errors
    /// Returns `RestoreError::InvalidConfig` when ratios are out of range or
    /// the tile geometry is invalid.
    pub fn validate(&self) -> Result<()> {
        self.tile.validate()?;
        self.edge.validate()?;
        if self.train_ratio <= 0.0 || self.val_ratio < 0.0 {
            return Err(RestoreError::invalid_config(
                "split ratios must be positive",
            ));
        }
        if self.train_ratio + self.val_ratio >= 1.0 {
            return Err(RestoreError::invalid_config(
                "train + val ratios must leave room for the test split",
            ));
        }
        Ok(())
    }
}

/// Counts of patches written per split
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatasetSummary {
    /// Patches in the training split (augmented copies included)
    pub train: usize,
    /// Patches in the validation split
    pub val: usize,
    /// Patches in the test split
    pub test: usize,
    /// Source images that were skipped as smaller than one tile
    pub skipped_images: usize,
}

impl DatasetSummary {
    /// Total patches written across all splits
    #[must_use]
    pub fn total(&self) -> usize {
        self.train + self.val + self.test
    }
}

/// Offline dataset generator
pub struct DatasetGenerator {
    config: DatasetConfig,
    rng: StdRng,
}

impl DatasetGenerator {
    /// Create a generator over a validated configuration
    ///
    /// # Errors
    /// Returns `RestoreError::InvalidConfig` when the configuration fails
    /// validation.
    pub fn new(config: DatasetConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self { config, rng })
    }

    /// Generate a dataset from every image under `input_dir` into
    /// `output_dir`
    ///
    /// # Errors
    /// Returns `RestoreError::Io` on filesystem failures and
    /// `RestoreError::Image` on decode failures.
    pub fn generate<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        input_dir: P,
        output_dir: Q,
    ) -> Result<DatasetSummary> {
        let sources = collect_sources(input_dir.as_ref())?;
        if sources.is_empty() {
            return Err(RestoreError::processing(format!(
                "no source images found under {}",
                input_dir.as_ref().display()
            )));
        }

        let output_dir = output_dir.as_ref();
        for split in SPLITS {
            for channel in CHANNELS {
                fs::create_dir_all(output_dir.join(split).join(channel))?;
            }
        }

        let mut summary = DatasetSummary::default();
        let mut patches = Vec::new();
        for path in &sources {
            let image = ImageIOService::load(path)?;
            let cut = cut_full_patches(&image, &self.config.tile);
            if cut.is_empty() {
                debug!("skipping {}: smaller than one tile", path.display());
                summary.skipped_images += 1;
            }
            patches.extend(cut);
        }
        info!(
            "cut {} patches from {} source images",
            patches.len(),
            sources.len()
        );

        patches.shuffle(&mut self.rng);
        let train_end =
            ((patches.len() as f32) * self.config.train_ratio).round() as usize;
        let val_end = train_end
            + ((patches.len() as f32) * self.config.val_ratio).round() as usize;
        let val_end = val_end.min(patches.len());

        let mut counters = [0usize; 3];
        for (index, patch) in patches.iter().enumerate() {
            let split = if index < train_end {
                0
            } else if index < val_end {
                1
            } else {
                2
            };
            // One stroke mask per base patch; augmented copies recompute the
            // edge channel from the transformed pixels but carry this mask
            // unchanged. The test split is never augmented.
            let mask = self.stroke_mask(patch.width(), patch.height());
            self.write_sample(output_dir, split, &mut counters, patch, &mask)?;
            if split < 2 {
                for _ in 0..self.config.augment_times {
                    let augmented = self.augment(patch);
                    self.write_sample(output_dir, split, &mut counters, &augmented, &mask)?;
                }
            }
        }

        summary.train = counters[0];
        summary.val = counters[1];
        summary.test = counters[2];
        Ok(summary)
    }

    fn write_sample(
        &self,
        output_dir: &Path,
        split: usize,
        counters: &mut [usize; 3],
        patch: &RgbImage,
        mask: &GrayImage,
    ) -> Result<()> {
        counters[split] += 1;
        let name = format!("{}_{:06}.png", SPLITS[split], counters[split]);
        let split_dir = output_dir.join(SPLITS[split]);

        let edge = EdgeMapExtractor::extract(patch, &self.config.edge);

        patch.save_with_format(
            split_dir.join("images").join(&name),
            image::ImageFormat::Png,
        )?;
        ImageIOService::save_gray(mask, split_dir.join("masks").join(&name))?;
        ImageIOService::save_gray(&edge, split_dir.join("edges").join(&name))?;
        Ok(())
    }

    /// Synthesize an irregular damage mask from random brush strokes
    ///
    /// Each stroke is a random walk stamped with filled discs, then softened
    /// with a small blur and re-binarized so stroke borders stay irregular.
    fn stroke_mask(&mut self, width: u32, height: u32) -> GrayImage {
        let mut mask = GrayImage::new(width, height);
        let strokes = self.rng.gen_range(1..=4);
        for _ in 0..strokes {
            let mut x = self.rng.gen_range(0..width) as f32;
            let mut y = self.rng.gen_range(0..height) as f32;
            let radius = self.rng.gen_range(4..=12);
            let steps = self.rng.gen_range(4..=12);
            for _ in 0..steps {
                let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
                let length = self.rng.gen_range(8.0..40.0_f32);
                let nx = (x + angle.cos() * length).clamp(0.0, (width - 1) as f32);
                let ny = (y + angle.sin() * length).clamp(0.0, (height - 1) as f32);
                stamp_segment(&mut mask, (x, y), (nx, ny), radius);
                x = nx;
                y = ny;
            }
        }
        let blurred = gaussian_blur_f32(&mask, 1.5);
        GrayImage::from_fn(width, height, |px, py| {
            if blurred.get_pixel(px, py)[0] > 127 {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    /// Apply one randomly chosen photometric or geometric transform
    fn augment(&mut self, patch: &RgbImage) -> RgbImage {
        match self.rng.gen_range(0..6) {
            0 => imageops::rotate90(patch),
            1 => imageops::flip_horizontal(patch),
            2 => {
                let delta = self.rng.gen_range(-30..=30);
                imageops::brighten(patch, delta)
            },
            3 => {
                let contrast = self.rng.gen_range(-20.0..=20.0_f32);
                imageops::contrast(patch, contrast)
            },
            4 => {
                let sigma = self.rng.gen_range(0.5..=1.5_f32);
                imageops::blur(patch, sigma)
            },
            _ => {
                let mut noisy = patch.clone();
                for pixel in noisy.pixels_mut() {
                    for channel in &mut pixel.0 {
                        let noise: i16 = self.rng.gen_range(-12..=12);
                        *channel = (i16::from(*channel) + noise).clamp(0, 255) as u8;
                    }
                }
                noisy
            },
        }
    }
}

/// Cut every complete tile from the grid; remainders are skipped
fn cut_full_patches(image: &RgbImage, tile: &TileConfig) -> Vec<RgbImage> {
    let (width, height) = image.dimensions();
    if width < tile.size || height < tile.size {
        return Vec::new();
    }
    let mut patches = Vec::new();
    let mut y = 0;
    while y + tile.size <= height {
        let mut x = 0;
        while x + tile.size <= width {
            patches.push(
                imageops::crop_imm(image, x, y, tile.size, tile.size).to_image(),
            );
            x += tile.stride;
        }
        y += tile.stride;
    }
    patches
}

/// Stamp filled discs along a stroke segment
fn stamp_segment(mask: &mut GrayImage, from: (f32, f32), to: (f32, f32), radius: i32) {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let steps = dx.hypot(dy).ceil().max(1.0) as i32;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        let cx = (from.0 + dx * t).round() as i32;
        let cy = (from.1 + dy * t).round() as i32;
        draw_filled_circle_mut(mask, (cx, cy), radius, Luma([255]));
    }
}

/// List decodable source images directly under a directory, sorted by name
fn collect_sources(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_ascii_lowercase().as_str(),
                    "png" | "jpg" | "jpeg" | "tif" | "tiff"
                )
            });
        if supported {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
