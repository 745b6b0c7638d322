//! Configuration types for the restoration pipeline

use crate::error::{RestoreError, Result};
use serde::{Deserialize, Serialize};

/// Tiling lattice parameters shared by the tiler and the reassembler
///
/// `reassemble` is only defined for the same `TileConfig` the patch batch was
/// produced with; the processor threads one value through both stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileConfig {
    /// Side length of each square patch in pixels
    pub size: u32,
    /// Grid spacing between patch origins; stride < size yields overlap
    pub stride: u32,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            size: 512,
            stride: 256,
        }
    }
}

impl TileConfig {
    /// Validate the lattice parameters
    ///
    /// # Errors
    /// Returns `RestoreError::InvalidConfig` when either dimension is zero or
    /// the stride exceeds the patch size (which would leave uncovered gaps).
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 || self.stride == 0 {
            return Err(RestoreError::invalid_config(
                "tile size and stride must be non-zero",
            ));
        }
        if self.stride > self.size {
            return Err(RestoreError::invalid_config(format!(
                "stride {} exceeds tile size {}; grid would leave uncovered pixels",
                self.stride, self.size
            )));
        }
        Ok(())
    }
}

/// Parameters for adaptive mask synthesis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskConfig {
    /// Box area above which the fast threshold path is selected (150x150)
    pub area_threshold: u32,
    /// Minimum connected-component area kept on the fast path
    pub fast_min_area: u32,
    /// Minimum connected-component area kept on the precise path
    pub precise_min_area: u32,
    /// Retain components below `min_area` as well. Off by default: small
    /// islands are pruned.
    pub keep_small: bool,
    /// Refinement iterations for the precise segmentation path
    pub refine_iters: u32,
    /// Structuring-element radius for feathering dilation (3 -> 7x7 kernel)
    pub dilate_radius: u8,
    /// Gaussian sigma for feathering blur (2.0 matches an 11x11 kernel)
    pub blur_sigma: f32,
    /// Re-binarization cutoff applied after the feathering blur
    pub feather_threshold: u8,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            area_threshold: 22_500,
            fast_min_area: 10,
            precise_min_area: 5,
            keep_small: false,
            refine_iters: 2,
            dilate_radius: 3,
            blur_sigma: 2.0,
            feather_threshold: 10,
        }
    }
}

impl MaskConfig {
    /// Validate mask synthesis parameters
    ///
    /// # Errors
    /// Returns `RestoreError::InvalidConfig` for non-positive blur sigma or
    /// zero refinement iterations.
    pub fn validate(&self) -> Result<()> {
        if self.blur_sigma <= 0.0 {
            return Err(RestoreError::invalid_config(
                "feathering blur sigma must be positive",
            ));
        }
        if self.refine_iters == 0 {
            return Err(RestoreError::invalid_config(
                "precise path needs at least one refinement iteration",
            ));
        }
        Ok(())
    }
}

/// Canny hysteresis thresholds for edge-map extraction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// Low hysteresis threshold
    pub low: f32,
    /// High hysteresis threshold
    pub high: f32,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            low: 100.0,
            high: 200.0,
        }
    }
}

impl EdgeConfig {
    /// Validate the threshold pair
    ///
    /// # Errors
    /// Returns `RestoreError::InvalidConfig` when `low` is not positive or
    /// exceeds `high`.
    pub fn validate(&self) -> Result<()> {
        if self.low <= 0.0 || self.low > self.high {
            return Err(RestoreError::invalid_config(format!(
                "Canny thresholds must satisfy 0 < low <= high, got {}/{}",
                self.low, self.high
            )));
        }
        Ok(())
    }
}

/// Aggregate configuration for the restoration processor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Tiling lattice parameters
    pub tile: TileConfig,
    /// Mask synthesis parameters
    pub mask: MaskConfig,
    /// Edge extraction parameters
    pub edge: EdgeConfig,
}

impl ProcessorConfig {
    /// Create a new processor configuration builder
    #[must_use]
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::new()
    }

    /// Validate all nested configuration sections
    ///
    /// # Errors
    /// Returns `RestoreError::InvalidConfig` from the first failing section.
    pub fn validate(&self) -> Result<()> {
        self.tile.validate()?;
        self.mask.validate()?;
        self.edge.validate()?;
        Ok(())
    }
}

/// Builder for `ProcessorConfig`
#[derive(Debug, Default)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tile(mut self, tile: TileConfig) -> Self {
        self.config.tile = tile;
        self
    }

    #[must_use]
    pub fn mask(mut self, mask: MaskConfig) -> Self {
        self.config.mask = mask;
        self
    }

    #[must_use]
    pub fn edge(mut self, edge: EdgeConfig) -> Self {
        self.config.edge = edge;
        self
    }

    /// Build and validate the processor configuration
    ///
    /// # Errors
    /// Returns `RestoreError::InvalidConfig` when any section fails validation.
    pub fn build(self) -> Result<ProcessorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ProcessorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tile.size, 512);
        assert_eq!(config.tile.stride, 256);
        assert_eq!(config.mask.area_threshold, 22_500);
        assert!(!config.mask.keep_small);
    }

    #[test]
    fn test_tile_config_rejects_gaps() {
        let tile = TileConfig {
            size: 256,
            stride: 512,
        };
        assert!(tile.validate().is_err());

        let tile = TileConfig { size: 0, stride: 0 };
        assert!(tile.validate().is_err());
    }

    #[test]
    fn test_edge_config_threshold_ordering() {
        let edge = EdgeConfig {
            low: 200.0,
            high: 100.0,
        };
        assert!(edge.validate().is_err());

        let edge = EdgeConfig {
            low: 100.0,
            high: 200.0,
        };
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn test_builder_validates() {
        let result = ProcessorConfig::builder()
            .tile(TileConfig {
                size: 128,
                stride: 256,
            })
            .build();
        assert!(result.is_err());

        let config = ProcessorConfig::builder()
            .tile(TileConfig {
                size: 512,
                stride: 512,
            })
            .build()
            .unwrap();
        assert_eq!(config.tile.stride, 512);
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = ProcessorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ProcessorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.tile, config.tile);
        assert_eq!(parsed.edge, config.edge);
    }
}
