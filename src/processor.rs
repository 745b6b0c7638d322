//! Per-request restoration orchestration
//!
//! The processor sequences mask synthesis, edge extraction, tiling, the
//! external model call and reassembly. Every transient buffer (mask, edge
//! map, patch sequences, accumulator canvases) is a request-scoped local:
//! nothing is shared between invocations, and everything is released on
//! every exit path, success or failure, when the request scope unwinds.

use crate::{
    config::ProcessorConfig,
    edge::EdgeMapExtractor,
    error::{Result, RestoreError},
    inference::InferenceBackend,
    masking::RegionMaskGenerator,
    services::{NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker},
    tiling::{PatchReassembler, PatchTiler},
    types::{ProcessingTimings, RegionBox, RestorationResult},
};
use image::RgbImage;
use instant::Instant;
use log::info;
use tracing::debug;

/// Restoration pipeline orchestrator
pub struct RestorationProcessor {
    config: ProcessorConfig,
    backend: Box<dyn InferenceBackend>,
}

impl RestorationProcessor {
    /// Create a processor over a validated configuration and a backend
    ///
    /// # Errors
    /// Returns `RestoreError::InvalidConfig` when the configuration fails
    /// validation.
    pub fn new(config: ProcessorConfig, backend: Box<dyn InferenceBackend>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, backend })
    }

    /// The active configuration
    #[must_use]
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Process a request without progress reporting
    ///
    /// # Errors
    /// See [`RestorationProcessor::process_with_reporter`].
    pub fn process(
        &mut self,
        image: &RgbImage,
        boxes: &[RegionBox],
    ) -> Result<RestorationResult> {
        self.process_with_reporter(image, boxes, Box::new(NoOpProgressReporter))
    }

    /// Process a request, reporting milestones to the given reporter
    ///
    /// A fresh `ProgressTracker` is created for this request and dropped with
    /// it; concurrent requests with separate processors never share progress
    /// state. On failure the error is reported to the tracker before being
    /// propagated.
    ///
    /// # Errors
    /// - `RestoreError::Inference` when the backend fails or returns
    ///   malformed tiles
    /// - `RestoreError::MissingTile` when the restored sequence is short
    /// - `RestoreError::Processing` for internal stage failures
    pub fn process_with_reporter(
        &mut self,
        image: &RgbImage,
        boxes: &[RegionBox],
        reporter: Box<dyn ProgressReporter>,
    ) -> Result<RestorationResult> {
        let mut tracker = ProgressTracker::new(reporter);
        let result = self.run_pipeline(image, boxes, &mut tracker);
        match &result {
            Ok(output) => {
                tracker.report_stage(ProcessingStage::Completed);
                info!(
                    "restored {} patches in {}ms",
                    output.patch_count, output.timings.total_ms
                );
            },
            Err(error) => tracker.report_error(&error.to_string()),
        }
        result
    }

    fn run_pipeline(
        &mut self,
        image: &RgbImage,
        boxes: &[RegionBox],
        tracker: &mut ProgressTracker,
    ) -> Result<RestorationResult> {
        let request_start = Instant::now();
        let mut timings = ProcessingTimings::default();

        let stage_start = Instant::now();
        let mask = RegionMaskGenerator::generate(image, boxes, &self.config.mask)?;
        timings.mask_ms = stage_start.elapsed().as_millis() as u64;
        tracker.report_stage(ProcessingStage::MaskGeneration);

        let stage_start = Instant::now();
        let edge = EdgeMapExtractor::extract(image, &self.config.edge);
        timings.edge_ms = stage_start.elapsed().as_millis() as u64;
        tracker.report_stage(ProcessingStage::EdgeExtraction);

        let stage_start = Instant::now();
        let batch = PatchTiler::tile(image, &mask, &edge, &self.config.tile)?;
        timings.tiling_ms = stage_start.elapsed().as_millis() as u64;
        tracker.report_stage_with_message(
            ProcessingStage::Tiling,
            format!("Split image into {} patches", batch.patch_count()),
        );

        tracker.report_stage(ProcessingStage::InferenceHandoff);
        debug!(backend = self.backend.name(), "invoking restoration backend");
        let stage_start = Instant::now();
        let restored = self.backend.restore(&batch)?;
        timings.inference_ms = stage_start.elapsed().as_millis() as u64;
        tracker.report_stage(ProcessingStage::Inference);

        // Tile dimensions are the backend's contract; a mismatch is
        // malformed model output. Count mismatches surface from reassembly
        // as MissingTile.
        for (index, patch) in restored.iter().enumerate() {
            if patch.dimensions() != (self.config.tile.size, self.config.tile.size) {
                return Err(RestoreError::inference(format!(
                    "backend '{}' returned patch {} with dimensions {:?}, expected {}x{}",
                    self.backend.name(),
                    index,
                    patch.dimensions(),
                    self.config.tile.size,
                    self.config.tile.size
                )));
            }
        }

        let stage_start = Instant::now();
        let merged =
            PatchReassembler::reassemble(&restored, batch.full_size, &self.config.tile)?;
        timings.reassembly_ms = stage_start.elapsed().as_millis() as u64;
        tracker.report_stage(ProcessingStage::Reassembly);

        timings.total_ms = request_start.elapsed().as_millis() as u64;
        Ok(RestorationResult {
            image: merged,
            patch_count: batch.patch_count(),
            timings,
        })
    }
}
