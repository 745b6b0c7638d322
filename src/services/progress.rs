//! Progress reporting service
//!
//! Progress reporting is separated from pipeline logic so different
//! frontends can implement their own handling. A `ProgressTracker` is
//! created per request and dropped with it: there is no process-wide
//! progress state, so concurrent requests never observe each other's
//! milestones.

use instant::Instant;

/// Milestones of a restoration request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Synthesizing the restoration mask from region boxes
    MaskGeneration,
    /// Extracting the structural edge map
    EdgeExtraction,
    /// Splitting the aligned rasters into patches
    Tiling,
    /// Handing the ordered patch sequences to the model
    InferenceHandoff,
    /// Waiting on the external model
    Inference,
    /// Recombining restored patches into the full image
    Reassembly,
    /// Request finished
    Completed,
}

impl ProcessingStage {
    /// Human-readable description of the stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::MaskGeneration => "Generating restoration mask",
            Self::EdgeExtraction => "Extracting edge map",
            Self::Tiling => "Splitting image into patches",
            Self::InferenceHandoff => "Handing patches to the model",
            Self::Inference => "Running model inference",
            Self::Reassembly => "Reassembling restored patches",
            Self::Completed => "Restoration completed",
        }
    }

    /// Coarse progress percentage at this milestone
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            Self::MaskGeneration => 20,
            Self::EdgeExtraction => 25,
            Self::Tiling => 40,
            Self::InferenceHandoff => 60,
            Self::Inference => 85,
            Self::Reassembly => 95,
            Self::Completed => 100,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable status string
    pub message: String,
    /// Elapsed time since the request started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a progress update for a stage
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            message: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }

    /// Create a progress update with a custom status string
    #[must_use]
    pub fn with_message(stage: ProcessingStage, message: String, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
            message,
        }
    }
}

/// Trait for reporting progress during a restoration request
pub trait ProgressReporter: Send + Sync {
    /// Report a milestone update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// No-op progress reporter that discards all updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Console progress reporter that logs milestones
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.message,
                update.elapsed_ms
            );
        } else {
            log::info!("[{}%] {}", update.progress, update.message);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("Error during {}: {}", stage.description(), error);
    }
}

/// Per-request progress tracker owning the reporter and the start time
pub struct ProgressTracker {
    reporter: Box<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl ProgressTracker {
    /// Create a tracker with the given reporter
    #[must_use]
    pub fn new(reporter: Box<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    /// Tracker that discards updates (tests, disabled progress)
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Box::new(NoOpProgressReporter))
    }

    /// Tracker that logs to the console
    #[must_use]
    pub fn console(verbose: bool) -> Self {
        Self::new(Box::new(ConsoleProgressReporter::new(verbose)))
    }

    /// Report a milestone
    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        let update = ProgressUpdate::new(stage, self.start_time);
        self.reporter.report_progress(update);
    }

    /// Report a milestone with a custom status string
    pub fn report_stage_with_message(&mut self, stage: ProcessingStage, message: String) {
        self.current_stage = Some(stage);
        let update = ProgressUpdate::with_message(stage, message, self.start_time);
        self.reporter.report_progress(update);
    }

    /// Report an error at the current stage
    pub fn report_error(&self, error: &str) {
        let stage = self.current_stage.unwrap_or(ProcessingStage::MaskGeneration);
        self.reporter.report_error(stage, error);
    }

    /// Elapsed time since the request started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// The most recently reported stage
    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }
}
