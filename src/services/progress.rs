//! Progress reporting service
//!
//! This module separates progress reporting concerns from the pipeline,
//! allowing different frontends to implement their own progress handling.

use std::time::Instant;

/// Stages of the per-image pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Writing the active layer to a scratch file
    LayerExport,
    /// Waiting for rembg
    ToolInvocation,
    /// Loading rembg's output as a layer
    LayerImport,
    /// Mask, square canvas and flatten
    PostProcessing,
    /// Image finished
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::LayerExport => "Exporting active layer",
            ProcessingStage::ToolInvocation => "Running rembg",
            ProcessingStage::LayerImport => "Importing result layer",
            ProcessingStage::PostProcessing => "Applying layer operations",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::LayerExport => 5,
            ProcessingStage::ToolInvocation => 10,
            ProcessingStage::LayerImport => 90,
            ProcessingStage::PostProcessing => 95,
            ProcessingStage::Completed => 100,
        }
    }
}

/// Progress update for one image of a batch
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Image being processed
    pub image_name: String,
    /// Zero-based position in the batch
    pub index: usize,
    /// Number of images in the batch
    pub total: usize,
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Elapsed time since this image started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(
        image_name: &str,
        index: usize,
        total: usize,
        stage: ProcessingStage,
        start_time: Instant,
    ) -> Self {
        Self {
            image_name: image_name.to_string(),
            index,
            total,
            stage,
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        }
    }
}

/// Trait for reporting progress during background removal
pub trait ProgressReporter {
    /// Report a stage change for the current image
    fn report_progress(&self, update: ProgressUpdate);

    /// Report that an image left the pipeline
    fn report_item_finished(&self, image_name: &str, succeeded: bool) {
        let _ = (image_name, succeeded);
    }

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Console progress reporter that logs progress to the console
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}/{}] [{}%] {}: {} ({}ms elapsed)",
                update.index + 1,
                update.total,
                update.stage.progress_percentage(),
                update.image_name,
                update.stage.description(),
                update.elapsed_ms
            );
        } else if update.stage == ProcessingStage::ToolInvocation {
            log::info!(
                "[{}/{}] {}: {}",
                update.index + 1,
                update.total,
                update.image_name,
                update.stage.description()
            );
        }
    }

    fn report_item_finished(&self, image_name: &str, succeeded: bool) {
        if succeeded {
            log::info!("✅ {image_name} done");
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("❌ Error during {}: {}", stage.description(), error);
    }
}
