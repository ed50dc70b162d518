//! Terminal progress bar for batch runs

use crate::services::{ConsoleProgressReporter, ProcessingStage, ProgressReporter, ProgressUpdate};
use indicatif::{ProgressBar, ProgressStyle};

/// Progress reporter drawing one bar tick per image
pub(crate) struct BarProgressReporter {
    bar: ProgressBar,
    console: ConsoleProgressReporter,
}

impl BarProgressReporter {
    pub(crate) fn new(bar: ProgressBar, verbose: bool) -> Self {
        Self {
            bar,
            console: ConsoleProgressReporter::new(verbose),
        }
    }
}

impl ProgressReporter for BarProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        // The batch size is only known once the options are chosen
        let total = update.total as u64;
        if self.bar.length() != Some(total) {
            self.bar.set_length(total);
        }
        self.bar.set_message(format!(
            "{}: {}",
            update.image_name,
            update.stage.description()
        ));
        if self.bar.is_hidden() {
            self.console.report_progress(update);
        }
    }

    fn report_item_finished(&self, image_name: &str, succeeded: bool) {
        self.bar.inc(1);
        if self.bar.is_hidden() {
            self.console.report_item_finished(image_name, succeeded);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.bar
            .suspend(|| self.console.report_error(stage, error));
    }
}

/// Bar for `count` images; hidden for a single image
pub(crate) fn batch_progress_bar(count: usize) -> ProgressBar {
    if count <= 1 {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(count as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar
}
