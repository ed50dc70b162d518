//! Per-image background removal pipeline
//!
//! [`BackgroundRemovalProcessor`] runs the whole sequence for one image:
//! export the active layer, hand it to a [`BackgroundRemover`], import the
//! cut-out and apply the post-processing the parameters ask for. All pixel
//! work is delegated to the [`Host`].

use crate::{
    config::PluginParams,
    error::{RemovalError, Result},
    host::{Host, ImageId, LayerId, LayerPosition},
    invoker::{BackgroundRemover, RemovalRequest},
    services::{CleanupPolicy, ProcessingStage, ProgressReporter, ProgressUpdate, ScratchFiles},
    tracing_config::spans,
};
use image::Rgba;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Name of the fill layer put under the cut-out
pub const BACKGROUND_LAYER_NAME: &str = "Background";

const BACKGROUND_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// What became of the imported cut-out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerMode {
    /// Its alpha became a mask on the original layer
    Mask,
    /// It stayed as its own layer above the hidden original
    SeparateLayer,
}

/// Result of processing one image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageOutcome {
    pub layer_mode: LayerMode,
    pub flattened: bool,
    /// Side length when the canvas was made square
    pub squared_to: Option<u32>,
}

/// Position of an image within a batch, for progress reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPosition {
    pub index: usize,
    pub total: usize,
}

impl BatchPosition {
    #[must_use]
    pub fn single() -> Self {
        Self { index: 0, total: 1 }
    }
}

/// Runs the background removal pipeline on host images
pub struct BackgroundRemovalProcessor<'a> {
    remover: &'a dyn BackgroundRemover,
    params: PluginParams,
    debug: bool,
    scratch_root: Option<PathBuf>,
}

impl<'a> BackgroundRemovalProcessor<'a> {
    /// Create a processor; fails when the parameters are out of range
    pub fn new(remover: &'a dyn BackgroundRemover, params: PluginParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            remover,
            params,
            debug: false,
            scratch_root: None,
        })
    }

    /// Keep scratch files and echo tool command lines to the host
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Create scratch directories under `root` instead of the system temp dir
    #[must_use]
    pub fn with_scratch_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    #[must_use]
    pub fn params(&self) -> &PluginParams {
        &self.params
    }

    /// Remove the background of `image`'s active (topmost) layer
    ///
    /// # Errors
    /// - `NoLayers` when the image has no layer to work on
    /// - Tool failures from the remover; the image is untouched in that case
    /// - Host failures from any editing step
    pub fn process_image(
        &self,
        host: &mut dyn Host,
        image: ImageId,
        position: BatchPosition,
        reporter: &dyn ProgressReporter,
    ) -> Result<ImageOutcome> {
        let start_time = Instant::now();
        let name = host.image_name(image)?;
        let _span = spans::image_processing(&name, position.index, position.total).entered();
        let active = host
            .layers(image)?
            .first()
            .copied()
            .ok_or_else(|| RemovalError::NoLayers(name.clone()))?;

        let scratch = match &self.scratch_root {
            Some(root) => ScratchFiles::new_in(root)?,
            None => ScratchFiles::new()?,
        };
        let stage_reporter = StageReporter {
            reporter,
            name: &name,
            position,
            start_time,
        };

        let result = self.run_steps(host, image, active, &scratch, &stage_reporter);

        let policy = CleanupPolicy::for_outcome(result.is_ok(), self.debug);
        let kept = scratch.finish(policy);
        match &result {
            Ok(outcome) => {
                info!(
                    image = %name,
                    mode = ?outcome.layer_mode,
                    flattened = outcome.flattened,
                    duration_ms = start_time.elapsed().as_millis() as u64,
                    "Background removed"
                );
            },
            Err(e) => {
                if let Some(dir) = kept {
                    warn!(image = %name, error = %e, scratch = %dir.display(), "Background removal failed");
                } else {
                    warn!(image = %name, error = %e, "Background removal failed");
                }
            },
        }
        reporter.report_item_finished(&name, result.is_ok());
        result
    }

    fn run_steps(
        &self,
        host: &mut dyn Host,
        image: ImageId,
        active: LayerId,
        scratch: &ScratchFiles,
        stages: &StageReporter<'_>,
    ) -> Result<ImageOutcome> {
        stages.report(ProcessingStage::LayerExport);
        let offsets = host.layer_offsets(image, active)?;
        if self.debug {
            host.message(&format!("DEBUG: Layer offsets - x: {}, y: {}", offsets.0, offsets.1));
        }
        host.export_layer(image, active, scratch.input())
            .inspect_err(|e| stages.error(ProcessingStage::LayerExport, e))?;

        stages.report(ProcessingStage::ToolInvocation);
        let request = RemovalRequest {
            input: scratch.input(),
            output: scratch.output(),
            model: self.params.model,
            alpha_matting_erode: self.params.alpha_matting_erode(),
        };
        if self.debug {
            if let Some(line) = self.remover.describe(&request) {
                host.message(&format!("DEBUG: Command: {line}"));
            }
        }
        self.remover
            .remove_background(&request)
            .inspect_err(|e| stages.error(ProcessingStage::ToolInvocation, e))?;

        stages.report(ProcessingStage::LayerImport);
        let layer_name = format!("{} (no background)", stages.name);
        let cutout = host.import_layer(image, scratch.output(), &layer_name)?;

        stages.report(ProcessingStage::PostProcessing);
        let placed = host.set_layer_offsets(image, cutout, offsets);
        let outcome = match placed.and_then(|()| self.post_process(host, image, active, cutout)) {
            Ok(outcome) => outcome,
            Err(e) => {
                stages.error(ProcessingStage::PostProcessing, &e);
                Self::discard_cutout(host, image, active, cutout);
                return Err(e);
            },
        };

        stages.report(ProcessingStage::Completed);
        Ok(outcome)
    }

    /// Undo the layer changes of a failed post-processing step
    ///
    /// Best effort: a host that already failed may refuse these too.
    fn discard_cutout(host: &mut dyn Host, image: ImageId, active: LayerId, cutout: LayerId) {
        let layers = match host.layers(image) {
            Ok(layers) => layers,
            Err(e) => {
                warn!(image = %image, error = %e, "Could not inspect layers after failure");
                return;
            },
        };
        if layers.contains(&cutout) {
            if let Err(e) = host.remove_layer(image, cutout) {
                warn!(image = %image, layer = %cutout, error = %e, "Could not remove cut-out layer");
            }
        }
        if layers.contains(&active) {
            if let Err(e) = host.set_layer_visible(image, active, true) {
                warn!(image = %image, layer = %active, error = %e, "Could not restore layer visibility");
            }
        }
    }

    fn post_process(
        &self,
        host: &mut dyn Host,
        image: ImageId,
        active: LayerId,
        cutout: LayerId,
    ) -> Result<ImageOutcome> {
        let layer_mode = if self.params.as_mask {
            host.add_alpha_mask(image, active, cutout)?;
            host.remove_layer(image, cutout)?;
            LayerMode::Mask
        } else {
            host.set_layer_visible(image, active, false)?;
            LayerMode::SeparateLayer
        };

        let squared_to = if self.params.make_square {
            make_square(host, image)?
        } else {
            None
        };

        // Filled after squaring so it spans the final canvas
        if layer_mode == LayerMode::SeparateLayer {
            host.insert_fill_layer(image, BACKGROUND_LAYER_NAME, BACKGROUND_COLOR, LayerPosition::Bottom)?;
        }

        let flattened = self.params.flattens();
        if flattened {
            host.flatten(image)?;
        }

        Ok(ImageOutcome {
            layer_mode,
            flattened,
            squared_to,
        })
    }
}

/// Grow the shorter side to match the longer one, content centred
///
/// Returns the new side length, or `None` when the canvas is already square.
pub fn make_square(host: &mut dyn Host, image: ImageId) -> Result<Option<u32>> {
    let (width, height) = host.dimensions(image)?;
    if width == height {
        return Ok(None);
    }
    let side = width.max(height);
    let offset_x = i32::try_from((side - width) / 2)
        .map_err(|_| RemovalError::host(format!("canvas of {image} too large")))?;
    let offset_y = i32::try_from((side - height) / 2)
        .map_err(|_| RemovalError::host(format!("canvas of {image} too large")))?;
    host.resize_canvas(image, side, side, offset_x, offset_y)?;
    debug!(image = %image, side, offset_x, offset_y, "Made canvas square");
    Ok(Some(side))
}

struct StageReporter<'a> {
    reporter: &'a dyn ProgressReporter,
    name: &'a str,
    position: BatchPosition,
    start_time: Instant,
}

impl StageReporter<'_> {
    fn report(&self, stage: ProcessingStage) {
        self.reporter.report_progress(ProgressUpdate::new(
            self.name,
            self.position.index,
            self.position.total,
            stage,
            self.start_time,
        ));
    }

    fn error(&self, stage: ProcessingStage, error: &RemovalError) {
        self.reporter.report_error(stage, &error.to_string());
    }
}
