//! Batch driver
//!
//! Applies the per-image pipeline to the active image or to every open
//! image. Each image runs inside its own undo group; one image failing never
//! stops the rest of the batch.

use crate::{
    error::{RemovalError, Result},
    host::{Host, ImageId},
    processor::{BackgroundRemovalProcessor, BatchPosition, ImageOutcome},
    services::ProgressReporter,
};
use serde::Serialize;
use tracing::{info, warn};

/// Which images a run touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchScope {
    /// Only the given image
    Active(ImageId),
    /// Every image the host has open
    AllOpen,
}

/// An image the batch could not process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageFailure {
    pub image: ImageId,
    pub name: String,
    pub error: String,
}

/// Per-run summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Images whose background was removed
    pub processed: Vec<ImageId>,
    pub failed: Vec<ImageFailure>,
    /// Images left alone because they have no layers
    pub skipped: Vec<ImageId>,
}

impl BatchReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of images the batch looked at
    #[must_use]
    pub fn total(&self) -> usize {
        self.processed.len() + self.failed.len() + self.skipped.len()
    }
}

/// Drives a processor over a set of host images
pub struct BatchDriver<'a> {
    processor: &'a BackgroundRemovalProcessor<'a>,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> BatchDriver<'a> {
    #[must_use]
    pub fn new(
        processor: &'a BackgroundRemovalProcessor<'a>,
        reporter: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            processor,
            reporter,
        }
    }

    /// Resolve the images a scope covers
    ///
    /// # Errors
    /// - `NoImages` when the host has no open image
    pub fn targets(host: &dyn Host, scope: BatchScope) -> Result<Vec<ImageId>> {
        let open = host.images();
        if open.is_empty() {
            return Err(RemovalError::NoImages);
        }
        match scope {
            BatchScope::AllOpen => Ok(open),
            BatchScope::Active(image) if open.contains(&image) => Ok(vec![image]),
            BatchScope::Active(image) => Err(RemovalError::host(format!("{image} is not open"))),
        }
    }

    /// Process every image in `scope`
    ///
    /// Per-image failures are reported through [`Host::message`] and collected
    /// in the report; only failing to resolve the targets is an error.
    pub fn run(&self, host: &mut dyn Host, scope: BatchScope) -> Result<BatchReport> {
        let targets = Self::targets(host, scope)?;
        let _span = crate::tracing_config::spans::batch_processing(targets.len()).entered();

        let mut report = BatchReport::default();
        let mut work = Vec::with_capacity(targets.len());
        for image in targets {
            if scope != BatchScope::AllOpen {
                work.push(image);
                continue;
            }
            match host.layers(image) {
                Ok(layers) if layers.is_empty() => {
                    let name = display_name(host, image);
                    warn!(image = %name, "Skipping image without layers");
                    report.skipped.push(image);
                },
                Ok(_) => work.push(image),
                Err(e) => Self::record_failure(host, scope, &mut report, image, &e),
            }
        }

        let total = work.len();
        for (index, image) in work.into_iter().enumerate() {
            if let Err(e) = self.process_in_undo_group(host, image, BatchPosition { index, total }) {
                Self::record_failure(host, scope, &mut report, image, &e);
            } else {
                report.processed.push(image);
            }
        }

        info!(
            processed = report.processed.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Batch finished"
        );
        Ok(report)
    }

    fn record_failure(
        host: &mut dyn Host,
        scope: BatchScope,
        report: &mut BatchReport,
        image: ImageId,
        error: &RemovalError,
    ) {
        let name = display_name(host, image);
        let text = if scope == BatchScope::AllOpen {
            format!("Error processing image {name}: {error}")
        } else {
            format!("Error: {error}")
        };
        host.message(&text);
        report.failed.push(ImageFailure {
            image,
            name,
            error: error.to_string(),
        });
    }

    fn process_in_undo_group(
        &self,
        host: &mut dyn Host,
        image: ImageId,
        position: BatchPosition,
    ) -> Result<ImageOutcome> {
        host.undo_group_start(image)?;
        let result = self
            .processor
            .process_image(host, image, position, self.reporter);
        let closed = host.undo_group_end(image);
        let outcome = result?;
        closed?;
        Ok(outcome)
    }
}

/// The image's name, or its handle when the host cannot name it
fn display_name(host: &dyn Host, image: ImageId) -> String {
    host.image_name(image).unwrap_or_else(|_| image.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginParams;
    use crate::host::{LayerId, LayerPosition, Workspace};
    use crate::invoker::{BackgroundRemover, RemovalRequest};
    use crate::services::NoOpProgressReporter;
    use image::{Rgba, RgbaImage};
    use std::path::Path;
    use tempfile::tempdir;

    struct CopyRemover;

    impl BackgroundRemover for CopyRemover {
        fn remove_background(&self, request: &RemovalRequest<'_>) -> Result<()> {
            std::fs::copy(request.input, request.output)?;
            Ok(())
        }
    }

    struct RefusingRemover;

    impl BackgroundRemover for RefusingRemover {
        fn remove_background(&self, _request: &RemovalRequest<'_>) -> Result<()> {
            Err(RemovalError::ToolFailed {
                code: Some(2),
                stderr: "bad model".to_string(),
            })
        }
    }

    /// Workspace that cannot list the layers of one image
    struct UnlistableHost {
        inner: Workspace,
        broken: ImageId,
    }

    impl Host for UnlistableHost {
        fn images(&self) -> Vec<ImageId> {
            self.inner.images()
        }

        fn image_name(&self, image: ImageId) -> Result<String> {
            self.inner.image_name(image)
        }

        fn dimensions(&self, image: ImageId) -> Result<(u32, u32)> {
            self.inner.dimensions(image)
        }

        fn layers(&self, image: ImageId) -> Result<Vec<LayerId>> {
            if image == self.broken {
                return Err(RemovalError::host("layer list unavailable"));
            }
            self.inner.layers(image)
        }

        fn layer_offsets(&self, image: ImageId, layer: LayerId) -> Result<(i32, i32)> {
            self.inner.layer_offsets(image, layer)
        }

        fn set_layer_offsets(
            &mut self,
            image: ImageId,
            layer: LayerId,
            offsets: (i32, i32),
        ) -> Result<()> {
            self.inner.set_layer_offsets(image, layer, offsets)
        }

        fn set_layer_visible(&mut self, image: ImageId, layer: LayerId, visible: bool) -> Result<()> {
            self.inner.set_layer_visible(image, layer, visible)
        }

        fn export_layer(&self, image: ImageId, layer: LayerId, path: &Path) -> Result<()> {
            self.inner.export_layer(image, layer, path)
        }

        fn import_layer(&mut self, image: ImageId, path: &Path, name: &str) -> Result<LayerId> {
            self.inner.import_layer(image, path, name)
        }

        fn add_alpha_mask(&mut self, image: ImageId, target: LayerId, source: LayerId) -> Result<()> {
            self.inner.add_alpha_mask(image, target, source)
        }

        fn remove_layer(&mut self, image: ImageId, layer: LayerId) -> Result<()> {
            self.inner.remove_layer(image, layer)
        }

        fn insert_fill_layer(
            &mut self,
            image: ImageId,
            name: &str,
            color: Rgba<u8>,
            position: LayerPosition,
        ) -> Result<LayerId> {
            self.inner.insert_fill_layer(image, name, color, position)
        }

        fn flatten(&mut self, image: ImageId) -> Result<LayerId> {
            self.inner.flatten(image)
        }

        fn resize_canvas(
            &mut self,
            image: ImageId,
            width: u32,
            height: u32,
            offset_x: i32,
            offset_y: i32,
        ) -> Result<()> {
            self.inner.resize_canvas(image, width, height, offset_x, offset_y)
        }

        fn undo_group_start(&mut self, image: ImageId) -> Result<()> {
            self.inner.undo_group_start(image)
        }

        fn undo_group_end(&mut self, image: ImageId) -> Result<()> {
            self.inner.undo_group_end(image)
        }

        fn message(&mut self, text: &str) {
            self.inner.message(text);
        }
    }

    fn workspace_with(names: &[&str]) -> (Workspace, Vec<ImageId>) {
        let mut ws = Workspace::new();
        let ids = names
            .iter()
            .map(|n| ws.add_image(n, RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255]))))
            .collect();
        (ws, ids)
    }

    #[test]
    fn test_no_open_images() {
        let ws = Workspace::new();
        assert!(matches!(
            BatchDriver::targets(&ws, BatchScope::AllOpen),
            Err(RemovalError::NoImages)
        ));
    }

    #[test]
    fn test_active_scope_only_touches_one_image() {
        let scratch = tempdir().unwrap();
        let processor = BackgroundRemovalProcessor::new(&CopyRemover, PluginParams::default())
            .unwrap()
            .with_scratch_root(scratch.path());
        let (mut ws, ids) = workspace_with(&["a", "b"]);

        let report = BatchDriver::new(&processor, &NoOpProgressReporter)
            .run(&mut ws, BatchScope::Active(ids[1]))
            .unwrap();

        assert_eq!(report.processed, vec![ids[1]]);
        assert_eq!(ws.undo_steps(ids[0]).unwrap(), 0);
        assert_eq!(ws.undo_steps(ids[1]).unwrap(), 1);
    }

    #[test]
    fn test_layerless_images_are_skipped_in_all_mode() {
        let scratch = tempdir().unwrap();
        let processor = BackgroundRemovalProcessor::new(&CopyRemover, PluginParams::default())
            .unwrap()
            .with_scratch_root(scratch.path());
        let (mut ws, ids) = workspace_with(&["a"]);
        let empty = ws.add_empty_image("empty", 3, 3);

        let report = BatchDriver::new(&processor, &NoOpProgressReporter)
            .run(&mut ws, BatchScope::AllOpen)
            .unwrap();

        assert_eq!(report.processed, ids);
        assert_eq!(report.skipped, vec![empty]);
        assert!(report.is_success());
        assert_eq!(report.total(), 2);
    }

    #[test]
    fn test_failures_are_messaged_and_undo_groups_closed() {
        let scratch = tempdir().unwrap();
        let processor = BackgroundRemovalProcessor::new(&RefusingRemover, PluginParams::default())
            .unwrap()
            .with_scratch_root(scratch.path());
        let (mut ws, ids) = workspace_with(&["a.png", "b.png"]);

        let report = BatchDriver::new(&processor, &NoOpProgressReporter)
            .run(&mut ws, BatchScope::AllOpen)
            .unwrap();

        assert!(report.processed.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].name, "a.png");
        assert_eq!(
            ws.messages()[0],
            "Error processing image a.png: rembg error (code 2): bad model"
        );
        // Groups were closed, so undo is allowed
        assert!(ws.undo(ids[0]).unwrap());
    }

    #[test]
    fn test_host_error_on_one_image_does_not_stop_batch() {
        let scratch = tempdir().unwrap();
        let processor = BackgroundRemovalProcessor::new(&CopyRemover, PluginParams::default())
            .unwrap()
            .with_scratch_root(scratch.path());
        let (inner, ids) = workspace_with(&["a.png", "b.png"]);
        let mut host = UnlistableHost {
            inner,
            broken: ids[0],
        };

        let report = BatchDriver::new(&processor, &NoOpProgressReporter)
            .run(&mut host, BatchScope::AllOpen)
            .unwrap();

        assert_eq!(report.processed, vec![ids[1]]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].image, ids[0]);
        assert_eq!(
            host.inner.messages(),
            ["Error processing image a.png: Host operation failed: layer list unavailable"]
        );
    }
}
