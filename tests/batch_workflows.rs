//! Integration tests for whole background removal runs
//!
//! These run the procedure against an in-memory workspace with scripted
//! removers standing in for rembg, so no Python environment is needed.

use image::{Rgba, RgbaImage};
use rembg_layers::{
    host::Host,
    invoker::{BackgroundRemover, RemovalRequest},
    BatchReport, DefaultsDialog, ImageId, LayerId, LayerMode, LayerPosition, PluginConfig,
    PluginParams, RemovalError, RemoveBackgroundPlugin, Result, RunMode, RunOutcome, Workspace,
};
use std::cell::Cell;
use std::path::Path;
use tempfile::TempDir;

const SUBJECT: Rgba<u8> = Rgba([30, 120, 200, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Clears a one-pixel border, keeping the centre as the "subject"
struct BorderRemover {
    calls: Cell<usize>,
    fail_on_call: Option<usize>,
}

impl BorderRemover {
    fn new() -> Self {
        Self {
            calls: Cell::new(0),
            fail_on_call: None,
        }
    }

    fn failing_on(call: usize) -> Self {
        Self {
            calls: Cell::new(0),
            fail_on_call: Some(call),
        }
    }
}

impl BackgroundRemover for BorderRemover {
    fn remove_background(&self, request: &RemovalRequest<'_>) -> Result<()> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        if self.fail_on_call == Some(call) {
            return Err(RemovalError::ToolFailed {
                code: Some(1),
                stderr: "simulated rembg crash".to_string(),
            });
        }

        let mut pixels = image::open(request.input)?.to_rgba8();
        let (w, h) = pixels.dimensions();
        for (x, y, pixel) in pixels.enumerate_pixels_mut() {
            if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
                pixel.0[3] = 0;
            }
        }
        pixels.save(request.output)?;
        Ok(())
    }
}

/// Workspace that refuses to resize one image's canvas
struct ResizeRefusingHost {
    inner: Workspace,
    refuse: ImageId,
}

impl Host for ResizeRefusingHost {
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
        if image == self.refuse {
            return Err(RemovalError::host("canvas is locked"));
        }
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

struct Fixture {
    workspace: Workspace,
    images: Vec<ImageId>,
    scratch: TempDir,
}

fn fixture(sizes: &[(u32, u32)]) -> Fixture {
    let mut workspace = Workspace::new();
    let images = sizes
        .iter()
        .enumerate()
        .map(|(i, &(w, h))| {
            workspace.add_image(&format!("image-{i}.png"), RgbaImage::from_pixel(w, h, SUBJECT))
        })
        .collect();
    Fixture {
        workspace,
        images,
        scratch: TempDir::new().unwrap(),
    }
}

fn run(
    fixture: &mut Fixture,
    remover: BorderRemover,
    params: PluginParams,
) -> RunOutcome {
    let plugin = RemoveBackgroundPlugin::new(PluginConfig::default())
        .with_remover(Box::new(remover))
        .with_scratch_root(fixture.scratch.path());
    let active = fixture.images.first().copied();
    plugin.run(
        &mut fixture.workspace,
        RunMode::NonInteractive,
        active,
        params,
        &mut DefaultsDialog,
    )
}

fn scratch_entries(path: &Path) -> usize {
    std::fs::read_dir(path).unwrap().count()
}

#[test]
fn test_one_failure_in_batch_of_three() {
    let mut fx = fixture(&[(4, 4), (4, 4), (4, 4)]);
    let before_second = fx.workspace.composite(fx.images[1]).unwrap();
    let params = PluginParams::builder().process_all_images(true).build().unwrap();

    let outcome = run(&mut fx, BorderRemover::failing_on(2), params);

    let RunOutcome::ExecutionError { message, report } = outcome else {
        panic!("expected an execution error, got {outcome:?}");
    };
    assert_eq!(message, "Failed to process 1 of 3 images");
    assert_eq!(report.processed, vec![fx.images[0], fx.images[2]]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].image, fx.images[1]);

    // The failed image is untouched; the others were flattened onto white
    assert_eq!(fx.workspace.composite(fx.images[1]).unwrap(), before_second);
    assert_eq!(fx.workspace.layers(fx.images[1]).unwrap().len(), 1);
    let first = fx.workspace.composite(fx.images[0]).unwrap();
    assert_eq!(*first.get_pixel(0, 0), WHITE);
    assert_eq!(*first.get_pixel(2, 2), SUBJECT);

    let messages = fx.workspace.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("Error processing image image-1.png: rembg error (code 1)"));

    // Only the failed image's scratch directory is kept
    assert_eq!(scratch_entries(fx.scratch.path()), 1);
}

#[test]
fn test_single_image_mode_ignores_other_images() {
    let mut fx = fixture(&[(3, 3), (3, 3)]);
    let outcome = run(&mut fx, BorderRemover::new(), PluginParams::default());

    assert_eq!(
        outcome.report().map(|r| r.processed.clone()),
        Some(vec![fx.images[0]])
    );
    assert_eq!(fx.workspace.undo_steps(fx.images[1]).unwrap(), 0);
}

#[test]
fn test_make_square_centres_wide_image() {
    let mut fx = fixture(&[(8, 4)]);
    let params = PluginParams::builder().make_square(true).build().unwrap();

    let outcome = run(&mut fx, BorderRemover::new(), params);
    assert!(outcome.is_success());

    let image = fx.images[0];
    assert_eq!(fx.workspace.dimensions(image).unwrap(), (8, 8));
    let composite = fx.workspace.composite(image).unwrap();
    // Content rows 2..6, its own border cleared, padding white
    assert_eq!(*composite.get_pixel(4, 0), WHITE);
    assert_eq!(*composite.get_pixel(4, 2), WHITE);
    assert_eq!(*composite.get_pixel(4, 3), SUBJECT);
    assert_eq!(*composite.get_pixel(4, 4), SUBJECT);
    assert_eq!(*composite.get_pixel(4, 7), WHITE);
}

#[test]
fn test_make_square_centres_tall_image_in_mask_mode() {
    let mut fx = fixture(&[(2, 6)]);
    let image = fx.images[0];
    let original = fx.workspace.layers(image).unwrap()[0];
    let params = PluginParams::builder()
        .as_mask(true)
        .make_square(true)
        .build()
        .unwrap();

    assert!(run(&mut fx, BorderRemover::new(), params).is_success());

    assert_eq!(fx.workspace.dimensions(image).unwrap(), (6, 6));
    assert_eq!(fx.workspace.layer_offsets(image, original).unwrap(), (2, 0));
}

#[test]
fn test_layer_mode_and_flatten_combinations() {
    let cases = [
        // (as_mask, keep_layers) -> (mode, flattened, layer count)
        ((false, false), (LayerMode::SeparateLayer, true, 1)),
        ((false, true), (LayerMode::SeparateLayer, false, 3)),
        ((true, false), (LayerMode::Mask, false, 1)),
        ((true, true), (LayerMode::Mask, false, 1)),
    ];

    for ((as_mask, keep_layers), (mode, flattened, layer_count)) in cases {
        let mut fx = fixture(&[(4, 4)]);
        let image = fx.images[0];
        let original = fx.workspace.layers(image).unwrap()[0];
        let params = PluginParams::builder()
            .as_mask(as_mask)
            .keep_layers(keep_layers)
            .build()
            .unwrap();
        assert_eq!(params.flattens(), flattened);

        assert!(run(&mut fx, BorderRemover::new(), params).is_success());

        let layers = fx.workspace.layers(image).unwrap();
        assert_eq!(layers.len(), layer_count, "as_mask={as_mask} keep={keep_layers}");
        let has_mask = layers
            .iter()
            .any(|&l| fx.workspace.layer(image, l).unwrap().mask().is_some());
        assert_eq!(has_mask, mode == LayerMode::Mask);
        if mode == LayerMode::Mask {
            assert_eq!(layers, vec![original]);
        }
    }
}

#[test]
fn test_undo_restores_image_after_run() {
    let mut fx = fixture(&[(5, 3)]);
    let image = fx.images[0];
    let before = fx.workspace.composite(image).unwrap();
    let params = PluginParams::builder().make_square(true).build().unwrap();

    assert!(run(&mut fx, BorderRemover::new(), params).is_success());
    assert_ne!(fx.workspace.dimensions(image).unwrap(), (5, 3));

    assert!(fx.workspace.undo(image).unwrap());
    assert_eq!(fx.workspace.dimensions(image).unwrap(), (5, 3));
    assert_eq!(fx.workspace.composite(image).unwrap(), before);
}

#[test]
fn test_all_images_with_nothing_open() {
    let mut fx = fixture(&[]);
    let params = PluginParams::builder().process_all_images(true).build().unwrap();

    let outcome = run(&mut fx, BorderRemover::new(), params);
    assert_eq!(
        outcome,
        RunOutcome::ExecutionError {
            message: "No open images found".to_string(),
            report: BatchReport::default(),
        }
    );
}

#[test]
fn test_saved_composite_round_trip() {
    let mut fx = fixture(&[(4, 4)]);
    let image = fx.images[0];
    assert!(run(&mut fx, BorderRemover::new(), PluginParams::default()).is_success());

    let out_dir = TempDir::new().unwrap();
    let out = out_dir.path().join("image-0-nobg.png");
    fx.workspace
        .save_composite(image, &out, Default::default())
        .unwrap();

    let saved = image::open(&out).unwrap().to_rgba8();
    assert_eq!(saved.dimensions(), (4, 4));
    assert_eq!(*saved.get_pixel(0, 0), WHITE);
    assert_eq!(*saved.get_pixel(1, 1), SUBJECT);
}

#[test]
fn test_host_failure_after_import_skips_rest_of_image() {
    let fx = fixture(&[(6, 4), (6, 4)]);
    let locked = fx.images[0];
    let original = fx.workspace.layers(locked).unwrap()[0];
    let before = fx.workspace.composite(locked).unwrap();
    let mut host = ResizeRefusingHost {
        inner: fx.workspace,
        refuse: locked,
    };
    let params = PluginParams::builder()
        .process_all_images(true)
        .make_square(true)
        .build()
        .unwrap();
    let plugin = RemoveBackgroundPlugin::new(PluginConfig::default())
        .with_remover(Box::new(BorderRemover::new()))
        .with_scratch_root(fx.scratch.path());

    let outcome = plugin.run(&mut host, RunMode::NonInteractive, Some(locked), params, &mut DefaultsDialog);

    let report = outcome.report().unwrap();
    assert_eq!(report.processed, vec![fx.images[1]]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].image, locked);

    let messages = host.inner.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("Error processing image image-0.png: "));
    assert!(messages[0].contains("canvas is locked"));

    // No cut-out left behind and the original is visible again
    assert_eq!(host.inner.layers(locked).unwrap(), vec![original]);
    assert!(host.inner.layer(locked, original).unwrap().is_visible());
    assert_eq!(host.inner.composite(locked).unwrap(), before);

    assert_eq!(host.inner.dimensions(fx.images[1]).unwrap(), (6, 6));
}

#[test]
fn test_mask_mode_runs_twice_on_same_image() {
    let mut fx = fixture(&[(3, 3)]);
    let image = fx.images[0];
    let original = fx.workspace.layers(image).unwrap()[0];

    for _ in 0..2 {
        let params = PluginParams::builder().as_mask(true).build().unwrap();
        let outcome = run(&mut fx, BorderRemover::new(), params);
        assert!(outcome.is_success(), "{outcome:?}");
    }

    assert_eq!(fx.workspace.layers(image).unwrap(), vec![original]);
    assert!(fx.workspace.layer(image, original).unwrap().mask().is_some());
    assert!(fx.workspace.messages().is_empty());
}
