//! Procedure registration and entry point
//!
//! [`RemoveBackgroundPlugin::procedure`] describes what the host registers
//! (name, menu entry, parameter schema) and [`RemoveBackgroundPlugin::run`]
//! is what the host calls when the menu entry is activated.

use crate::{
    batch::{BatchDriver, BatchReport, BatchScope},
    config::{PluginConfig, PluginParams, MAX_ERODE_SIZE},
    dialog::{DefaultsDialog, DialogOutcome, OptionsDialog},
    error::{RemovalError, Result},
    host::{Host, ImageId},
    invoker::{BackgroundRemover, RembgCli},
    models::Model,
    processor::BackgroundRemovalProcessor,
    services::{NoOpProgressReporter, ProgressReporter},
};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{debug, info};

pub const PROCEDURE_NAME: &str = "plug-in-rembg-remove-background";
pub const MENU_LABEL: &str = "AI Remove Background...";
pub const MENU_PATH: &str = "<Image>/Filters/";
pub const IMAGE_TYPES: &str = "RGB*, GRAY*";
pub const COMPLETION_MESSAGE: &str = "Background removal complete!";

/// How the host invoked the procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Show the options dialog first
    Interactive,
    /// Use the supplied parameters as they are
    NonInteractive,
}

/// Value type of a procedure parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParamKind {
    Boolean,
    Choice { choices: Vec<String> },
    Integer { min: u32, max: u32 },
}

/// One entry of the procedure's parameter schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub label: &'static str,
    #[serde(flatten)]
    pub kind: ParamKind,
    pub default: Value,
}

/// Authors, license and year shown by the host's procedure browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribution {
    pub authors: &'static str,
    pub copyright: &'static str,
    pub date: &'static str,
}

/// What the host registers for this plugin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcedureInfo {
    pub name: &'static str,
    pub menu_label: &'static str,
    pub menu_path: &'static str,
    pub image_types: &'static str,
    pub blurb: &'static str,
    pub help: &'static str,
    pub attribution: Attribution,
    pub params: Vec<ParamSpec>,
}

impl ProcedureInfo {
    /// Pretty-printed JSON description
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| RemovalError::invalid_config(format!("cannot serialise procedure: {e}")))
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// Result of one procedure call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success(BatchReport),
    /// The dialog was dismissed; nothing was touched
    Cancelled,
    ExecutionError {
        message: String,
        report: BatchReport,
    },
}

impl RunOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Batch report, when processing got that far
    #[must_use]
    pub fn report(&self) -> Option<&BatchReport> {
        match self {
            Self::Success(report) | Self::ExecutionError { report, .. } => Some(report),
            Self::Cancelled => None,
        }
    }
}

/// The background removal procedure
pub struct RemoveBackgroundPlugin {
    config: PluginConfig,
    remover: Box<dyn BackgroundRemover>,
    reporter: Box<dyn ProgressReporter>,
    scratch_root: Option<PathBuf>,
}

impl RemoveBackgroundPlugin {
    /// Plugin that runs rembg as configured
    #[must_use]
    pub fn new(config: PluginConfig) -> Self {
        let remover = Box::new(RembgCli::from_config(&config));
        Self {
            config,
            remover,
            reporter: Box::new(NoOpProgressReporter),
            scratch_root: None,
        }
    }

    /// Replace the background remover
    #[must_use]
    pub fn with_remover(mut self, remover: Box<dyn BackgroundRemover>) -> Self {
        self.remover = remover;
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Create scratch directories under `root`
    #[must_use]
    pub fn with_scratch_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    #[must_use]
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Parameters pre-filled from the configuration
    #[must_use]
    pub fn default_params(&self) -> PluginParams {
        self.config.default_params()
    }

    /// Registration metadata
    #[must_use]
    pub fn procedure() -> ProcedureInfo {
        let defaults = PluginParams::default();
        ProcedureInfo {
            name: PROCEDURE_NAME,
            menu_label: MENU_LABEL,
            menu_path: MENU_PATH,
            image_types: IMAGE_TYPES,
            blurb: "AI Remove image background",
            help: "Remove image backgrounds with rembg, as a new layer or as a layer mask, \
                   optionally for every open image.",
            attribution: Attribution {
                authors: "rembg-layers developers",
                copyright: "GPLv3",
                date: "2024",
            },
            params: param_schema(&defaults),
        }
    }

    /// Run the procedure against `host`
    ///
    /// `active` is the image the procedure was invoked on; it is ignored when
    /// the parameters ask for every open image.
    pub fn run(
        &self,
        host: &mut dyn Host,
        run_mode: RunMode,
        active: Option<ImageId>,
        defaults: PluginParams,
        dialog: &mut dyn OptionsDialog,
    ) -> RunOutcome {
        let dialog_result = match run_mode {
            RunMode::Interactive => dialog.run(defaults),
            RunMode::NonInteractive => DefaultsDialog.run(defaults),
        };
        let params = match dialog_result {
            Ok(DialogOutcome::Accepted(params)) => params,
            Ok(DialogOutcome::Cancelled) => {
                info!("Background removal cancelled");
                return RunOutcome::Cancelled;
            },
            Err(e) => return execution_error(&e, BatchReport::default()),
        };
        debug!(?params, ?run_mode, "Running background removal");

        let report = match self.process(host, active, params) {
            Ok(report) => report,
            Err(e) => return execution_error(&e, BatchReport::default()),
        };

        if !report.is_success() {
            let message = match report.failed.as_slice() {
                [only] if report.processed.is_empty() => format!("Error: {}", only.error),
                failed => format!(
                    "Failed to process {} of {} images",
                    failed.len(),
                    report.processed.len() + failed.len()
                ),
            };
            return RunOutcome::ExecutionError { message, report };
        }

        if run_mode == RunMode::Interactive {
            host.message(COMPLETION_MESSAGE);
        }
        RunOutcome::Success(report)
    }

    fn process(
        &self,
        host: &mut dyn Host,
        active: Option<ImageId>,
        params: PluginParams,
    ) -> Result<BatchReport> {
        let scope = if params.process_all_images {
            BatchScope::AllOpen
        } else {
            BatchScope::Active(active.ok_or(RemovalError::NoImages)?)
        };

        let mut processor = BackgroundRemovalProcessor::new(self.remover.as_ref(), params)?
            .with_debug(self.config.debug_enabled());
        if let Some(root) = &self.scratch_root {
            processor = processor.with_scratch_root(root);
        }
        BatchDriver::new(&processor, self.reporter.as_ref()).run(host, scope)
    }
}

fn execution_error(error: &RemovalError, report: BatchReport) -> RunOutcome {
    RunOutcome::ExecutionError {
        message: error.to_string(),
        report,
    }
}

fn param_schema(defaults: &PluginParams) -> Vec<ParamSpec> {
    vec![
        ParamSpec {
            name: "as-mask",
            label: "Use as Mask",
            kind: ParamKind::Boolean,
            default: json!(defaults.as_mask),
        },
        ParamSpec {
            name: "model",
            label: "Model",
            kind: ParamKind::Choice {
                choices: Model::ALL.iter().map(|m| m.name().to_string()).collect(),
            },
            default: json!(defaults.model.name()),
        },
        ParamSpec {
            name: "alpha-matting",
            label: "Alpha Matting",
            kind: ParamKind::Boolean,
            default: json!(defaults.alpha_matting),
        },
        ParamSpec {
            name: "erode-size",
            label: "Alpha Matting Erode Size",
            kind: ParamKind::Integer {
                min: 0,
                max: MAX_ERODE_SIZE,
            },
            default: json!(defaults.erode_size),
        },
        ParamSpec {
            name: "make-square",
            label: "Make Square",
            kind: ParamKind::Boolean,
            default: json!(defaults.make_square),
        },
        ParamSpec {
            name: "process-all-images",
            label: "Process all open images",
            kind: ParamKind::Boolean,
            default: json!(defaults.process_all_images),
        },
        ParamSpec {
            name: "keep-layers",
            label: "Keep layers",
            kind: ParamKind::Boolean,
            default: json!(defaults.keep_layers),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Workspace;
    use crate::invoker::RemovalRequest;
    use image::{Rgba, RgbaImage};
    use tempfile::tempdir;

    struct CopyRemover;

    impl BackgroundRemover for CopyRemover {
        fn remove_background(&self, request: &RemovalRequest<'_>) -> Result<()> {
            std::fs::copy(request.input, request.output)?;
            Ok(())
        }
    }

    struct CancelDialog;

    impl OptionsDialog for CancelDialog {
        fn run(&mut self, _defaults: PluginParams) -> Result<DialogOutcome> {
            Ok(DialogOutcome::Cancelled)
        }
    }

    fn plugin(scratch: &std::path::Path) -> RemoveBackgroundPlugin {
        RemoveBackgroundPlugin::new(PluginConfig::default())
            .with_remover(Box::new(CopyRemover))
            .with_scratch_root(scratch)
    }

    fn one_image() -> (Workspace, ImageId) {
        let mut ws = Workspace::new();
        let id = ws.add_image("a.png", RgbaImage::from_pixel(2, 1, Rgba([1, 2, 3, 255])));
        (ws, id)
    }

    #[test]
    fn test_procedure_metadata() {
        let info = RemoveBackgroundPlugin::procedure();
        assert_eq!(info.name, "plug-in-rembg-remove-background");
        assert_eq!(info.menu_label, "AI Remove Background...");
        assert_eq!(info.image_types, "RGB*, GRAY*");
        assert_eq!(info.params.len(), 7);
        assert_eq!(
            info.param("erode-size").unwrap().kind,
            ParamKind::Integer { min: 0, max: 100 }
        );

        let json: Value = serde_json::from_str(&info.to_json().unwrap()).unwrap();
        assert_eq!(json["params"][1]["type"], "choice");
        assert_eq!(json["params"][1]["choices"][7], "sam");
        assert_eq!(json["params"][3]["default"], 15);
    }

    #[test]
    fn test_interactive_success_reports_completion() {
        let scratch = tempdir().unwrap();
        let plugin = plugin(scratch.path());
        let (mut ws, id) = one_image();

        let outcome = plugin.run(
            &mut ws,
            RunMode::Interactive,
            Some(id),
            plugin.default_params(),
            &mut DefaultsDialog,
        );

        assert!(outcome.is_success());
        assert_eq!(outcome.report().unwrap().processed, vec![id]);
        assert_eq!(ws.messages().last().unwrap(), COMPLETION_MESSAGE);
    }

    #[test]
    fn test_non_interactive_skips_dialog_and_message() {
        let scratch = tempdir().unwrap();
        let plugin = plugin(scratch.path());
        let (mut ws, id) = one_image();

        let outcome = plugin.run(
            &mut ws,
            RunMode::NonInteractive,
            Some(id),
            plugin.default_params(),
            &mut CancelDialog,
        );

        assert!(outcome.is_success());
        assert!(ws.messages().is_empty());
    }

    #[test]
    fn test_cancelled_dialog_has_no_side_effects() {
        let scratch = tempdir().unwrap();
        let plugin = plugin(scratch.path());
        let (mut ws, id) = one_image();

        let outcome = plugin.run(
            &mut ws,
            RunMode::Interactive,
            Some(id),
            plugin.default_params(),
            &mut CancelDialog,
        );

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(ws.undo_steps(id).unwrap(), 0);
        assert!(ws.messages().is_empty());
    }

    #[test]
    fn test_missing_active_image_is_an_execution_error() {
        let scratch = tempdir().unwrap();
        let plugin = plugin(scratch.path());
        let mut ws = Workspace::new();

        let outcome = plugin.run(
            &mut ws,
            RunMode::NonInteractive,
            None,
            plugin.default_params(),
            &mut DefaultsDialog,
        );

        assert!(matches!(
            outcome,
            RunOutcome::ExecutionError { ref message, .. } if message == "No open images found"
        ));
    }

    #[test]
    fn test_invalid_defaults_are_an_execution_error() {
        let scratch = tempdir().unwrap();
        let plugin = plugin(scratch.path());
        let (mut ws, id) = one_image();
        let params = PluginParams {
            erode_size: 1000,
            ..plugin.default_params()
        };

        let outcome = plugin.run(&mut ws, RunMode::NonInteractive, Some(id), params, &mut DefaultsDialog);
        assert!(!outcome.is_success());
        assert_eq!(ws.undo_steps(id).unwrap(), 0);
    }
}
