#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # rembg-layers
//!
//! Background removal for layered images, driven by the external
//! [rembg](https://github.com/danielgatis/rembg) command-line tool.
//!
//! The crate does no segmentation itself. For each target image it exports
//! the active layer to a scratch file, runs `rembg i` on it, imports the
//! cut-out back as a layer and then applies the requested layer operations:
//!
//! - **Mask**: the cut-out's alpha becomes a mask on the original layer
//! - **Separate layer**: the cut-out sits above the hidden original, on a white background
//! - **Make square**: the canvas grows to a centred square
//! - **Flatten**: visible layers are merged unless masking or `keep_layers` is on
//!
//! Image and layer storage belongs to a [`Host`]. [`Workspace`] is the
//! in-memory host used by the `rembg-layers` binary and the tests.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rembg_layers::{
//!     DefaultsDialog, PluginConfig, RemoveBackgroundPlugin, RunMode, RunOutcome, Workspace,
//! };
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = PluginConfig::discover(None);
//! let plugin = RemoveBackgroundPlugin::new(config);
//!
//! let mut workspace = Workspace::new();
//! let image = workspace.open("portrait.jpg")?;
//!
//! let params = plugin.default_params();
//! match plugin.run(&mut workspace, RunMode::NonInteractive, Some(image), params, &mut DefaultsDialog) {
//!     RunOutcome::Success(_) => {
//!         workspace.save_composite(image, "portrait-nobg.png", Default::default())?;
//!     },
//!     RunOutcome::Cancelled => {},
//!     RunOutcome::ExecutionError { message, .. } => anyhow::bail!(message),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): command-line front-end, progress bar and tracing subscriber setup
//! - `tracing-json`: JSON log output for the command-line front-end

pub mod batch;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod dialog;
pub mod error;
pub mod host;
pub mod invoker;
pub mod models;
pub mod plugin;
pub mod processor;
pub mod services;
pub mod tracing_config;

pub use batch::{BatchDriver, BatchReport, BatchScope, ImageFailure};
pub use config::{OutputFormat, PluginConfig, PluginParams, PluginParamsBuilder};
pub use dialog::{DefaultsDialog, DialogOutcome, OptionsDialog, PromptDialog};
pub use error::{RemovalError, Result};
pub use host::{Host, ImageId, LayerId, LayerPosition, Workspace};
pub use invoker::{BackgroundRemover, RembgCli, RembgCommand, RembgLauncher, RemovalRequest};
pub use models::Model;
pub use plugin::{ProcedureInfo, RemoveBackgroundPlugin, RunMode, RunOutcome};
pub use processor::{BackgroundRemovalProcessor, BatchPosition, ImageOutcome, LayerMode};
pub use services::{
    CleanupPolicy, ConsoleProgressReporter, ImageIOService, NoOpProgressReporter,
    OutputFormatHandler, ProcessingStage, ProgressReporter, ProgressUpdate, ScratchFiles,
};

#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;
pub use tracing_config::{events, spans, TracingConfig, TracingFormat};
