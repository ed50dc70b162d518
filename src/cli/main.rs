//! rembg-layers command-line tool
//!
//! Opens the given images in an in-memory workspace, runs the background
//! removal procedure on them and saves the composites next to the inputs or
//! into `--output`.

use super::config::CliConfigBuilder;
use super::progress::{batch_progress_bar, BarProgressReporter};
use crate::{
    config::{ConfigSource, OutputFormat, PluginConfig},
    dialog::{DefaultsDialog, PromptDialog},
    host::{ImageId, Workspace},
    models::Model,
    plugin::{RemoveBackgroundPlugin, RunMode, RunOutcome},
    services::{ImageIOService, OutputFormatHandler},
    tracing_config::{events, init_cli_tracing, spans},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

/// Remove image backgrounds with rembg and apply the result as layers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "rembg-layers")]
pub struct Cli {
    /// Input image files or directories
    #[arg(value_name = "INPUT", required_unless_present_any = ["list_models", "show_procedure", "show_config"])]
    pub input: Vec<PathBuf>,

    /// Directory for the processed images [default: next to each input]
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = CliOutputFormat::Png)]
    pub format: CliOutputFormat,

    /// Configuration file [default: searched in the usual locations]
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// rembg model name
    #[arg(short, long)]
    pub model: Option<String>,

    /// Apply the result as a layer mask instead of a new layer
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_name = "BOOL")]
    pub as_mask: Option<bool>,

    /// Enable rembg alpha matting
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_name = "BOOL")]
    pub alpha_matting: Option<bool>,

    /// Alpha matting erode size (0-100)
    #[arg(long, value_name = "SIZE")]
    pub erode_size: Option<u32>,

    /// Grow the canvas to a centred square
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_name = "BOOL")]
    pub make_square: Option<bool>,

    /// Process every input instead of only the first one
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_name = "BOOL")]
    pub all_images: Option<bool>,

    /// Keep the layer stack instead of flattening
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_name = "BOOL")]
    pub keep_layers: Option<bool>,

    /// Ask for the options on the terminal before processing
    #[arg(short, long)]
    pub interactive: bool,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// File name pattern for directory inputs (e.g. "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Log output style
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// List the rembg models and exit
    #[arg(long)]
    pub list_models: bool,

    /// Print the procedure description as JSON and exit
    #[arg(long)]
    pub show_procedure: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub show_config: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Jpeg,
    Tiff,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    /// Coloured human-readable lines
    Console,
    /// Plain lines without colours
    Compact,
    /// One JSON object per event
    #[cfg(feature = "tracing-json")]
    Json,
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = init_cli_tracing(cli.verbose, CliConfigBuilder::tracing_format(cli.log_format))
        .context("Failed to initialize tracing")?;
    let config = PluginConfig::discover(cli.config.as_deref());

    if cli.list_models {
        list_models(&config);
        return Ok(());
    }
    if cli.show_procedure {
        println!("{}", RemoveBackgroundPlugin::procedure().to_json()?);
        return Ok(());
    }
    if cli.show_config {
        return show_config(&config);
    }

    let defaults = CliConfigBuilder::params_from_cli(&cli, &config)?;
    let format = CliConfigBuilder::output_format(cli.format);
    let _session = spans::session(&session_id, defaults.model.name()).entered();

    let files = collect_inputs(&cli.input, cli.recursive, cli.pattern.as_deref())?;
    if files.is_empty() {
        anyhow::bail!("No supported image files found in the provided inputs");
    }
    info!("Found {} image file(s)", files.len());

    let mut workspace = Workspace::new();
    let mut sources = BTreeMap::new();
    let mut open_failures = 0usize;
    for path in &files {
        match workspace.open(path) {
            Ok(id) => {
                sources.insert(id, path.clone());
            },
            Err(e) => {
                error!("Failed to open {}: {}", path.display(), e);
                open_failures += 1;
            },
        }
    }
    let active = sources.keys().next().copied();

    // Upper bound; the reporter shrinks the bar to the real batch size
    let target_count = if defaults.process_all_images || cli.interactive {
        sources.len()
    } else {
        sources.len().min(1)
    };
    let bar = batch_progress_bar(target_count);
    let plugin = RemoveBackgroundPlugin::new(config)
        .with_reporter(Box::new(BarProgressReporter::new(bar.clone(), cli.verbose > 0)));

    let start = Instant::now();
    let outcome = if cli.interactive {
        let mut dialog = PromptDialog::new(io::stdin().lock(), io::stderr());
        plugin.run(&mut workspace, RunMode::Interactive, active, defaults, &mut dialog)
    } else {
        plugin.run(&mut workspace, RunMode::NonInteractive, active, defaults, &mut DefaultsDialog)
    };
    bar.finish_and_clear();

    let report = match &outcome {
        RunOutcome::Cancelled => {
            info!("Cancelled, nothing was changed");
            return Ok(());
        },
        RunOutcome::Success(report) => report,
        RunOutcome::ExecutionError { message, report } => {
            warn!("{message}");
            report
        },
    };

    let mut save_failures = 0usize;
    for image in &report.processed {
        let Some(input) = sources.get(image) else {
            continue;
        };
        if let Err(e) = save_result(&workspace, *image, input, cli.output.as_deref(), format) {
            events::error_with_context(&*e, &input.display().to_string());
            save_failures += 1;
        }
    }
    events::performance_metric("batch", start.elapsed().as_millis() as u64);

    let failed = report.failed.len() + open_failures + save_failures;
    info!(
        "Processed {} image(s), {} failed, {} skipped",
        report.processed.len() - save_failures,
        failed,
        report.skipped.len()
    );
    if failed > 0 {
        anyhow::bail!("{failed} image(s) could not be processed");
    }
    Ok(())
}

fn save_result(
    workspace: &Workspace,
    image: ImageId,
    input: &Path,
    output_dir: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let output = generate_output_path(input, output_dir, format);
    workspace
        .save_composite(image, &output, format)
        .with_context(|| format!("Failed to save {}", output.display()))?;
    info!("Saved {}", output.display());
    Ok(())
}

fn list_models(config: &PluginConfig) {
    let default = config.settings.model();
    println!("Available rembg models:");
    for model in Model::ALL {
        let marker = if model == default { " (default)" } else { "" };
        println!("  {:>2}  {}{}", model.index(), model, marker);
    }
}

fn show_config(config: &PluginConfig) -> Result<()> {
    match &config.source {
        ConfigSource::File(path) => println!("# Loaded from {}", path.display()),
        ConfigSource::Defaults => println!("# Built-in defaults"),
    }
    print!("{}", config.to_toml_string()?);
    Ok(())
}

/// Expand files and directories into a sorted list of image files
fn collect_inputs(inputs: &[PathBuf], recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in inputs {
        if path.is_file() {
            if ImageIOService::is_supported_format(path) {
                files.push(path.clone());
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            files.extend(find_image_files(path, recursive, pattern)?);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if recursive {
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type().is_file()
                && ImageIOService::is_supported_format(path)
                && matches_pattern(path, pattern)
            {
                files.push(path.to_path_buf());
            }
        }
    } else {
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_file()
                && ImageIOService::is_supported_format(&path)
                && matches_pattern(&path, pattern)
            {
                files.push(path);
            }
        }
    }

    Ok(files)
}

fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| glob::Pattern::new(pat).is_ok_and(|p| p.matches(name))),
        None => true,
    }
}

/// `<stem>-nobg.<ext>` next to the input, or inside `output_dir`
fn generate_output_path(input: &Path, output_dir: Option<&Path>, format: OutputFormat) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let file_name = format!("{stem}-nobg.{}", OutputFormatHandler::get_extension(format));
    let dir = output_dir.unwrap_or_else(|| input.parent().unwrap_or(Path::new(".")));
    dir.join(file_name)
}
