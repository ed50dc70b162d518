//! Conversion of command-line arguments into run parameters

use crate::cli::main_impl::{Cli, CliLogFormat, CliOutputFormat};
use crate::config::{OutputFormat, PluginConfig, PluginParams, PluginParamsBuilder};
use crate::tracing_config::TracingFormat;
use anyhow::{Context, Result};

/// Applies CLI overrides on top of configuration defaults
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Parameters from the configuration file, overridden by any flag given
    pub(crate) fn params_from_cli(cli: &Cli, config: &PluginConfig) -> Result<PluginParams> {
        let mut builder = PluginParamsBuilder::from_params(config.default_params());

        if let Some(model) = &cli.model {
            builder = builder.model_name(model).context("Invalid --model")?;
        }
        if let Some(as_mask) = cli.as_mask {
            builder = builder.as_mask(as_mask);
        }
        if let Some(alpha_matting) = cli.alpha_matting {
            builder = builder.alpha_matting(alpha_matting);
        }
        if let Some(erode_size) = cli.erode_size {
            builder = builder.erode_size(erode_size);
        }
        if let Some(make_square) = cli.make_square {
            builder = builder.make_square(make_square);
        }
        if let Some(all_images) = cli.all_images {
            builder = builder.process_all_images(all_images);
        }
        if let Some(keep_layers) = cli.keep_layers {
            builder = builder.keep_layers(keep_layers);
        }

        builder.build().context("Invalid background removal options")
    }

    pub(crate) fn output_format(format: CliOutputFormat) -> OutputFormat {
        match format {
            CliOutputFormat::Png => OutputFormat::Png,
            CliOutputFormat::Jpeg => OutputFormat::Jpeg,
            CliOutputFormat::Tiff => OutputFormat::Tiff,
        }
    }

    pub(crate) fn tracing_format(format: CliLogFormat) -> TracingFormat {
        match format {
            CliLogFormat::Console => TracingFormat::Console,
            CliLogFormat::Compact => TracingFormat::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => TracingFormat::Json,
        }
    }
}
