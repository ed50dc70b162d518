//! Configuration types for background removal operations
//!
//! Two layers live here: [`PluginConfig`], the settings file loaded once at
//! start-up, and [`PluginParams`], the options chosen for a single run.
//! Loading the settings file never fails; anything unusable falls back to the
//! built-in defaults.

use crate::error::{RemovalError, Result};
use crate::models::Model;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Largest accepted alpha matting erode size
pub const MAX_ERODE_SIZE: u32 = 100;

/// File name looked up next to the executable and in the config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable naming an explicit settings file
pub const CONFIG_ENV_VAR: &str = "REMBG_LAYERS_CONFIG";

/// Output image format for saved results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// JPEG (no transparency, composited onto white)
    Jpeg,
    /// TIFF with alpha channel transparency and lossless compression
    Tiff,
}

/// Executable locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Python interpreter with the `rembg` package installed
    pub python_executable: String,
    /// Standalone `rembg` executable; preferred over the interpreter when set
    pub rembg_executable: Option<String>,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            python_executable: "python".to_string(),
            rembg_executable: None,
        }
    }
}

/// Defaults used to pre-fill the options dialog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct Settings {
    pub default_alpha_matting_value: u32,
    /// Index into [`Model::ALL`]
    pub default_model: usize,
    pub default_as_mask: bool,
    pub default_alpha_matting: bool,
    pub default_make_square: bool,
    pub default_process_all_images: bool,
    pub default_keep_layers: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_alpha_matting_value: 15,
            default_model: 0,
            default_as_mask: false,
            default_alpha_matting: false,
            default_make_square: false,
            default_process_all_images: false,
            default_keep_layers: false,
        }
    }
}

impl Settings {
    /// Resolve the configured model index, falling back to the first model
    #[must_use]
    pub fn model(&self) -> Model {
        Model::from_index(self.default_model).unwrap_or_else(|| {
            warn!(
                index = self.default_model,
                fallback = %Model::default(),
                "Configured default model index is out of range"
            );
            Model::default()
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    pub debug_enabled: bool,
}

/// Where the active configuration came from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from this file
    File(PathBuf),
    /// No file was found or it could not be used
    #[default]
    Defaults,
}

/// Settings file contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub paths: Paths,
    pub settings: Settings,
    pub debug: DebugSettings,

    #[serde(skip)]
    pub source: ConfigSource,
}

impl PluginConfig {
    /// Parse settings from TOML text
    ///
    /// Missing sections and keys take their defaults; wrongly typed values and
    /// syntax errors are reported as [`RemovalError::InvalidConfig`].
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| RemovalError::invalid_config(e.to_string()))
    }

    /// Load settings from `path`, returning the full default set on any failure
    #[must_use]
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Self::default();
        }

        let parsed = std::fs::read_to_string(path)
            .map_err(|e| RemovalError::file_io_error("read configuration", path, &e))
            .and_then(|text| Self::from_toml_str(&text));

        match parsed {
            Ok(mut config) => {
                config.source = ConfigSource::File(path.to_path_buf());
                if config.debug.debug_enabled {
                    debug!(path = %path.display(), ?config, "Loaded configuration");
                }
                config
            },
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Ignoring unusable configuration file, using defaults"
                );
                Self::default()
            },
        }
    }

    /// Locate and load the settings file
    ///
    /// Lookup order: `explicit`, then [`CONFIG_ENV_VAR`], then
    /// [`CONFIG_FILE_NAME`] next to the executable, then the platform config
    /// directory. The first candidate that exists is loaded.
    #[must_use]
    pub fn discover(explicit: Option<&Path>) -> Self {
        if let Some(path) = explicit {
            return Self::load_or_default(path);
        }

        match Self::candidate_paths().into_iter().find(|p| p.exists()) {
            Some(path) => Self::load_or_default(&path),
            None => {
                debug!("No configuration file found in any default location");
                Self::default()
            },
        }
    }

    /// Default lookup locations, in priority order
    #[must_use]
    pub fn candidate_paths() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Some(env_path) = std::env::var_os(CONFIG_ENV_VAR) {
            candidates.push(PathBuf::from(env_path));
        }

        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            candidates.push(exe_dir.join(CONFIG_FILE_NAME));
        }

        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("rembg-layers").join(CONFIG_FILE_NAME));
        }

        candidates
    }

    /// Whether debug reporting is on
    #[must_use]
    pub fn debug_enabled(&self) -> bool {
        self.debug.debug_enabled
    }

    /// Parameters pre-filled from the configured defaults
    #[must_use]
    pub fn default_params(&self) -> PluginParams {
        let s = &self.settings;
        PluginParams {
            as_mask: s.default_as_mask,
            model: s.model(),
            alpha_matting: s.default_alpha_matting,
            erode_size: s.default_alpha_matting_value,
            make_square: s.default_make_square,
            process_all_images: s.default_process_all_images,
            keep_layers: s.default_keep_layers,
        }
    }

    /// Render as TOML, the same shape the loader reads
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RemovalError::invalid_config(e.to_string()))
    }
}

/// Options for one run of the background removal procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct PluginParams {
    /// Turn the result into a mask on the original layer instead of a new layer
    pub as_mask: bool,
    /// rembg model
    pub model: Model,
    /// Pass `-a` to rembg
    pub alpha_matting: bool,
    /// Alpha matting erode size (`-ae`), only used with alpha matting
    pub erode_size: u32,
    /// Grow the canvas to a square of the longer side
    pub make_square: bool,
    /// Process every open image instead of only the active one
    pub process_all_images: bool,
    /// Leave the layer stack as is instead of flattening
    pub keep_layers: bool,
}

impl Default for PluginParams {
    fn default() -> Self {
        PluginConfig::default().default_params()
    }
}

impl PluginParams {
    #[must_use]
    pub fn builder() -> PluginParamsBuilder {
        PluginParamsBuilder::default()
    }

    /// Validate all parameters
    ///
    /// # Errors
    /// - Erode size above [`MAX_ERODE_SIZE`]
    pub fn validate(&self) -> Result<()> {
        if self.erode_size > MAX_ERODE_SIZE {
            return Err(RemovalError::parameter_value_error(
                "alpha matting erode size",
                self.erode_size,
                &format!("0-{MAX_ERODE_SIZE}"),
            ));
        }
        Ok(())
    }

    /// Erode size to pass to rembg, `None` when alpha matting is off
    #[must_use]
    pub fn alpha_matting_erode(&self) -> Option<u32> {
        self.alpha_matting.then_some(self.erode_size)
    }

    /// Whether the image gets flattened after post-processing
    #[must_use]
    pub fn flattens(&self) -> bool {
        !self.as_mask && !self.keep_layers
    }
}

/// Builder for `PluginParams`
#[derive(Debug, Default)]
pub struct PluginParamsBuilder {
    params: PluginParams,
}

impl PluginParamsBuilder {
    /// Start from an existing set of parameters
    #[must_use]
    pub fn from_params(params: PluginParams) -> Self {
        Self { params }
    }

    #[must_use]
    pub fn as_mask(mut self, as_mask: bool) -> Self {
        self.params.as_mask = as_mask;
        self
    }

    #[must_use]
    pub fn model(mut self, model: Model) -> Self {
        self.params.model = model;
        self
    }

    /// Set the model by name
    pub fn model_name(mut self, name: &str) -> Result<Self> {
        self.params.model = name.parse()?;
        Ok(self)
    }

    #[must_use]
    pub fn alpha_matting(mut self, enabled: bool) -> Self {
        self.params.alpha_matting = enabled;
        self
    }

    #[must_use]
    pub fn erode_size(mut self, size: u32) -> Self {
        self.params.erode_size = size;
        self
    }

    #[must_use]
    pub fn make_square(mut self, enabled: bool) -> Self {
        self.params.make_square = enabled;
        self
    }

    #[must_use]
    pub fn process_all_images(mut self, enabled: bool) -> Self {
        self.params.process_all_images = enabled;
        self
    }

    #[must_use]
    pub fn keep_layers(mut self, enabled: bool) -> Self {
        self.params.keep_layers = enabled;
        self
    }

    /// Build and validate the parameters
    pub fn build(self) -> Result<PluginParams> {
        self.params.validate()?;
        Ok(self.params)
    }
}
