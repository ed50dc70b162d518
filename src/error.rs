//! Error types for background removal operations

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, RemovalError>;

/// Error kinds surfaced while removing backgrounds and editing layers
#[derive(Error, Debug)]
pub enum RemovalError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid configuration file contents
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A plugin parameter is out of range or unknown
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The external tool could not be located
    #[error("rembg executable '{program}' not found: {source}")]
    ToolNotFound {
        program: String,
        #[source]
        source: which::Error,
    },

    /// The external tool exited unsuccessfully
    #[error("rembg error (code {}): {stderr}", exit_code_label(.code))]
    ToolFailed { code: Option<i32>, stderr: String },

    /// The external tool exited cleanly but produced no output image
    #[error("Output file was not created: {}", .0.display())]
    MissingOutput(PathBuf),

    /// A host editing primitive failed
    #[error("Host operation failed: {0}")]
    Host(String),

    /// The target image has no layers to export
    #[error("No layers found in image '{0}'")]
    NoLayers(String),

    /// Batch mode found nothing to process
    #[error("No open images found")]
    NoImages,
}

fn exit_code_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

impl RemovalError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new invalid parameter error
    pub fn invalid_parameter<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a new host operation error
    pub fn host<S: Into<String>>(msg: S) -> Self {
        Self::Host(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<Path>>(operation: &str, path: P, error: &std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Create parameter error with the valid range spelled out
    pub fn parameter_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidParameter(format!(
            "Invalid {parameter}: {value} (valid range: {valid_range})"
        ))
    }

    /// Whether this error came from the external tool rather than the host
    #[must_use]
    pub fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            Self::ToolNotFound { .. } | Self::ToolFailed { .. } | Self::MissingOutput(_)
        )
    }
}
