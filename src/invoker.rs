//! Invocation of the external rembg tool
//!
//! [`BackgroundRemover`] is the seam between the pipeline and whatever
//! produces the cut-out image. [`RembgCli`] implements it by running
//! `rembg i` as a blocking subprocess, either directly or through a Python
//! interpreter as `python -m rembg.cli i`.

use crate::config::PluginConfig;
use crate::error::{RemovalError, Result};
use crate::models::Model;
use crate::tracing_config::spans;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// One background removal request
#[derive(Debug, Clone, Copy)]
pub struct RemovalRequest<'a> {
    /// Image to segment
    pub input: &'a Path,
    /// Where the RGBA cut-out must be written
    pub output: &'a Path,
    pub model: Model,
    /// Alpha matting erode size, `None` to disable alpha matting
    pub alpha_matting_erode: Option<u32>,
}

/// Produces a cut-out image for a request
pub trait BackgroundRemover {
    /// Write the cut-out of `request.input` to `request.output`
    ///
    /// # Errors
    /// Any failure leaves `request.output` unspecified; callers must not
    /// import it.
    fn remove_background(&self, request: &RemovalRequest<'_>) -> Result<()>;

    /// Human readable form of what would run, for debug messages
    fn describe(&self, request: &RemovalRequest<'_>) -> Option<String> {
        let _ = request;
        None
    }
}

/// Argument vector for a rembg run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RembgCommand {
    program: String,
    args: Vec<OsString>,
}

impl RembgCommand {
    /// Build the command for `request` using `launcher`
    #[must_use]
    pub fn build(launcher: &RembgLauncher, request: &RemovalRequest<'_>) -> Self {
        let mut args: Vec<OsString> = launcher.prefix_args().iter().map(OsString::from).collect();
        args.extend(["i", "-m", request.model.name()].map(OsString::from));
        if let Some(erode) = request.alpha_matting_erode {
            args.extend(["-a".into(), "-ae".into(), erode.to_string().into()]);
        }
        args.push(request.input.as_os_str().to_owned());
        args.push(request.output.as_os_str().to_owned());

        Self {
            program: launcher.program().to_string(),
            args,
        }
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Space separated command line, for logs
    #[must_use]
    pub fn display_line(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().map(|a| a.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How rembg is started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RembgLauncher {
    /// `<python> -m rembg.cli ...`
    Python(String),
    /// `<rembg> ...`
    Executable(String),
}

impl RembgLauncher {
    /// Prefer a configured rembg executable, otherwise go through Python
    #[must_use]
    pub fn from_config(config: &PluginConfig) -> Self {
        match config.paths.rembg_executable.as_deref().map(str::trim) {
            Some(exe) if !exe.is_empty() => Self::Executable(exe.to_string()),
            _ => Self::Python(config.paths.python_executable.clone()),
        }
    }

    #[must_use]
    pub fn program(&self) -> &str {
        match self {
            Self::Python(p) | Self::Executable(p) => p,
        }
    }

    fn prefix_args(&self) -> &'static [&'static str] {
        match self {
            Self::Python(_) => &["-m", "rembg.cli"],
            Self::Executable(_) => &[],
        }
    }
}

/// Runs rembg as a subprocess and waits for it
#[derive(Debug, Clone)]
pub struct RembgCli {
    launcher: RembgLauncher,
    debug: bool,
}

impl RembgCli {
    #[must_use]
    pub fn new(launcher: RembgLauncher) -> Self {
        Self {
            launcher,
            debug: false,
        }
    }

    #[must_use]
    pub fn from_config(config: &PluginConfig) -> Self {
        Self::new(RembgLauncher::from_config(config)).with_debug(config.debug_enabled())
    }

    /// Log full command lines and tool output at info level
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn launcher(&self) -> &RembgLauncher {
        &self.launcher
    }

    /// Resolve the launcher program on `PATH`
    pub fn resolve_program(&self) -> Result<PathBuf> {
        let program = self.launcher.program();
        which::which(program).map_err(|source| RemovalError::ToolNotFound {
            program: program.to_string(),
            source,
        })
    }
}

impl BackgroundRemover for RembgCli {
    fn remove_background(&self, request: &RemovalRequest<'_>) -> Result<()> {
        let _span = spans::rembg_invocation(self.launcher.program(), request.model.name()).entered();
        let program = self.resolve_program()?;
        let command = RembgCommand::build(&self.launcher, request);

        if self.debug {
            tracing::info!(command = %command.display_line(), "Running rembg");
        } else {
            debug!(command = %command.display_line(), "Running rembg");
        }

        let output = Command::new(&program)
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| RemovalError::file_io_error("run", &program, &e))?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if self.debug && !output.stdout.is_empty() {
            tracing::info!(stdout = %String::from_utf8_lossy(&output.stdout).trim(), "rembg output");
        }

        if !output.status.success() {
            return Err(RemovalError::ToolFailed {
                code: output.status.code(),
                stderr,
            });
        }

        if !request.output.exists() {
            return Err(RemovalError::MissingOutput(request.output.to_path_buf()));
        }

        debug!(output = %request.output.display(), "rembg finished");
        Ok(())
    }

    fn describe(&self, request: &RemovalRequest<'_>) -> Option<String> {
        Some(RembgCommand::build(&self.launcher, request).display_line())
    }
}
