//! Scratch files handed to the external tool
//!
//! Each image gets its own temporary directory holding the exported input
//! and the tool's output. Whether the directory survives is decided when the
//! image is done: it is removed after a clean run and kept for inspection
//! after a failure or when debugging.

use crate::error::{RemovalError, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const INPUT_FILE: &str = "input.png";
const OUTPUT_FILE: &str = "output.png";

/// What happens to the scratch directory when an image is finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupPolicy {
    Remove,
    Keep,
}

impl CleanupPolicy {
    /// Keep files after failures and whenever debugging is on
    #[must_use]
    pub fn for_outcome(succeeded: bool, debug_enabled: bool) -> Self {
        if succeeded && !debug_enabled {
            Self::Remove
        } else {
            Self::Keep
        }
    }
}

/// Temporary input/output pair for one rembg invocation
#[derive(Debug)]
pub struct ScratchFiles {
    dir: TempDir,
    input: PathBuf,
    output: PathBuf,
}

impl ScratchFiles {
    /// Create a fresh directory under the system temp location
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("rembg-layers-")
            .tempdir()
            .map_err(|e| RemovalError::file_io_error("create scratch directory", std::env::temp_dir(), &e))?;
        Ok(Self::in_dir(dir))
    }

    /// Create a fresh directory inside `parent`
    pub fn new_in<P: AsRef<Path>>(parent: P) -> Result<Self> {
        let parent = parent.as_ref();
        let dir = tempfile::Builder::new()
            .prefix("rembg-layers-")
            .tempdir_in(parent)
            .map_err(|e| RemovalError::file_io_error("create scratch directory", parent, &e))?;
        Ok(Self::in_dir(dir))
    }

    fn in_dir(dir: TempDir) -> Self {
        let input = dir.path().join(INPUT_FILE);
        let output = dir.path().join(OUTPUT_FILE);
        Self { dir, input, output }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Where the exported layer is written
    #[must_use]
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Where rembg writes its result
    #[must_use]
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Apply the cleanup policy; returns the directory when it was kept
    #[allow(deprecated)]
    pub fn finish(self, policy: CleanupPolicy) -> Option<PathBuf> {
        match policy {
            CleanupPolicy::Keep => {
                let kept = self.dir.into_path();
                tracing::info!(path = %kept.display(), "Keeping temporary files");
                Some(kept)
            },
            CleanupPolicy::Remove => {
                let path = self.dir.path().to_path_buf();
                if let Err(e) = self.dir.close() {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to clean up temporary files");
                }
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_live_in_scratch_dir() {
        let parent = tempdir().unwrap();
        let scratch = ScratchFiles::new_in(parent.path()).unwrap();
        assert!(scratch.dir().starts_with(parent.path()));
        assert_eq!(scratch.input().parent(), Some(scratch.dir()));
        assert_eq!(scratch.output().file_name().unwrap(), "output.png");
        assert_ne!(scratch.input(), scratch.output());
    }

    #[test]
    fn test_remove_policy_deletes_directory() {
        let parent = tempdir().unwrap();
        let scratch = ScratchFiles::new_in(parent.path()).unwrap();
        std::fs::write(scratch.input(), b"data").unwrap();
        let dir = scratch.dir().to_path_buf();

        assert_eq!(scratch.finish(CleanupPolicy::Remove), None);
        assert!(!dir.exists());
    }

    #[test]
    fn test_keep_policy_leaves_files() {
        let parent = tempdir().unwrap();
        let scratch = ScratchFiles::new_in(parent.path()).unwrap();
        std::fs::write(scratch.output(), b"data").unwrap();

        let kept = scratch.finish(CleanupPolicy::Keep).unwrap();
        assert!(kept.join("output.png").exists());
    }

    #[test]
    fn test_policy_for_outcome() {
        assert_eq!(CleanupPolicy::for_outcome(true, false), CleanupPolicy::Remove);
        assert_eq!(CleanupPolicy::for_outcome(true, true), CleanupPolicy::Keep);
        assert_eq!(CleanupPolicy::for_outcome(false, false), CleanupPolicy::Keep);
    }
}
