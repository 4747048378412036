//! Golden-file lookup
//!
//! One golden directory per engine family. The harness's obligation is to
//! fail fast, naming the exact file, when a golden name exists in neither
//! directory; the actual content comparison belongs to an external
//! collaborator.

use std::path::{Path, PathBuf};

use crate::error::{HarnessError, HarnessResult};

#[derive(Debug, Clone)]
pub struct GoldenDirs {
    chromium_dir: PathBuf,
    firefox_dir: PathBuf,
}

impl GoldenDirs {
    pub fn new(chromium_dir: impl Into<PathBuf>, firefox_dir: impl Into<PathBuf>) -> Self {
        Self {
            chromium_dir: chromium_dir.into(),
            firefox_dir: firefox_dir.into(),
        }
    }

    pub fn chromium_dir(&self) -> &Path {
        &self.chromium_dir
    }

    pub fn firefox_dir(&self) -> &Path {
        &self.firefox_dir
    }

    /// Locate `name`, preferring the chromium directory. A name present in
    /// neither directory is a hard failure, never a silent pass.
    pub fn resolve(&self, name: &str) -> HarnessResult<PathBuf> {
        for dir in [&self.chromium_dir, &self.firefox_dir] {
            let candidate = dir.join(name);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(HarnessError::GoldenMissing {
            name: name.to_string(),
        })
    }

    /// Fail fast if `name` is missing from both directories, then hand off
    /// to the comparison collaborator.
    pub fn assert_matches(&self, _actual: &[u8], name: &str) -> HarnessResult<bool> {
        let _golden = self.resolve(name)?;
        // TODO: delegate to the byte/image comparator once one lands
        Ok(true)
    }
}
