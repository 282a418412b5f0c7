//! Scratch directories for one batch run.
//!
//! Two directories live under the work directory for the duration of a run:
//! `_output/` for the staged template, merged decks and raw PDFs, and
//! `results/` for optimised PDFs awaiting upload. Both are wiped before the
//! run starts and removed again when the [`ScratchSpace`] is dropped, which
//! covers normal return, early `?` return, and the batch future being dropped
//! on Ctrl-C.

use crate::error::Sheet2PdfError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Merged-document staging directory name.
pub const MERGED_DIR: &str = "_output";
/// Optimised-result staging directory name.
pub const RESULTS_DIR: &str = "results";

/// Owns the scratch directories and removes them on drop.
#[derive(Debug)]
pub struct ScratchSpace {
    merged: PathBuf,
    results: PathBuf,
    cleaned: bool,
}

impl ScratchSpace {
    /// Remove any leftovers from a previous run and create fresh directories.
    pub fn prepare(work_dir: &Path) -> Result<Self, Sheet2PdfError> {
        let space = Self {
            merged: work_dir.join(MERGED_DIR),
            results: work_dir.join(RESULTS_DIR),
            cleaned: false,
        };
        for dir in [&space.merged, &space.results] {
            remove_dir_quietly(dir);
            std::fs::create_dir_all(dir).map_err(|e| Sheet2PdfError::io(dir, e))?;
        }
        debug!(
            "Prepared scratch space {} and {}",
            space.merged.display(),
            space.results.display()
        );
        Ok(space)
    }

    pub fn merged_dir(&self) -> &Path {
        &self.merged
    }

    pub fn results_dir(&self) -> &Path {
        &self.results
    }

    /// Remove both directories. Never fails; problems are logged.
    pub fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        remove_dir_quietly(&self.merged);
        remove_dir_quietly(&self.results);
        self.cleaned = true;
        debug!("Removed scratch space");
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn remove_dir_quietly(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", dir.display(), e),
    }
}
