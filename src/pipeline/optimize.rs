//! PDF post-processing with Ghostscript.
//!
//! Each converted PDF is rewritten through the `pdfwrite` device: PDF/A-2b,
//! print-quality downsampling, device-independent colour mapped to CMYK,
//! embedded fonts, and linearisation for fast web view. Ghostscript is known
//! to segfault sporadically on inputs it handles fine on a second run, so the
//! batch wraps every call in [`crate::retry::OptimizerPolicy`].

use super::process::run_captured;
use crate::error::Sheet2PdfError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Rewrites one PDF into an optimised copy.
#[async_trait]
pub trait DocumentOptimizer: Send + Sync {
    async fn optimize(&self, src: &Path, dst: &Path, resolution: u32)
        -> Result<(), Sheet2PdfError>;
}

/// Ghostscript (`gs` / `gswin32c`).
#[derive(Debug, Clone)]
pub struct GhostscriptOptimizer {
    binary: PathBuf,
}

impl GhostscriptOptimizer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl DocumentOptimizer for GhostscriptOptimizer {
    async fn optimize(
        &self,
        src: &Path,
        dst: &Path,
        resolution: u32,
    ) -> Result<(), Sheet2PdfError> {
        let output = run_captured(&self.binary, &optimizer_args(src, dst, resolution)).await?;
        if !output.trim().is_empty() {
            debug!("Ghostscript output for {}:\n{}", src.display(), output.trim_end());
        }
        Ok(())
    }
}

/// Full Ghostscript argument vector for one file.
pub fn optimizer_args(src: &Path, dst: &Path, resolution: u32) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-sDEVICE=pdfwrite",
        "-dPDFA=2",
        "-dPDFACompatibilityPolicy=1",
        "-dPDFSETTINGS=/printer",
        "-sColorConversionStrategy=UseDeviceIndependentColor",
        "-sProcessColorModel=DeviceCMYK",
        "-dEmbedAllFonts=true",
        "-dFastWebView=true",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(format!("-r{resolution}").into());
    args.push("-q".into());
    args.push("-o".into());
    args.push(dst.as_os_str().to_owned());
    args.push(src.as_os_str().to_owned());
    args
}
