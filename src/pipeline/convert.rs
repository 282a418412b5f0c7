//! Bulk format conversion (merged PPTX → PDF).
//!
//! Conversion is a single invocation over the whole staging directory: one
//! LibreOffice start-up costs seconds, so converting fifty decks one process
//! at a time is far slower than handing it all fifty paths at once.

use super::process::run_captured;
use crate::error::Sheet2PdfError;
use crate::merge::MERGED_EXTENSION;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Converts every merged document in a directory to another format.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Convert all merged documents in `input_dir`, writing `<stem>.<format>`
    /// files into `output_dir`.
    ///
    /// A non-zero exit is reported as an error; the caller decides whether
    /// partial output is acceptable.
    async fn convert_dir(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        format: &str,
    ) -> Result<(), Sheet2PdfError>;
}

/// Headless LibreOffice (`soffice` / `libreoffice`).
#[derive(Debug, Clone)]
pub struct LibreOfficeConverter {
    binary: PathBuf,
}

impl LibreOfficeConverter {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl DocumentConverter for LibreOfficeConverter {
    async fn convert_dir(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        format: &str,
    ) -> Result<(), Sheet2PdfError> {
        let inputs = merged_documents(input_dir).await?;
        if inputs.is_empty() {
            debug!("No merged documents in {}, skipping conversion", input_dir.display());
            return Ok(());
        }

        info!(
            "Converting {} documents to {} with {}",
            inputs.len(),
            format,
            self.binary.display()
        );
        let output = run_captured(&self.binary, &conversion_args(&inputs, output_dir, format)).await?;
        debug!("LibreOffice output:\n{}", output.trim_end());
        Ok(())
    }
}

/// `--headless --convert-to <format> --outdir <out> <file>...`
pub fn conversion_args(inputs: &[PathBuf], output_dir: &Path, format: &str) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--headless".into(),
        "--convert-to".into(),
        format.into(),
        "--outdir".into(),
        output_dir.as_os_str().to_owned(),
    ];
    args.extend(inputs.iter().map(|p| p.as_os_str().to_owned()));
    args
}

/// Merged documents in `dir`, sorted by name.
async fn merged_documents(dir: &Path) -> Result<Vec<PathBuf>, Sheet2PdfError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| Sheet2PdfError::io(dir, e))?;
    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Sheet2PdfError::io(dir, e))?
    {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == MERGED_EXTENSION) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_are_a_vector_with_one_entry_per_file() {
        let inputs = vec![
            PathBuf::from("_output/alice.pptx"),
            PathBuf::from("_output/o'brien smith.pptx"),
        ];
        let args = conversion_args(&inputs, Path::new("_output"), "pdf");
        assert_eq!(
            args,
            [
                "--headless",
                "--convert-to",
                "pdf",
                "--outdir",
                "_output",
                "_output/alice.pptx",
                "_output/o'brien smith.pptx",
            ]
            .map(OsString::from)
        );
    }

    #[tokio::test]
    async fn only_merged_documents_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pptx", "a.pptx", "a.pdf", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let found = merged_documents(dir.path()).await.unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("a.pptx"), dir.path().join("b.pptx")]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_converter_binary_with_every_document() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        std::fs::create_dir(&staging).unwrap();
        std::fs::write(staging.join("alice.pptx"), b"x").unwrap();
        std::fs::write(staging.join("bob.pptx"), b"x").unwrap();

        // Stand-in converter: touch <stem>.pdf for every input path.
        let script = dir.path().join("fake-soffice");
        std::fs::write(
            &script,
            "#!/bin/sh\nout=\"$5\"; shift 5\nfor f in \"$@\"; do b=$(basename \"$f\" .pptx); : > \"$out/$b.pdf\"; done\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        LibreOfficeConverter::new(&script)
            .convert_dir(&staging, &staging, "pdf")
            .await
            .unwrap();
        assert!(staging.join("alice.pdf").exists());
        assert!(staging.join("bob.pdf").exists());
    }

    #[tokio::test]
    async fn empty_directory_does_not_invoke_binary() {
        let dir = tempfile::tempdir().unwrap();
        LibreOfficeConverter::new("/nonexistent/soffice")
            .convert_dir(dir.path(), dir.path(), "pdf")
            .await
            .unwrap();
    }
}
