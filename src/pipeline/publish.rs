//! Publishing and template-store seams.
//!
//! The batch only needs two things from the document host: upload a file and
//! get back a link, and export a hosted presentation as PPTX. Both are traits
//! so tests can substitute in-memory fakes; the Google Drive adapters live in
//! [`crate::google::drive`].

use crate::error::Sheet2PdfError;
use async_trait::async_trait;
use std::path::Path;

/// Uploads finished documents and returns an opaque reference to each.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Upload `path` under `title`; returns the shareable reference.
    async fn publish(&self, title: &str, path: &Path) -> Result<String, Sheet2PdfError>;

    /// Make the publication target readable by anyone with the link.
    async fn share_publicly(&self) -> Result<(), Sheet2PdfError> {
        Ok(())
    }
}

/// Source of remote templates.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Export the presentation `id` as PPTX to `dest`.
    async fn export_presentation(&self, id: &str, dest: &Path) -> Result<(), Sheet2PdfError>;
}
