//! Error types for the edgequake-sheet2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Sheet2PdfError`]: **Fatal**: the batch cannot proceed (missing
//!   setting, unreadable template, optimizer rejected a file, user pressed
//!   Ctrl-C). Returned as `Err(Sheet2PdfError)` from [`crate::run_batch`].
//!
//! * [`RecordError`]: **Non-fatal**: a single record could not be carried
//!   through a stage but all other records are fine. Stored inside
//!   [`crate::batch::RecordStatus`] so the batch still publishes and writes
//!   back everything else.
//!
//! The retry policies in [`crate::retry`] classify [`Sheet2PdfError`]
//! variants; [`Sheet2PdfError::is_configuration`] and
//! [`Sheet2PdfError::is_cancelled`] are the predicates they lean on.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-sheet2pdf library.
#[derive(Debug, Error)]
pub enum Sheet2PdfError {
    // ── Configuration errors ─────────────────────────────────────────────
    /// A required setting is absent from both the command line and the config file.
    #[error("Missing required setting '{name}'\nPass --{name} or set `{name}` in the config file.")]
    MissingSetting { name: &'static str },

    /// A locator (sheet URL, folder URL, template URL) could not be parsed.
    #[error("Invalid {kind} locator '{value}': {reason}")]
    InvalidLocator {
        kind: &'static str,
        value: String,
        reason: String,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The TOML config file exists but could not be read or parsed.
    #[error("Failed to load config file '{path}': {detail}")]
    ConfigFile { path: PathBuf, detail: String },

    /// The credentials file is missing, unreadable or not an authorized-user file.
    #[error("Cannot use credentials file '{path}': {detail}\nCreate it with an OAuth consent flow or set SHEET2PDF_ACCESS_TOKEN.")]
    Credentials { path: PathBuf, detail: String },

    /// No header cell in row 1 carries the write-back column name.
    #[error("No column named '{name}' in the header row of the sheet\nAdd a '{name}' header cell to receive the published links.")]
    ColumnNotFound { name: String },

    // ── Record errors ────────────────────────────────────────────────────
    /// The sheet has no `filename` column.
    #[error("The sheet has no 'filename' column; every row needs an output file name")]
    MissingFilenameColumn,

    /// A row could not be turned into a record.
    #[error("Row {row}: {reason}")]
    InvalidRecord { row: usize, reason: String },

    /// Two rows share the same output file name.
    #[error("Duplicate filename '{filename}' (rows {first} and {second})")]
    DuplicateFilename {
        filename: String,
        first: usize,
        second: usize,
    },

    // ── Template errors ──────────────────────────────────────────────────
    /// Template file was not found at the given path.
    #[error("Template not found: '{path}'\nCheck the path exists and is readable.")]
    TemplateNotFound { path: PathBuf },

    /// The template is not a readable PPTX package.
    #[error("Template '{path}' is not a valid presentation: {detail}")]
    InvalidTemplate { path: PathBuf, detail: String },

    // ── External process errors ──────────────────────────────────────────
    /// The external program could not be started at all.
    #[error("Failed to run '{program}': {source}\nCheck the binary is installed or pass its path explicitly.")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external program was killed by a signal.
    #[error("'{program}' was killed by signal {signal}\n{output}")]
    ProcessCrashed {
        program: String,
        signal: i32,
        output: String,
    },

    /// The external program exited with a non-zero code.
    #[error("'{program}' exited with code {code}\n{output}")]
    ProcessFailed {
        program: String,
        code: i32,
        output: String,
    },

    // ── Remote service errors ────────────────────────────────────────────
    /// Credentials are missing or the token exchange failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A remote API call failed in a way that may succeed on a later attempt
    /// (network error, timeout, 5xx, rate limiting).
    #[error("{service} request failed: {detail}")]
    Remote {
        service: &'static str,
        detail: String,
    },

    /// The remote service refused the request (4xx other than 408/429).
    #[error("{service} rejected the request (HTTP {status}): {detail}\nCheck the URL/id and that the account can access it.")]
    RemoteRejected {
        service: &'static str,
        status: u16,
        detail: String,
    },

    // ── I/O errors ───────────────────────────────────────────────────────
    /// Local file system operation failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Cancellation ─────────────────────────────────────────────────────
    /// The user interrupted the run.
    #[error("Cancelled by user")]
    Cancelled,

    // ── Catch-all ────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Sheet2PdfError {
    /// Build an [`Sheet2PdfError::Io`] for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a [`Sheet2PdfError::Remote`] from any displayable failure.
    pub fn remote(service: &'static str, detail: impl std::fmt::Display) -> Self {
        Self::Remote {
            service,
            detail: detail.to_string(),
        }
    }

    /// True for errors caused by local settings, files or sheet data.
    ///
    /// Retrying cannot fix these, so no retry policy treats them as recoverable.
    /// Anything a remote service answered (including rejections and failed
    /// token exchanges) is not a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingSetting { .. }
                | Self::InvalidLocator { .. }
                | Self::InvalidConfig(_)
                | Self::ConfigFile { .. }
                | Self::Credentials { .. }
                | Self::ColumnNotFound { .. }
                | Self::MissingFilenameColumn
                | Self::InvalidRecord { .. }
                | Self::DuplicateFilename { .. }
        )
    }

    /// True when the user interrupted the run.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A non-fatal error for a single record.
///
/// Stored in the batch report; the record's write-back cell is left empty.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum RecordError {
    /// The sheet row is blank or its filename is unusable.
    #[error("Row {row}: {reason}")]
    InvalidRow {
        row: usize,
        filename: String,
        reason: String,
    },

    /// The converter finished but produced no PDF for this record.
    #[error("'{filename}': converter produced no PDF")]
    NotConverted { filename: String },
}

impl RecordError {
    /// The record's filename as it appeared in the sheet (may be empty).
    pub fn filename(&self) -> &str {
        match self {
            Self::InvalidRow { filename, .. } | Self::NotConverted { filename } => filename,
        }
    }
}
