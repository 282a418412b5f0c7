//! # edgequake-sheet2pdf
//!
//! Mail-merge spreadsheet rows into a PowerPoint template, render each merged
//! deck to an archival PDF, publish the PDFs, and write their links back into
//! the spreadsheet.
//!
//! ## Why this crate?
//!
//! Certificates, letters and invoices are usually "one slide deck, fifty
//! names". Designers keep the layout in PowerPoint or Google Slides;
//! organisers keep the data in a sheet. This crate joins the two: every sheet
//! row whose columns are named like `<name>` becomes one PDF, and the link to
//! that PDF lands in the row's `file` column.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Sheet rows
//!  │
//!  ├─ 1. Fetch     rows → validated Records; stage the template
//!  ├─ 2. Merge     substitute placeholders per record (spawn_blocking)
//!  ├─ 3. Convert   one LibreOffice run: *.pptx → *.pdf
//!  ├─ 4. Optimize  Ghostscript PDF/A-2b per file, retried on crashes
//!  ├─ 5. Publish   upload to Drive, retried on network errors
//!  └─ 6. Write     links back to the sheet's `file` column, in row order
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_sheet2pdf::google::{auth::Authenticator, GoogleSession};
//! use edgequake_sheet2pdf::pipeline::{convert::LibreOfficeConverter, optimize::GhostscriptOptimizer};
//! use edgequake_sheet2pdf::{run_batch, BatchConfig, Collaborators};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::builder()
//!         .sheet("https://docs.google.com/spreadsheets/d/SHEET_ID/edit#gid=0")
//!         .template("certificate.pptx")
//!         .output("https://drive.google.com/drive/folders/FOLDER_ID")
//!         .build()?;
//!
//!     let session = GoogleSession::new(Authenticator::from_env_or_file(&config.credentials)?)?;
//!     let source = session.sheets(config.sheet.clone());
//!     let drive = session.drive();
//!     let publisher = session.publisher(config.output_folder.clone());
//!     let converter = LibreOfficeConverter::new(&config.libreoffice);
//!     let optimizer = GhostscriptOptimizer::new(&config.ghostscript);
//!
//!     let report = run_batch(
//!         &config,
//!         &Collaborators {
//!             source: &source,
//!             templates: &drive,
//!             converter: &converter,
//!             optimizer: &optimizer,
//!             publisher: &publisher,
//!         },
//!     )
//!     .await?;
//!     eprintln!("{} published, {} failed", report.published(), report.failed());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `sheet2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-sheet2pdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## External Tools
//!
//! | Tool | Used for | Default binary |
//! |------|----------|----------------|
//! | LibreOffice | PPTX → PDF | `soffice` (macOS, Windows), `libreoffice` (elsewhere) |
//! | Ghostscript | PDF/A-2b, compression, linearisation | `gswin32c` (Windows), `gs` (elsewhere) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod google;
pub mod merge;
pub mod pipeline;
pub mod progress;
pub mod record;
pub mod retry;
pub mod source;
pub mod template;
pub mod writeback;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{
    run_batch, BatchReport, BatchTimings, Collaborators, RecordState, RecordStatus,
    ReferenceCollector,
};
pub use config::{BatchConfig, BatchConfigBuilder, ConfigLayer, SheetLocator, TemplateSource};
pub use error::{RecordError, Sheet2PdfError};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use record::{build_records, Field, Record, RowOutcome};
