//! Batch orchestration: rows in, published PDFs and sheet links out.
//!
//! ## Why strictly sequential?
//!
//! Every record goes through the same stages in the same order, and each
//! stage finishes all records before the next starts. This keeps the one
//! guarantee the sheet depends on: the link for record `i` lands in data row
//! `i`, however many times any upload had to be retried. The links are held
//! in a [`ReferenceCollector`] with one slot per record rather than appended
//! as uploads finish.
//!
//! ## Failure model
//!
//! * A blank row, a row with an unusable filename, or a record LibreOffice
//!   produced no PDF for is marked [`RecordState::Failed`] and skipped by
//!   later stages; its link cell is written empty.
//! * Optimizer crashes and remote hiccups are retried by [`crate::retry`].
//! * Anything else ends the batch with a [`Sheet2PdfError`].
//!
//! Scratch directories are removed however the batch ends.

use crate::config::{BatchConfig, TemplateSource};
use crate::error::{RecordError, Sheet2PdfError};
use crate::merge::merge_record;
use crate::pipeline::convert::DocumentConverter;
use crate::pipeline::optimize::DocumentOptimizer;
use crate::pipeline::publish::{Publisher, TemplateStore};
use crate::pipeline::scratch::ScratchSpace;
use crate::progress::{NoopProgressCallback, ProgressCallback, Stage};
use crate::record::{build_records, Record, RowOutcome};
use crate::retry::{retry, OptimizerPolicy, RemotePolicy};
use crate::source::TabularSource;
use crate::writeback::write_references;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Format the converter is asked to produce.
pub const TARGET_FORMAT: &str = "pdf";

/// Sub-directory of the merged staging directory holding the template.
///
/// Record filenames cannot contain a path separator, so no merged document
/// can overwrite the staged template.
const TEMPLATE_DIR: &str = "template";
const TEMPLATE_FILE: &str = "template.pptx";

/// External services the batch talks to.
pub struct Collaborators<'a> {
    pub source: &'a dyn TabularSource,
    pub templates: &'a dyn TemplateStore,
    pub converter: &'a dyn DocumentConverter,
    pub optimizer: &'a dyn DocumentOptimizer,
    pub publisher: &'a dyn Publisher,
}

/// How far a record got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Fetched,
    Merged,
    Converted,
    Cleaned,
    Published,
    Failed,
}

/// Final status of one record.
#[derive(Debug, Clone, Serialize)]
pub struct RecordStatus {
    pub filename: String,
    pub state: RecordState,
    pub reference: Option<String>,
    pub error: Option<RecordError>,
}

/// Wall-clock time per stage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchTimings {
    pub fetch_ms: u64,
    pub merge_ms: u64,
    pub convert_ms: u64,
    pub optimize_ms: u64,
    pub publish_ms: u64,
    pub write_back_ms: u64,
    pub total_ms: u64,
}

/// Outcome of a batch that ran to completion.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub records: Vec<RecordStatus>,
    /// Anchor cell of the written link column, e.g. `"C2"`; `None` for an empty batch.
    pub written_at: Option<String>,
    /// The values written, one per record.
    pub written_column: Vec<String>,
    pub timings: BatchTimings,
}

impl BatchReport {
    pub fn published(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.state == RecordState::Published)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.state == RecordState::Failed)
            .count()
    }
}

/// One slot per record; slot `i` holds record `i`'s published reference.
#[derive(Debug)]
pub struct ReferenceCollector {
    slots: Vec<Option<String>>,
}

impl ReferenceCollector {
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    pub fn store(&mut self, index: usize, reference: String) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(reference);
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.slots.get(index).and_then(|s| s.as_deref())
    }

    /// The write-back column: unpublished records become empty cells.
    pub fn column(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|s| s.clone().unwrap_or_default())
            .collect()
    }
}

struct Tracked {
    /// `None` for rows that never became a record.
    record: Option<Record>,
    filename: String,
    state: RecordState,
    error: Option<RecordError>,
}

impl Tracked {
    fn from_outcome(outcome: RowOutcome) -> Self {
        match outcome {
            Ok(record) => Self {
                filename: record.filename().to_string(),
                record: Some(record),
                state: RecordState::Fetched,
                error: None,
            },
            Err(err) => Self {
                filename: err.filename().to_string(),
                record: None,
                state: RecordState::Failed,
                error: Some(err),
            },
        }
    }
}

/// Run one full batch.
///
/// # Errors
/// Returns `Err(Sheet2PdfError)` for fatal errors: bad sheet data, an
/// unreadable template, a non-crash optimizer failure, a rejected remote
/// request, or cancellation. Records whose PDF was never produced are
/// reported in the [`BatchReport`] instead.
pub async fn run_batch(
    config: &BatchConfig,
    services: &Collaborators<'_>,
) -> Result<BatchReport, Sheet2PdfError> {
    let total_start = Instant::now();
    let progress: ProgressCallback = config
        .progress_callback
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgressCallback));
    let remote = RemotePolicy::new(config.retry_pause);
    let mut timings = BatchTimings::default();

    // ── Step 1: Scratch space ────────────────────────────────────────────
    let mut scratch = ScratchSpace::prepare(&config.work_dir)?;
    let merged_dir = scratch.merged_dir().to_path_buf();
    let results_dir = scratch.results_dir().to_path_buf();

    // ── Step 2: Fetch records ────────────────────────────────────────────
    let fetch_start = Instant::now();
    progress.on_stage_start(Stage::FetchRecords, 1);
    let rows = retry(
        "fetching rows",
        &remote,
        |attempt, err| progress.on_retry(Stage::FetchRecords, "", attempt, &err.to_string()),
        || services.source.rows(),
    )
    .await?;
    let mut tracked: Vec<Tracked> = build_records(&rows)?
        .into_iter()
        .map(Tracked::from_outcome)
        .collect();
    for (i, t) in tracked.iter().enumerate() {
        if let Some(err) = &t.error {
            progress.on_record_failed(Stage::FetchRecords, i, &t.filename, &err.to_string());
        }
    }
    progress.on_stage_complete(Stage::FetchRecords);
    info!(
        "Fetched {} rows ({} usable)",
        tracked.len(),
        count_in(&tracked, RecordState::Fetched)
    );

    // ── Step 3: Stage template ───────────────────────────────────────────
    progress.on_stage_start(Stage::FetchTemplate, 1);
    let template =
        stage_template(config, services.templates, &remote, &progress, &merged_dir).await?;
    progress.on_stage_complete(Stage::FetchTemplate);
    timings.fetch_ms = fetch_start.elapsed().as_millis() as u64;

    // ── Step 4: Merge ────────────────────────────────────────────────────
    let merge_start = Instant::now();
    let mergeable = count_in(&tracked, RecordState::Fetched);
    progress.on_stage_start(Stage::Merge, mergeable);
    for (i, t) in tracked.iter_mut().enumerate() {
        let Some(record) = t.record.clone() else {
            continue;
        };
        let (template, dir) = (template.clone(), merged_dir.clone());
        tokio::task::spawn_blocking(move || merge_record(&template, &record, &dir))
            .await
            .map_err(|e| Sheet2PdfError::Internal(format!("Merge task panicked: {}", e)))??;
        t.state = RecordState::Merged;
        progress.on_record_complete(Stage::Merge, i, &t.filename);
    }
    if let Some(dir) = template.parent() {
        if let Err(e) = tokio::fs::remove_dir_all(dir).await {
            warn!("Could not remove staged template {}: {}", dir.display(), e);
        }
    }
    progress.on_stage_complete(Stage::Merge);
    timings.merge_ms = merge_start.elapsed().as_millis() as u64;
    info!("Merged {} documents in {}ms", mergeable, timings.merge_ms);

    // ── Step 5: Convert ──────────────────────────────────────────────────
    let convert_start = Instant::now();
    progress.on_stage_start(Stage::Convert, 1);
    match services
        .converter
        .convert_dir(&merged_dir, &merged_dir, TARGET_FORMAT)
        .await
    {
        Ok(()) => {}
        Err(e @ (Sheet2PdfError::Cancelled | Sheet2PdfError::ProcessSpawn { .. })) => {
            return Err(e)
        }
        Err(e) => warn!("Converter reported a failure, checking its output anyway: {}", e),
    }

    // ── Step 6: Verify conversion ────────────────────────────────────────
    for (i, t) in tracked.iter_mut().enumerate() {
        if t.state != RecordState::Merged {
            continue;
        }
        if converted_path(&merged_dir, &t.filename).is_file() {
            t.state = RecordState::Converted;
            continue;
        }
        let err = RecordError::NotConverted {
            filename: t.filename.clone(),
        };
        warn!("{}", err);
        progress.on_record_failed(Stage::Convert, i, &t.filename, &err.to_string());
        t.state = RecordState::Failed;
        t.error = Some(err);
    }
    progress.on_stage_complete(Stage::Convert);
    timings.convert_ms = convert_start.elapsed().as_millis() as u64;

    // ── Step 7: Optimize ─────────────────────────────────────────────────
    let optimize_start = Instant::now();
    let optimizer_policy = OptimizerPolicy::default();
    let converted = count_in(&tracked, RecordState::Converted);
    progress.on_stage_start(Stage::Optimize, converted);
    for (i, t) in tracked.iter_mut().enumerate() {
        if t.state != RecordState::Converted {
            continue;
        }
        let filename = t.filename.as_str();
        let src = converted_path(&merged_dir, filename);
        let dst = results_dir.join(pdf_name(filename));
        retry(
            &format!("optimizing {}", filename),
            &optimizer_policy,
            |attempt, err| progress.on_retry(Stage::Optimize, filename, attempt, &err.to_string()),
            || services.optimizer.optimize(&src, &dst, config.resolution),
        )
        .await?;
        t.state = RecordState::Cleaned;
        debug!("Optimized {}", dst.display());
        progress.on_record_complete(Stage::Optimize, i, filename);
    }
    progress.on_stage_complete(Stage::Optimize);
    timings.optimize_ms = optimize_start.elapsed().as_millis() as u64;

    // ── Step 8: Publish ──────────────────────────────────────────────────
    let publish_start = Instant::now();
    if config.share_output {
        retry(
            "sharing output folder",
            &remote,
            |attempt, err| progress.on_retry(Stage::Publish, "", attempt, &err.to_string()),
            || services.publisher.share_publicly(),
        )
        .await?;
    }
    let mut collector = ReferenceCollector::new(tracked.len());
    progress.on_stage_start(Stage::Publish, count_in(&tracked, RecordState::Cleaned));
    for (i, t) in tracked.iter_mut().enumerate() {
        if t.state != RecordState::Cleaned {
            continue;
        }
        let filename = t.filename.as_str();
        let title = pdf_name(filename);
        let path = results_dir.join(&title);
        let reference = retry(
            &format!("uploading {}", title),
            &remote,
            |attempt, err| progress.on_retry(Stage::Publish, filename, attempt, &err.to_string()),
            || services.publisher.publish(&title, &path),
        )
        .await?;
        debug!("Published {} → {}", title, reference);
        collector.store(i, reference);
        t.state = RecordState::Published;
        progress.on_record_complete(Stage::Publish, i, filename);
    }
    progress.on_stage_complete(Stage::Publish);
    timings.publish_ms = publish_start.elapsed().as_millis() as u64;

    // ── Step 9: Write back ───────────────────────────────────────────────
    let write_start = Instant::now();
    progress.on_stage_start(Stage::WriteBack, 1);
    let column = collector.column();
    let written_at = retry(
        "writing links",
        &remote,
        |attempt, err| progress.on_retry(Stage::WriteBack, "", attempt, &err.to_string()),
        || write_references(services.source, &column),
    )
    .await?;
    progress.on_stage_complete(Stage::WriteBack);
    timings.write_back_ms = write_start.elapsed().as_millis() as u64;

    // ── Step 10: Cleanup ─────────────────────────────────────────────────
    scratch.cleanup();
    timings.total_ms = total_start.elapsed().as_millis() as u64;

    let records: Vec<RecordStatus> = tracked
        .into_iter()
        .enumerate()
        .map(|(i, t)| RecordStatus {
            filename: t.filename,
            state: t.state,
            reference: collector.get(i).map(str::to_string),
            error: t.error,
        })
        .collect();
    let report = BatchReport {
        records,
        written_at,
        written_column: column,
        timings,
    };
    info!(
        "Batch complete: {} published, {} failed in {}ms",
        report.published(),
        report.failed(),
        report.timings.total_ms
    );
    Ok(report)
}

/// Copy or export the template into the staging directory.
async fn stage_template(
    config: &BatchConfig,
    store: &dyn TemplateStore,
    remote: &RemotePolicy,
    progress: &ProgressCallback,
    merged_dir: &Path,
) -> Result<PathBuf, Sheet2PdfError> {
    let dir = merged_dir.join(TEMPLATE_DIR);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| Sheet2PdfError::io(&dir, e))?;
    let dest = dir.join(TEMPLATE_FILE);

    match &config.template {
        TemplateSource::Local(path) => {
            if !path.is_file() {
                return Err(Sheet2PdfError::TemplateNotFound { path: path.clone() });
            }
            tokio::fs::copy(path, &dest)
                .await
                .map_err(|e| Sheet2PdfError::io(path, e))?;
            info!("Using local template {}", path.display());
        }
        TemplateSource::Remote { id } => {
            retry(
                "exporting template",
                remote,
                |attempt, err| {
                    progress.on_retry(Stage::FetchTemplate, "", attempt, &err.to_string())
                },
                || store.export_presentation(id, &dest),
            )
            .await?;
        }
    }
    Ok(dest)
}

fn pdf_name(filename: &str) -> String {
    format!("{}.{}", filename, TARGET_FORMAT)
}

fn converted_path(merged_dir: &Path, filename: &str) -> PathBuf {
    merged_dir.join(pdf_name(filename))
}

fn count_in(tracked: &[Tracked], state: RecordState) -> usize {
    tracked.iter().filter(|t| t.state == state).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_is_positional() {
        let mut c = ReferenceCollector::new(3);
        c.store(2, "c".into());
        c.store(0, "a".into());
        assert_eq!(c.column(), ["a", "", "c"]);
        assert_eq!(c.get(1), None);
        assert_eq!(c.get(2), Some("c"));
    }

    #[test]
    fn collector_ignores_out_of_range_slots() {
        let mut c = ReferenceCollector::new(1);
        c.store(5, "x".into());
        assert_eq!(c.column(), [""]);
    }

    #[test]
    fn report_counts_states() {
        let status = |state| RecordStatus {
            filename: "f".into(),
            state,
            reference: None,
            error: None,
        };
        let report = BatchReport {
            records: vec![
                status(RecordState::Published),
                status(RecordState::Failed),
                status(RecordState::Published),
            ],
            written_at: Some("C2".into()),
            written_column: vec![],
            timings: BatchTimings::default(),
        };
        assert_eq!(report.published(), 2);
        assert_eq!(report.failed(), 1);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["records"][1]["state"], "failed");
    }
}
