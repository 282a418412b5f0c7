//! Progress-callback trait for per-stage batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! as the batch moves each record through the pipeline.
//!
//! # Why callbacks instead of channels?
//!
//! The library does not know whether it is driving a terminal, a web job
//! runner or a test. A callback lets the host forward events wherever it
//! likes; the CLI turns them into one `indicatif` bar per stage.
//!
//! # Example
//!
//! ```rust
//! use edgequake_sheet2pdf::{BatchProgressCallback, Stage};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountUploads(AtomicUsize);
//!
//! impl BatchProgressCallback for CountUploads {
//!     fn on_record_complete(&self, stage: Stage, _index: usize, _filename: &str) {
//!         if stage == Stage::Publish {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

/// A batch stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FetchRecords,
    FetchTemplate,
    Merge,
    Convert,
    Optimize,
    Publish,
    WriteBack,
}

impl Stage {
    /// Human-readable title used in progress output.
    pub fn title(self) -> &'static str {
        match self {
            Stage::FetchRecords => "Fetching spreadsheet",
            Stage::FetchTemplate => "Fetching template",
            Stage::Merge => "Replacing text",
            Stage::Convert => "Converting to PDF",
            Stage::Optimize => "Cleaning up PDFs",
            Stage::Publish => "Uploading PDFs",
            Stage::WriteBack => "Updating file links",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Called by the batch orchestrator as it works through each stage.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. The orchestrator is sequential, so events for one
/// batch never arrive concurrently, but the trait is `Send + Sync` so it can
/// be shared with the task that runs the batch.
pub trait BatchProgressCallback: Send + Sync {
    /// Called when a stage begins.
    ///
    /// # Arguments
    /// * `total`: number of records the stage will handle (1 for whole-batch
    ///   stages such as fetching or conversion)
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let _ = (stage, total);
    }

    /// Called when one record (0-indexed) finishes a stage.
    fn on_record_complete(&self, stage: Stage, index: usize, filename: &str) {
        let _ = (stage, index, filename);
    }

    /// Called before a failed attempt is retried.
    ///
    /// # Arguments
    /// * `attempt`: 1-based number of the attempt that failed
    /// * `error`:   human-readable error description
    fn on_retry(&self, stage: Stage, filename: &str, attempt: u32, error: &str) {
        let _ = (stage, filename, attempt, error);
    }

    /// Called when a record drops out of the batch without failing it.
    fn on_record_failed(&self, stage: Stage, index: usize, filename: &str, error: &str) {
        let _ = (stage, index, filename, error);
    }

    /// Called when a stage has handled every record.
    fn on_stage_complete(&self, stage: Stage) {
        let _ = stage;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Journal(Mutex<Vec<String>>);

    impl BatchProgressCallback for Journal {
        fn on_stage_start(&self, stage: Stage, total: usize) {
            self.0.lock().unwrap().push(format!("start {stage:?} {total}"));
        }

        fn on_retry(&self, stage: Stage, filename: &str, attempt: u32, _error: &str) {
            self.0
                .lock()
                .unwrap()
                .push(format!("retry {stage:?} {filename} #{attempt}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Merge, 3);
        cb.on_record_complete(Stage::Merge, 0, "alice");
        cb.on_retry(Stage::Publish, "alice", 1, "HTTP 503");
        cb.on_record_failed(Stage::Convert, 1, "bob", "no pdf");
        cb.on_stage_complete(Stage::Merge);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let journal = Journal::default();
        journal.on_stage_start(Stage::Publish, 2);
        journal.on_record_complete(Stage::Publish, 0, "alice");
        journal.on_retry(Stage::Publish, "bob", 2, "reset");
        assert_eq!(
            *journal.0.lock().unwrap(),
            ["start Publish 2", "retry Publish bob #2"]
        );
    }

    #[test]
    fn stage_titles_are_distinct() {
        let stages = [
            Stage::FetchRecords,
            Stage::FetchTemplate,
            Stage::Merge,
            Stage::Convert,
            Stage::Optimize,
            Stage::Publish,
            Stage::WriteBack,
        ];
        let titles: std::collections::HashSet<_> = stages.iter().map(|s| s.title()).collect();
        assert_eq!(titles.len(), stages.len());
        assert_eq!(Stage::Optimize.to_string(), "Cleaning up PDFs");
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage_start(Stage::WriteBack, 1);
        cb.on_stage_complete(Stage::WriteBack);
    }
}
