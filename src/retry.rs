//! Self-retrying execution for externally fallible stages.
//!
//! Every stage that talks to something outside the process (Ghostscript,
//! Google Drive, Google Sheets) runs through [`retry`]. Callers never loop
//! themselves; they pick a [`RecoveryPolicy`] and hand over a closure that
//! re-creates the operation from scratch on each attempt.
//!
//! ## Retry Strategy
//!
//! Retries are unbounded. Both external faults this pipeline sees in practice
//! are transient but bursty: Ghostscript occasionally segfaults on a file it
//! converts fine on the next run, and Drive uploads fail with connection
//! resets or 5xx during quota spikes. A fixed short pause (no backoff) keeps
//! the batch moving. What stops a retry loop is the policy saying
//! [`Recovery::Abort`]: cancellation always aborts, and so do configuration
//! errors and non-crash process failures.

use crate::error::Sheet2PdfError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Default pause before re-trying a remote call.
pub const DEFAULT_REMOTE_PAUSE: Duration = Duration::from_millis(1000);

/// What to do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Run the operation again.
    Retry,
    /// Give up and return the error.
    Abort,
}

/// Decides whether an error is worth another attempt.
pub trait RecoveryPolicy<E> {
    fn classify(&self, error: &E) -> Recovery;

    /// Pause before the next attempt.
    fn pause(&self) -> Duration {
        Duration::ZERO
    }
}

/// Run `operation` until it succeeds or `policy` says abort.
///
/// `on_retry` is called with the 1-based number of the failed attempt and its
/// error, before the pause and the next attempt.
pub async fn retry<T, E, P, F, Fut, N>(
    label: &str,
    policy: &P,
    mut on_retry: N,
    mut operation: F,
) -> Result<T, E>
where
    P: RecoveryPolicy<E> + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    N: FnMut(u32, &E),
    E: std::fmt::Display,
{
    let mut attempt: u32 = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => match policy.classify(&err) {
                Recovery::Abort => return Err(err),
                Recovery::Retry => {
                    warn!("Retrying {} after attempt {} failed: {}", label, attempt, err);
                    on_retry(attempt, &err);
                    let pause = policy.pause();
                    if !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                    attempt = attempt.saturating_add(1);
                }
            },
        }
    }
}

/// Policy for the optimizer: only crash-class signals are retried.
#[derive(Debug, Clone)]
pub struct OptimizerPolicy {
    transient_signals: Vec<i32>,
}

impl OptimizerPolicy {
    pub fn new(transient_signals: Vec<i32>) -> Self {
        Self { transient_signals }
    }
}

impl Default for OptimizerPolicy {
    /// SIGSEGV and SIGBUS.
    fn default() -> Self {
        #[cfg(unix)]
        let signals = vec![libc::SIGSEGV, libc::SIGBUS];
        #[cfg(not(unix))]
        let signals = Vec::new();
        Self::new(signals)
    }
}

impl RecoveryPolicy<Sheet2PdfError> for OptimizerPolicy {
    fn classify(&self, error: &Sheet2PdfError) -> Recovery {
        match error {
            Sheet2PdfError::ProcessCrashed { signal, .. }
                if self.transient_signals.contains(signal) =>
            {
                Recovery::Retry
            }
            _ => Recovery::Abort,
        }
    }
}

/// Policy for remote services: every failure is retried except cancellation
/// and local configuration errors ([`Sheet2PdfError::is_configuration`]).
///
/// Rejections, quota refusals and failed token exchanges are retried too.
#[derive(Debug, Clone, Copy)]
pub struct RemotePolicy {
    pause: Duration,
}

impl RemotePolicy {
    pub fn new(pause: Duration) -> Self {
        Self { pause }
    }
}

impl Default for RemotePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_REMOTE_PAUSE)
    }
}

impl RecoveryPolicy<Sheet2PdfError> for RemotePolicy {
    fn classify(&self, error: &Sheet2PdfError) -> Recovery {
        if error.is_cancelled() || error.is_configuration() {
            Recovery::Abort
        } else {
            Recovery::Retry
        }
    }

    fn pause(&self) -> Duration {
        self.pause
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Fails `failures` times with `err()` then succeeds with the attempt count.
    async fn flaky(
        calls: &Cell<u32>,
        failures: u32,
        err: impl Fn() -> Sheet2PdfError,
    ) -> Result<u32, Sheet2PdfError> {
        calls.set(calls.get() + 1);
        if calls.get() <= failures {
            Err(err())
        } else {
            Ok(calls.get())
        }
    }

    fn network_error() -> Sheet2PdfError {
        Sheet2PdfError::remote("Drive", "connection reset")
    }

    #[test]
    fn k_failures_then_success_takes_k_plus_one_calls() {
        for k in [0, 1, 5] {
            let calls = Cell::new(0);
            let mut announced = Vec::new();
            let result = tokio_test::block_on(retry(
                "upload",
                &RemotePolicy::new(Duration::ZERO),
                |attempt, _| announced.push(attempt),
                || flaky(&calls, k, network_error),
            ));
            assert_eq!(result.unwrap(), k + 1);
            assert_eq!(calls.get(), k + 1);
            assert_eq!(announced, (1..=k).collect::<Vec<_>>());
        }
    }

    #[test]
    fn cancellation_is_never_retried() {
        let calls = Cell::new(0);
        let result = tokio_test::block_on(retry(
            "upload",
            &RemotePolicy::new(Duration::ZERO),
            |_, _| panic!("must not announce a retry"),
            || flaky(&calls, 1, || Sheet2PdfError::Cancelled),
        ));
        assert!(matches!(result, Err(Sheet2PdfError::Cancelled)));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn configuration_errors_are_not_retried_remotely() {
        let calls = Cell::new(0);
        let result = tokio_test::block_on(retry(
            "write-back",
            &RemotePolicy::new(Duration::ZERO),
            |_, _| {},
            || flaky(&calls, 3, || Sheet2PdfError::ColumnNotFound { name: "file".into() }),
        ));
        assert!(matches!(result, Err(Sheet2PdfError::ColumnNotFound { .. })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn remote_policy_retries_whatever_the_service_answered() {
        let policy = RemotePolicy::default();
        for err in [
            network_error(),
            Sheet2PdfError::Auth("invalid_grant".into()),
            Sheet2PdfError::RemoteRejected {
                service: "Drive",
                status: 403,
                detail: "User rate limit exceeded.".into(),
            },
        ] {
            assert_eq!(policy.classify(&err), Recovery::Retry, "{err:?}");
        }
        assert_eq!(policy.classify(&Sheet2PdfError::Cancelled), Recovery::Abort);
        assert_eq!(
            policy.classify(&Sheet2PdfError::MissingSetting { name: "output" }),
            Recovery::Abort
        );
    }

    #[test]
    fn optimizer_retries_only_transient_signals() {
        let policy = OptimizerPolicy::new(vec![11, 7]);
        let crashed = |signal| Sheet2PdfError::ProcessCrashed {
            program: "gs".into(),
            signal,
            output: String::new(),
        };
        assert_eq!(policy.classify(&crashed(11)), Recovery::Retry);
        assert_eq!(policy.classify(&crashed(7)), Recovery::Retry);
        assert_eq!(policy.classify(&crashed(9)), Recovery::Abort);
        assert_eq!(
            policy.classify(&Sheet2PdfError::ProcessFailed {
                program: "gs".into(),
                code: 1,
                output: "boom".into(),
            }),
            Recovery::Abort
        );
        assert_eq!(policy.classify(&Sheet2PdfError::Cancelled), Recovery::Abort);
    }

    #[test]
    fn optimizer_retry_loop_surfaces_diagnostic_output() {
        let calls = Cell::new(0);
        let policy = OptimizerPolicy::new(vec![11]);
        let result = tokio_test::block_on(retry(
            "optimize",
            &policy,
            |_, _| {},
            || async {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(Sheet2PdfError::ProcessCrashed {
                        program: "gs".into(),
                        signal: 11,
                        output: String::new(),
                    })
                } else {
                    Err::<(), _>(Sheet2PdfError::ProcessFailed {
                        program: "gs".into(),
                        code: 1,
                        output: "**** Unable to open the initial device".into(),
                    })
                }
            },
        ));
        assert_eq!(calls.get(), 3);
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("Unable to open the initial device"), "got: {msg}");
    }

    #[cfg(unix)]
    #[test]
    fn default_optimizer_policy_covers_segv_and_bus() {
        let policy = OptimizerPolicy::default();
        for signal in [libc::SIGSEGV, libc::SIGBUS] {
            let err = Sheet2PdfError::ProcessCrashed {
                program: "gs".into(),
                signal,
                output: String::new(),
            };
            assert_eq!(policy.classify(&err), Recovery::Retry);
        }
    }

    #[tokio::test]
    async fn remote_policy_pauses_between_attempts() {
        tokio::time::pause();
        let calls = Cell::new(0);
        let start = tokio::time::Instant::now();
        let result = retry(
            "upload",
            &RemotePolicy::new(Duration::from_millis(250)),
            |_, _| {},
            || flaky(&calls, 2, network_error),
        )
        .await;
        assert!(result.is_ok());
        assert!(start.elapsed() >= Duration::from_millis(500));
    }
}
