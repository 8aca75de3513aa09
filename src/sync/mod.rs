//! Bulk synchronization engine.
//!
//! Drives a caller-supplied batch processor over a list of items, pacing
//! every call through the service's token limiter and adapting batch size
//! to observed success and failure.

mod batch_queue;
mod progress;
mod request_queue;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::rate_limit::{ServiceLimits, TokenLimiter};

pub use batch_queue::{AdaptiveBatchQueue, Batch, QueueState};
pub use progress::{ProgressSnapshot, ProgressSummary, ProgressTracker};
pub use request_queue::{RequestOutcome, RequestQueue};

/// Failure classification at the engine boundary.
///
/// Collaborator callbacks map their transport outcomes onto this taxonomy;
/// the engine retries and escalates accordingly.
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP 429 or an explicit rate-limit signal. Always retried; never
    /// counts against the retry budget.
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// 5xx, network reset, timeout. Retried up to the configured cap.
    #[error("transient error: {0}")]
    Transient(String),

    /// Non-429 4xx. The request queue rejects these immediately; batch mode
    /// cannot attribute them to an item and treats them as batch failures.
    #[error("permanent error: {0}")]
    Permanent(String),

    /// Anything else from a collaborator.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// Classify an HTTP status code.
    pub fn from_status(status: u16, retry_after: Option<Duration>, message: &str) -> Self {
        match status {
            429 => Self::RateLimited { retry_after },
            500..=599 => Self::Transient(format!("HTTP {status}: {message}")),
            400..=499 => Self::Permanent(format!("HTTP {status}: {message}")),
            _ => Self::Transient(format!("HTTP {status}: {message}")),
        }
    }

    /// True for errors the request queue may retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Permanent(_))
    }
}

/// Options for a bulk run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Consecutive non-rate-limit failures tolerated before giving up.
    pub max_retries: u32,
    /// Raise instead of returning a partial report when retries run out.
    pub stop_on_error: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            stop_on_error: false,
        }
    }
}

/// Outcome of a bulk run.
///
/// `remaining > 0` with `summary.completed == false` means the run gave up
/// partway; the caller decides whether to resume.
#[derive(Debug)]
pub struct SyncReport<U> {
    pub results: Vec<U>,
    pub summary: ProgressSummary,
    pub queue: QueueState,
    pub remaining: usize,
}

/// Rate-limited adaptive bulk processor for one external service.
pub struct BulkSyncEngine {
    limiter: TokenLimiter,
    limits: ServiceLimits,
}

impl BulkSyncEngine {
    /// Create an engine with a fresh limiter from the service's presets.
    pub fn new(service: &str) -> Self {
        let limiter = TokenLimiter::new(service);
        let limits = limiter.limits().clone();
        Self { limiter, limits }
    }

    /// Create an engine over an existing (possibly shared) limiter, so the
    /// run inherits any rate-limit memory the service already accumulated.
    pub fn with_limiter(limiter: TokenLimiter) -> Self {
        let limits = limiter.limits().clone();
        Self { limiter, limits }
    }

    /// The limiter backing this engine.
    pub fn limiter(&self) -> &TokenLimiter {
        &self.limiter
    }

    /// Process every item, batching adaptively and pacing via the limiter.
    ///
    /// The processor sees whole batches and reports one outcome per batch;
    /// failed batches return to the front of the queue. Rate-limit errors
    /// are always retried. Other failures consume the retry budget; when it
    /// runs out the remaining items are surfaced in the report (or raised
    /// when `stop_on_error` is set).
    pub async fn run_all<T, U, F, Fut>(
        &self,
        items: Vec<T>,
        operation: &str,
        mut processor: F,
        options: SyncOptions,
    ) -> Result<SyncReport<U>, SyncError>
    where
        T: Clone,
        F: FnMut(Vec<T>) -> Fut,
        Fut: Future<Output = Result<U, SyncError>>,
    {
        let total = items.len();
        let mut queue = AdaptiveBatchQueue::new(items, &self.limits);
        let mut progress = ProgressTracker::new(operation, total);
        let mut results = Vec::new();
        let mut retries = 0u32;

        while let Some(batch) = queue.next_batch() {
            self.limiter.acquire().await;

            let attempt = batch.items.clone();
            let count = attempt.len();
            debug!(
                "{}: dispatching batch #{} ({} items, {} left)",
                operation, batch.number, count, batch.remaining
            );

            match processor(batch.items).await {
                Ok(result) => {
                    queue.report_success(count);
                    progress.update(count, 0);
                    self.limiter.report_success().await;
                    results.push(result);
                    retries = 0;
                }
                Err(err) => {
                    queue.report_failure(attempt);
                    progress.update(0, count);
                    self.limiter.report_failure().await;

                    if let SyncError::RateLimited { retry_after } = &err {
                        if let Some(delay) = retry_after {
                            self.limiter.apply_retry_after(*delay).await;
                        }
                        warn!("{}: rate limited, batch requeued", operation);
                        continue;
                    }

                    retries += 1;
                    warn!(
                        "{}: batch failed ({err}), retry {}/{}",
                        operation, retries, options.max_retries
                    );
                    if retries >= options.max_retries {
                        if options.stop_on_error {
                            return Err(err);
                        }
                        warn!(
                            "{}: giving up after {} retries, {} items unprocessed",
                            operation,
                            retries,
                            queue.remaining()
                        );
                        break;
                    }
                }
            }
        }

        Ok(SyncReport {
            results,
            summary: progress.summary(),
            queue: queue.state(),
            remaining: queue.remaining(),
        })
    }

    /// Rate-limit a single ad hoc call without queue or progress
    /// bookkeeping.
    pub async fn call_once<U, F, Fut>(&self, call: F) -> Result<U, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<U, SyncError>>,
    {
        self.limiter.acquire().await;
        match call().await {
            Ok(value) => {
                self.limiter.report_success().await;
                Ok(value)
            }
            Err(err) => {
                self.limiter.report_failure().await;
                if let SyncError::RateLimited {
                    retry_after: Some(delay),
                } = &err
                {
                    self.limiter.apply_retry_after(*delay).await;
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::rate_limit::ServiceLimits;

    fn engine(per_window: u32, max_batch: usize) -> BulkSyncEngine {
        let limits = ServiceLimits {
            requests_per_second: per_window,
            max_batch_size: max_batch,
            min_batch_size: 1,
            ..ServiceLimits::default()
        };
        BulkSyncEngine::with_limiter(TokenLimiter::with_limits("test", limits))
    }

    #[tokio::test]
    async fn test_run_all_processes_everything() {
        let engine = engine(100, 10);
        let items: Vec<u32> = (0..25).collect();

        let report = engine
            .run_all(
                items,
                "test-op",
                |batch| async move { Ok::<usize, SyncError>(batch.len()) },
                SyncOptions::default(),
            )
            .await
            .unwrap();

        assert!(report.summary.completed);
        assert_eq!(report.summary.processed_items, 25);
        assert_eq!(report.summary.error_count, 0);
        assert_eq!(report.remaining, 0);
        assert_eq!(report.results.iter().sum::<usize>(), 25);
    }

    #[tokio::test]
    async fn test_stop_on_error_raises() {
        let engine = engine(100, 5);
        let items: Vec<u32> = (0..10).collect();

        let result = engine
            .run_all(
                items,
                "test-op",
                |_batch| async move {
                    Err::<(), _>(SyncError::Permanent("bad payload".into()))
                },
                SyncOptions {
                    max_retries: 2,
                    stop_on_error: true,
                },
            )
            .await;

        assert!(matches!(result, Err(SyncError::Permanent(_))));
    }

    #[tokio::test]
    async fn test_partial_completion_reported() {
        let engine = engine(100, 5);
        let items: Vec<u32> = (0..10).collect();

        let report = engine
            .run_all(
                items,
                "test-op",
                |_batch| async move { Err::<(), _>(SyncError::Transient("boom".into())) },
                SyncOptions {
                    max_retries: 2,
                    stop_on_error: false,
                },
            )
            .await
            .unwrap();

        assert!(!report.summary.completed);
        assert_eq!(report.summary.processed_items, 0);
        assert!(report.remaining > 0);
        assert!(report.queue.failed_batches >= 2);
    }

    #[tokio::test]
    async fn test_call_once_reports_outcome() {
        let engine = engine(100, 5);

        let value = engine
            .call_once(|| async { Ok::<_, SyncError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);

        let err = engine
            .call_once(|| async { Err::<u32, _>(SyncError::Transient("down".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Transient(_)));
        assert_eq!(engine.limiter().status().await.consecutive_errors, 1);
    }

    #[tokio::test]
    async fn test_recovers_after_failures() {
        let engine = engine(1000, 5);
        let items: Vec<u32> = (0..10).collect();
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        let report = engine
            .run_all(
                items,
                "test-op",
                move |batch| {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(SyncError::Transient("flaky".into()))
                        } else {
                            Ok(batch.len())
                        }
                    }
                },
                SyncOptions {
                    max_retries: 3,
                    stop_on_error: false,
                },
            )
            .await
            .unwrap();

        assert!(report.summary.completed);
        assert_eq!(report.summary.processed_items, 10);
        assert!(report.queue.failed_batches >= 2);
        assert!(attempts.load(Ordering::SeqCst) >= 3);
    }
}
