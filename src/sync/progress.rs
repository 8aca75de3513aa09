//! Progress accounting for long-running bulk operations.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::info;

/// How often periodic progress lines are emitted.
const REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// A point-in-time progress report.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub processed: usize,
    pub total: usize,
    pub percentage: f64,
    pub errors: usize,
    /// Items resolved per second since the operation started.
    pub rate: f64,
    pub elapsed_secs: f64,
    pub eta_secs: Option<f64>,
}

/// Final accounting for a completed (or abandoned) operation.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSummary {
    pub operation: String,
    pub total_items: usize,
    pub processed_items: usize,
    pub error_count: usize,
    pub elapsed_secs: f64,
    pub success_rate: f64,
    pub completed: bool,
}

/// Tracks processed/errored counts against a known total.
///
/// Processed counts attempts resolved, not distinct items: a batch that
/// fails and later succeeds contributes its errors and then its successes.
#[derive(Debug)]
pub struct ProgressTracker {
    operation: String,
    total: usize,
    processed: usize,
    errors: usize,
    started_at: Instant,
    last_report: Instant,
}

impl ProgressTracker {
    /// Start tracking `total` items for the named operation.
    pub fn new(operation: &str, total: usize) -> Self {
        let now = Instant::now();
        Self {
            operation: operation.to_string(),
            total,
            processed: 0,
            errors: 0,
            started_at: now,
            last_report: now,
        }
    }

    /// Accumulate counts. Emits a progress line every report interval and
    /// unconditionally once the operation completes.
    pub fn update(&mut self, processed: usize, errors: usize) -> ProgressSnapshot {
        self.processed += processed;
        self.errors += errors;

        let snapshot = self.snapshot();
        let now = Instant::now();
        let complete = self.processed >= self.total;

        if complete || now.duration_since(self.last_report) >= REPORT_INTERVAL {
            self.last_report = now;
            info!(
                "{}: {}/{} ({:.1}%), {} errors, {:.1}/s{}",
                self.operation,
                snapshot.processed,
                snapshot.total,
                snapshot.percentage,
                snapshot.errors,
                snapshot.rate,
                match snapshot.eta_secs {
                    Some(eta) if !complete => format!(", ~{:.0}s left", eta),
                    _ => String::new(),
                }
            );
        }

        snapshot
    }

    /// The current progress without mutating report timing.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.processed as f64 / elapsed
        } else {
            0.0
        };
        let remaining = self.total.saturating_sub(self.processed);
        ProgressSnapshot {
            processed: self.processed,
            total: self.total,
            percentage: if self.total > 0 {
                self.processed as f64 / self.total as f64 * 100.0
            } else {
                100.0
            },
            errors: self.errors,
            rate,
            elapsed_secs: elapsed,
            eta_secs: if rate > 0.0 && remaining > 0 {
                Some(remaining as f64 / rate)
            } else {
                None
            },
        }
    }

    /// Final summary for the operation.
    pub fn summary(&self) -> ProgressSummary {
        let success_rate = if self.total > 0 {
            (self.processed.saturating_sub(self.errors)) as f64 / self.total as f64 * 100.0
        } else {
            100.0
        };
        ProgressSummary {
            operation: self.operation.clone(),
            total_items: self.total,
            processed_items: self.processed,
            error_count: self.errors,
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
            success_rate,
            completed: self.processed >= self.total,
        }
    }
}
