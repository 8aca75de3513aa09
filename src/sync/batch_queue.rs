//! FIFO work queue with feedback-controlled batch sizing.

use std::collections::VecDeque;

use tracing::debug;

use crate::rate_limit::ServiceLimits;

/// Growth factor applied on every third successful batch.
const GROWTH_FACTOR: f64 = 1.2;

/// Shrink factor applied on every failed batch.
const SHRINK_FACTOR: f64 = 0.7;

/// Successful batches required per growth step.
const GROWTH_INTERVAL: u64 = 3;

/// One dispatched unit of work.
#[derive(Debug)]
pub struct Batch<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub remaining: usize,
}

/// Counters describing queue progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueState {
    pub current_batch_size: usize,
    pub successful_batches: u64,
    pub failed_batches: u64,
    pub total_processed: u64,
    pub remaining: usize,
}

/// Work queue whose batch size grows on sustained success and shrinks on
/// failure.
///
/// Growth is deliberately slower than shrink: one step up per three
/// successes, an immediate step down per failure. Failed items return to
/// the front of the queue so retries run before untouched work.
#[derive(Debug)]
pub struct AdaptiveBatchQueue<T> {
    pending: VecDeque<T>,
    current_batch_size: usize,
    min_batch_size: usize,
    max_batch_size: usize,
    batch_number: u64,
    successful_batches: u64,
    failed_batches: u64,
    total_processed: u64,
}

impl<T> AdaptiveBatchQueue<T> {
    /// Create a queue over `items` bounded by the service's batch limits.
    pub fn new(items: Vec<T>, limits: &ServiceLimits) -> Self {
        Self::with_bounds(items, limits.min_batch_size, limits.max_batch_size)
    }

    /// Create a queue with explicit batch-size bounds.
    pub fn with_bounds(items: Vec<T>, min_batch_size: usize, max_batch_size: usize) -> Self {
        let min_batch_size = min_batch_size.max(1);
        let max_batch_size = max_batch_size.max(min_batch_size);
        Self {
            pending: items.into(),
            current_batch_size: max_batch_size,
            min_batch_size,
            max_batch_size,
            batch_number: 0,
            successful_batches: 0,
            failed_batches: 0,
            total_processed: 0,
        }
    }

    /// Take the next batch from the front, or `None` when exhausted.
    pub fn next_batch(&mut self) -> Option<Batch<T>> {
        if self.pending.is_empty() {
            return None;
        }

        let take = self.current_batch_size.min(self.pending.len());
        let items: Vec<T> = self.pending.drain(..take).collect();
        self.batch_number += 1;

        Some(Batch {
            items,
            number: self.batch_number,
            remaining: self.pending.len(),
        })
    }

    /// Record a successful batch of `count` items.
    pub fn report_success(&mut self, count: usize) {
        self.total_processed += count as u64;
        self.successful_batches += 1;

        if self.successful_batches % GROWTH_INTERVAL == 0 {
            let grown = ((self.current_batch_size as f64) * GROWTH_FACTOR).ceil() as usize;
            let grown = grown.min(self.max_batch_size);
            if grown != self.current_batch_size {
                debug!(
                    "Batch size {} -> {} after {} successful batches",
                    self.current_batch_size, grown, self.successful_batches
                );
                self.current_batch_size = grown;
            }
        }
    }

    /// Return a failed batch's items to the front and shrink the batch size.
    pub fn report_failure(&mut self, items: Vec<T>) {
        self.failed_batches += 1;

        for item in items.into_iter().rev() {
            self.pending.push_front(item);
        }

        let shrunk = ((self.current_batch_size as f64) * SHRINK_FACTOR).floor() as usize;
        let shrunk = shrunk.max(self.min_batch_size);
        if shrunk != self.current_batch_size {
            debug!(
                "Batch size {} -> {} after failure",
                self.current_batch_size, shrunk
            );
            self.current_batch_size = shrunk;
        }
    }

    /// Items still waiting to be dispatched.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// The batch size the next dispatch will use.
    pub fn current_batch_size(&self) -> usize {
        self.current_batch_size
    }

    /// Snapshot of queue counters.
    pub fn state(&self) -> QueueState {
        QueueState {
            current_batch_size: self.current_batch_size,
            successful_batches: self.successful_batches,
            failed_batches: self.failed_batches,
            total_processed: self.total_processed,
            remaining: self.pending.len(),
        }
    }
}
