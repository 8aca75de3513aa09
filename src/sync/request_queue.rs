//! FIFO request queue for one-at-a-time submissions.
//!
//! For callers without a pre-known item list: requests queue up and drain
//! in order through the service's token limiter. Rate-limited requests
//! retry in place with the server's `Retry-After` (or a default delay),
//! independently of the batch-oriented backoff path.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::SyncError;
use crate::rate_limit::TokenLimiter;

/// Default per-request attempt cap.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default wait when a rate-limit response carries no `Retry-After`.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

type RequestCall<U> = Box<dyn FnMut() -> BoxFuture<'static, Result<U, SyncError>> + Send>;

struct QueuedRequest<U> {
    label: String,
    call: RequestCall<U>,
}

/// Result of draining one queued request.
#[derive(Debug)]
pub struct RequestOutcome<U> {
    pub label: String,
    pub attempts: u32,
    pub result: Result<U, SyncError>,
}

/// FIFO queue of rate-limited requests.
pub struct RequestQueue<U> {
    limiter: TokenLimiter,
    queue: VecDeque<QueuedRequest<U>>,
    max_attempts: u32,
    default_retry_delay: Duration,
}

impl<U> RequestQueue<U> {
    /// Create a queue over the given limiter with default retry policy.
    pub fn new(limiter: TokenLimiter) -> Self {
        Self::with_retry_policy(limiter, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }

    /// Create a queue with an explicit attempt cap and fallback delay.
    pub fn with_retry_policy(
        limiter: TokenLimiter,
        max_attempts: u32,
        default_retry_delay: Duration,
    ) -> Self {
        Self {
            limiter,
            queue: VecDeque::new(),
            max_attempts: max_attempts.max(1),
            default_retry_delay,
        }
    }

    /// Append a request to the back of the queue.
    pub fn submit<F, Fut>(&mut self, label: &str, mut call: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<U, SyncError>> + Send + 'static,
    {
        self.queue.push_back(QueuedRequest {
            label: label.to_string(),
            call: Box::new(move || Box::pin(call())),
        });
    }

    /// Requests still waiting.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drain the queue in FIFO order, one request at a time.
    ///
    /// Permanent (non-429 4xx) errors reject immediately. Rate-limit
    /// responses wait out `Retry-After` and retry; transient errors
    /// escalate limiter backoff and retry. Both stop at the attempt cap.
    pub async fn drain(&mut self) -> Vec<RequestOutcome<U>> {
        let mut outcomes = Vec::with_capacity(self.queue.len());

        while let Some(mut request) = self.queue.pop_front() {
            let mut attempts = 0u32;
            let result = loop {
                attempts += 1;
                self.limiter.acquire().await;

                match (request.call)().await {
                    Ok(value) => {
                        self.limiter.report_success().await;
                        break Ok(value);
                    }
                    Err(SyncError::RateLimited { retry_after })
                        if attempts < self.max_attempts =>
                    {
                        let delay = retry_after.unwrap_or(self.default_retry_delay);
                        warn!(
                            "{}: rate limited, retrying in {:?} (attempt {}/{})",
                            request.label, delay, attempts, self.max_attempts
                        );
                        sleep(delay).await;
                    }
                    Err(err @ SyncError::Permanent(_)) => {
                        debug!("{}: permanent error, not retrying", request.label);
                        break Err(err);
                    }
                    Err(err) if attempts < self.max_attempts => {
                        warn!(
                            "{}: {} (attempt {}/{})",
                            request.label, err, attempts, self.max_attempts
                        );
                        self.limiter.report_failure().await;
                    }
                    Err(err) => break Err(err),
                }
            };

            outcomes.push(RequestOutcome {
                label: request.label,
                attempts,
                result,
            });
        }

        outcomes
    }
}
