//! Adaptive per-service rate limiting.
//!
//! Token-bucket pacing with server feedback: explicit `Retry-After`
//! directives win over everything, exponential backoff composes in front of
//! acquisition, and `X-RateLimit-*` headers clamp the local bucket.

mod backoff;
mod feedback;
mod presets;
mod state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

pub use backoff::BackoffController;
pub use feedback::RateLimitFeedback;
pub use presets::{ServiceLimits, DEFAULT_MIN_BATCH_SIZE, DEFAULT_WINDOW_MS};
pub use state::RateState;

/// Mutable limiter state. One lock guards the refill/consume sequence.
#[derive(Debug)]
struct LimiterInner {
    state: RateState,
    backoff: BackoffController,
}

/// Token-bucket rate limiter for one external service.
///
/// Handles are cheap to clone and share the same underlying state. All
/// waiting happens with the lock released, so concurrent callers suspend
/// rather than serialize behind a held mutex.
#[derive(Debug, Clone)]
pub struct TokenLimiter {
    service: String,
    limits: ServiceLimits,
    inner: Arc<Mutex<LimiterInner>>,
}

/// Point-in-time view of limiter state.
#[derive(Debug, Clone)]
pub struct LimiterStatus {
    pub service: String,
    pub tokens: f64,
    pub max_requests: u32,
    pub consecutive_errors: u32,
    pub backoff_delay: Duration,
    pub retry_after_remaining: Option<Duration>,
}

impl TokenLimiter {
    /// Create a limiter using the preset profile for `service`.
    pub fn new(service: &str) -> Self {
        Self::with_limits(service, ServiceLimits::for_service(service))
    }

    /// Create a limiter with explicit limits.
    pub fn with_limits(service: &str, limits: ServiceLimits) -> Self {
        let inner = LimiterInner {
            state: RateState::new(limits.requests_per_second, limits.window()),
            backoff: BackoffController::new(limits.backoff_multiplier),
        };
        Self {
            service: service.to_string(),
            limits,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// The service this limiter paces.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The limits this limiter was built with.
    pub fn limits(&self) -> &ServiceLimits {
        &self.limits
    }

    /// Suspend until a request may proceed, then consume one token.
    ///
    /// Order matters: an explicit server retry deadline wins over
    /// everything, then any backoff delay, then token availability.
    pub async fn acquire(&self) {
        // Explicit server directive first.
        loop {
            let deadline = {
                let mut inner = self.inner.lock().await;
                let now = Instant::now();
                match inner.state.retry_after_deadline(now) {
                    Some(deadline) => Some(deadline),
                    None => {
                        inner.state.clear_retry_after();
                        None
                    }
                }
            };
            match deadline {
                Some(deadline) => {
                    debug!(
                        "{}: honoring Retry-After for {:?}",
                        self.service,
                        deadline.saturating_duration_since(Instant::now())
                    );
                    sleep_until(deadline).await;
                }
                None => break,
            }
        }

        // Backoff delay from recent failures.
        let backoff_delay = {
            let inner = self.inner.lock().await;
            inner.backoff.current_delay()
        };
        if !backoff_delay.is_zero() {
            debug!("{}: backing off {:?}", self.service, backoff_delay);
            sleep(backoff_delay).await;
        }

        // Token consumption; each pass waits to a refill boundary.
        loop {
            let wait = {
                let mut inner = self.inner.lock().await;
                let now = Instant::now();
                inner.state.refill(now);
                if inner.state.try_consume() {
                    return;
                }
                inner.state.time_until_refill(now)
            };
            debug!("{}: bucket empty, waiting {:?}", self.service, wait);
            sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// Fold response headers into the bucket state.
    pub async fn observe(&self, headers: &HashMap<String, String>) {
        let feedback = RateLimitFeedback::from_headers(headers);
        if feedback.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().await;
        inner.state.apply_feedback(&feedback, Instant::now());
    }

    /// Apply an explicit retry delay (e.g. from a 429 without headers).
    pub async fn apply_retry_after(&self, delay: Duration) {
        let mut inner = self.inner.lock().await;
        inner.state.set_retry_after(delay, Instant::now());
    }

    /// Record a successful call, resetting backoff.
    pub async fn report_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.backoff.on_success();
    }

    /// Record a failed call, escalating backoff.
    pub async fn report_failure(&self) {
        let mut inner = self.inner.lock().await;
        let delay = inner.backoff.on_failure();
        warn!(
            "{}: failure #{}, backoff now {:?}",
            self.service,
            inner.backoff.consecutive_errors(),
            delay
        );
    }

    /// Snapshot the current limiter state.
    pub async fn status(&self) -> LimiterStatus {
        let inner = self.inner.lock().await;
        let now = Instant::now();
        LimiterStatus {
            service: self.service.clone(),
            tokens: inner.state.tokens(),
            max_requests: inner.state.max_requests(),
            consecutive_errors: inner.backoff.consecutive_errors(),
            backoff_delay: inner.backoff.current_delay(),
            retry_after_remaining: inner
                .state
                .retry_after_deadline(now)
                .map(|d| d.saturating_duration_since(now)),
        }
    }
}

/// Shared limiter registry keyed by service name.
///
/// Bulk operations against the same service reuse one limiter, so a new run
/// remembers a recent rate-limit violation instead of immediately
/// re-tripping it.
#[derive(Debug, Clone, Default)]
pub struct ServiceLimiters {
    overrides: HashMap<String, ServiceLimits>,
    limiters: Arc<RwLock<HashMap<String, TokenLimiter>>>,
}

impl ServiceLimiters {
    /// Create an empty registry using preset profiles only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with per-service limit overrides.
    pub fn with_overrides(overrides: HashMap<String, ServiceLimits>) -> Self {
        Self {
            overrides,
            limiters: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get or create the shared limiter for a service.
    pub async fn for_service(&self, service: &str) -> TokenLimiter {
        {
            let limiters = self.limiters.read().await;
            if let Some(limiter) = limiters.get(service) {
                return limiter.clone();
            }
        }

        let mut limiters = self.limiters.write().await;
        limiters
            .entry(service.to_string())
            .or_insert_with(|| {
                let limits = self
                    .overrides
                    .get(service)
                    .cloned()
                    .unwrap_or_else(|| ServiceLimits::for_service(service));
                TokenLimiter::with_limits(service, limits)
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_limits(per_window: u32, window_ms: u64) -> ServiceLimits {
        ServiceLimits {
            requests_per_second: per_window,
            window_ms,
            ..ServiceLimits::default()
        }
    }

    #[tokio::test]
    async fn test_light_load_does_not_suspend() {
        let limiter = TokenLimiter::with_limits("test", fast_limits(10, 1000));

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_heavy_load_waits_a_window() {
        let start = Instant::now();
        let limiter = TokenLimiter::with_limits("test", fast_limits(3, 200));
        for _ in 0..4 {
            limiter.acquire().await;
        }
        // The fourth acquire has to wait for the window to roll over.
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_tokens_stay_in_bounds() {
        let limiter = TokenLimiter::with_limits("test", fast_limits(5, 1000));

        for _ in 0..5 {
            limiter.acquire().await;
            let status = limiter.status().await;
            assert!(status.tokens >= 0.0);
            assert!(status.tokens <= f64::from(status.max_requests));
        }
    }

    #[tokio::test]
    async fn test_observe_clamps_bucket() {
        let limiter = TokenLimiter::with_limits("test", fast_limits(10, 1000));

        let headers: HashMap<String, String> = [
            ("X-RateLimit-Limit".to_string(), "4".to_string()),
            ("X-RateLimit-Remaining".to_string(), "1".to_string()),
        ]
        .into_iter()
        .collect();
        limiter.observe(&headers).await;

        let status = limiter.status().await;
        assert_eq!(status.max_requests, 4);
        assert_eq!(status.tokens, 1.0);
    }

    #[tokio::test]
    async fn test_retry_after_delays_acquire() {
        let limiter = TokenLimiter::with_limits("test", fast_limits(10, 1000));
        limiter.apply_retry_after(Duration::from_millis(150)).await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(150));

        // Deadline is cleared once waited out.
        let status = limiter.status().await;
        assert!(status.retry_after_remaining.is_none());
    }

    #[tokio::test]
    async fn test_registry_reuses_limiters() {
        let registry = ServiceLimiters::new();

        let first = registry.for_service("lemlist").await;
        first.report_failure().await;

        let second = registry.for_service("lemlist").await;
        let status = second.status().await;
        assert_eq!(status.consecutive_errors, 1);
    }

    #[tokio::test]
    async fn test_registry_applies_overrides() {
        let overrides: HashMap<String, ServiceLimits> =
            [("lemlist".to_string(), fast_limits(99, 500))]
                .into_iter()
                .collect();
        let registry = ServiceLimiters::with_overrides(overrides);

        let limiter = registry.for_service("lemlist").await;
        assert_eq!(limiter.limits().requests_per_second, 99);
    }
}
