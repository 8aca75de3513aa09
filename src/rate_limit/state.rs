//! Token-bucket state for a single service.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::feedback::RateLimitFeedback;

/// Token-bucket state for one external service.
///
/// Tokens refill in whole-window increments: after each full window elapses,
/// the bucket is topped back up to `max_requests`. Server feedback only ever
/// clamps the bucket downward.
#[derive(Debug, Clone)]
pub struct RateState {
    /// Requests allowed per window. Clamped down by `X-RateLimit-Limit`.
    max_requests: u32,
    /// Tokens currently available. Always within `[0, max_requests]`.
    tokens: f64,
    /// Start of the current refill window.
    window_started_at: Instant,
    /// Window length (1s by default).
    window: Duration,
    /// Explicit `Retry-After` deadline from the server.
    server_retry_after: Option<Instant>,
    /// Server-advertised window reset time, if known.
    server_reset_at: Option<Instant>,
    /// Server-advertised remaining budget, if known.
    server_remaining: Option<u32>,
}

impl RateState {
    /// Create a full bucket for the given per-window budget.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            tokens: f64::from(max_requests),
            window_started_at: Instant::now(),
            window,
            server_retry_after: None,
            server_reset_at: None,
            server_remaining: None,
        }
    }

    /// Tokens currently available.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Current per-window budget.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// The server's explicit retry deadline, if still in the future.
    pub fn retry_after_deadline(&self, now: Instant) -> Option<Instant> {
        match self.server_retry_after {
            Some(deadline) if deadline > now => Some(deadline),
            _ => None,
        }
    }

    /// Clear the server retry deadline once it has been waited out.
    pub fn clear_retry_after(&mut self) {
        self.server_retry_after = None;
    }

    /// Top the bucket up for every full window that has elapsed.
    ///
    /// A server-advertised reset takes precedence over local window
    /// arithmetic: once it passes, the bucket refills completely.
    pub fn refill(&mut self, now: Instant) {
        if let Some(reset_at) = self.server_reset_at {
            if now >= reset_at {
                self.tokens = f64::from(self.max_requests);
                self.server_reset_at = None;
                self.server_remaining = None;
                self.window_started_at = now;
                return;
            }
        }

        let elapsed = now.duration_since(self.window_started_at);
        if elapsed >= self.window {
            let windows = (elapsed.as_millis() / self.window.as_millis().max(1)) as u32;
            self.tokens = (self.tokens + f64::from(windows) * f64::from(self.max_requests))
                .min(f64::from(self.max_requests));
            self.window_started_at += self.window * windows;
        }
    }

    /// Consume one token if available.
    pub fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// How long until the next refill boundary.
    ///
    /// Prefers the server-advertised reset when known, otherwise the end of
    /// the current local window.
    pub fn time_until_refill(&self, now: Instant) -> Duration {
        if let Some(reset_at) = self.server_reset_at {
            return reset_at.saturating_duration_since(now);
        }
        let window_end = self.window_started_at + self.window;
        window_end.saturating_duration_since(now)
    }

    /// Fold server response feedback into the bucket.
    pub fn apply_feedback(&mut self, feedback: &RateLimitFeedback, now: Instant) {
        if let Some(retry_after) = feedback.retry_after {
            self.server_retry_after = Some(now + retry_after);
        }

        if let Some(limit) = feedback.limit {
            // Only ever clamp downward; a zero limit would deadlock acquire.
            let clamped = limit.max(1);
            if clamped < self.max_requests {
                debug!(
                    "Server limit {} below configured {}, clamping",
                    clamped, self.max_requests
                );
                self.max_requests = clamped;
            }
            self.tokens = self.tokens.min(f64::from(self.max_requests));
        }

        if let Some(remaining) = feedback.remaining {
            self.server_remaining = Some(remaining);
            self.tokens = self.tokens.min(f64::from(remaining));
        }

        if let Some(reset_at) = feedback.reset_at {
            let wall_now = chrono::Utc::now();
            if reset_at > wall_now {
                let until_reset = (reset_at - wall_now)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                self.server_reset_at = Some(now + until_reset);
            } else {
                warn!("Server reset time {} already passed, ignoring", reset_at);
            }
        }
    }

    /// Force an explicit retry deadline (e.g. from a 429 response body).
    pub fn set_retry_after(&mut self, delay: Duration, now: Instant) {
        self.server_retry_after = Some(now + delay);
    }
}
