//! Exponential backoff driven by consecutive error counts.

use std::time::Duration;

/// Base delay applied on the first consecutive error (milliseconds).
const BASE_DELAY_MS: u64 = 1_000;

/// Ceiling for the computed backoff delay (milliseconds).
const MAX_DELAY_MS: u64 = 30_000;

/// Exponential backoff controller.
///
/// The delay grows as `base * multiplier^(errors - 1)` up to a fixed cap and
/// resets to zero on any success. The token limiter sleeps this delay before
/// every acquisition attempt, so backoff composes with rate limiting rather
/// than replacing it.
#[derive(Debug, Clone)]
pub struct BackoffController {
    multiplier: f64,
    consecutive_errors: u32,
    current_delay: Duration,
}

impl BackoffController {
    /// Create a controller with the given per-service multiplier.
    pub fn new(multiplier: f64) -> Self {
        Self {
            multiplier,
            consecutive_errors: 0,
            current_delay: Duration::ZERO,
        }
    }

    /// Reset after a successful call.
    pub fn on_success(&mut self) {
        self.consecutive_errors = 0;
        self.current_delay = Duration::ZERO;
    }

    /// Escalate after a failed call. Returns the new delay.
    pub fn on_failure(&mut self) -> Duration {
        self.consecutive_errors += 1;
        let exponent = self.consecutive_errors.saturating_sub(1);
        let delay_ms = BASE_DELAY_MS as f64 * self.multiplier.powi(exponent as i32);
        self.current_delay = Duration::from_millis((delay_ms as u64).min(MAX_DELAY_MS));
        self.current_delay
    }

    /// The delay to apply before the next attempt.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// Failures since the last success.
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }
}
