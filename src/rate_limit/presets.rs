//! Built-in per-service rate and batch limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default minimum batch size shared by every profile.
pub const DEFAULT_MIN_BATCH_SIZE: usize = 5;

/// Default refill window (milliseconds).
pub const DEFAULT_WINDOW_MS: u64 = 1_000;

/// Rate and batch limits for one external service.
///
/// Presets are tunable defaults, not contracts: explicit configuration
/// overrides them per field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceLimits {
    /// Requests allowed per refill window.
    pub requests_per_second: u32,
    /// Upper bound for the adaptive batch size.
    pub max_batch_size: usize,
    /// Lower bound for the adaptive batch size.
    #[serde(default = "default_min_batch_size")]
    pub min_batch_size: usize,
    /// Multiplier for exponential backoff after consecutive failures.
    pub backoff_multiplier: f64,
    /// Refill window length in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_min_batch_size() -> usize {
    DEFAULT_MIN_BATCH_SIZE
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            max_batch_size: 50,
            min_batch_size: DEFAULT_MIN_BATCH_SIZE,
            backoff_multiplier: 2.0,
            window_ms: DEFAULT_WINDOW_MS,
        }
    }
}

impl ServiceLimits {
    /// Look up the preset profile for a service name.
    ///
    /// Unrecognized names get the generic default profile.
    pub fn for_service(name: &str) -> Self {
        match name {
            "smartlead" => Self {
                requests_per_second: 10,
                max_batch_size: 100,
                backoff_multiplier: 2.0,
                ..Self::default()
            },
            "lemlist" => Self {
                requests_per_second: 10,
                max_batch_size: 50,
                backoff_multiplier: 2.0,
                ..Self::default()
            },
            "hubspot" => Self {
                requests_per_second: 5,
                max_batch_size: 25,
                backoff_multiplier: 3.0,
                ..Self::default()
            },
            "segment" => Self {
                requests_per_second: 50,
                max_batch_size: 200,
                backoff_multiplier: 2.0,
                ..Self::default()
            },
            "clickhouse" => Self {
                requests_per_second: 100,
                max_batch_size: 500,
                backoff_multiplier: 1.5,
                ..Self::default()
            },
            _ => Self::default(),
        }
    }

    /// Names of all services with a built-in profile.
    pub fn known_services() -> &'static [&'static str] {
        &["smartlead", "lemlist", "hubspot", "segment", "clickhouse"]
    }

    /// The refill window as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}
