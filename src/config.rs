//! Configuration for leadsync.
//!
//! Settings come from an optional `leadsync.toml` next to the working
//! directory (or an explicit `--config` path), merged over built-in
//! defaults. Service entries override the preset limit profiles per field.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::keys::DEFAULT_MAX_CACHE_SIZE;
use crate::rate_limit::ServiceLimits;

/// Default config file name.
pub const CONFIG_FILE: &str = "leadsync.toml";

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub keys: KeySettings,
    /// Per-service limit overrides, keyed by service name.
    #[serde(default)]
    pub services: HashMap<String, ServiceLimitsOverride>,
}

/// Bulk-run options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub stop_on_error: bool,
}

fn default_max_retries() -> u32 {
    3
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            stop_on_error: false,
        }
    }
}

/// Key-generator options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySettings {
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,
}

fn default_max_cache_size() -> usize {
    DEFAULT_MAX_CACHE_SIZE
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            max_cache_size: default_max_cache_size(),
        }
    }
}

/// Partial override of a service's limit profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceLimitsOverride {
    pub requests_per_second: Option<u32>,
    pub max_batch_size: Option<usize>,
    pub min_batch_size: Option<usize>,
    pub backoff_multiplier: Option<f64>,
    pub window_ms: Option<u64>,
}

impl ServiceLimitsOverride {
    /// Apply this override on top of a base profile.
    pub fn apply(&self, mut base: ServiceLimits) -> ServiceLimits {
        if let Some(v) = self.requests_per_second {
            base.requests_per_second = v;
        }
        if let Some(v) = self.max_batch_size {
            base.max_batch_size = v;
        }
        if let Some(v) = self.min_batch_size {
            base.min_batch_size = v;
        }
        if let Some(v) = self.backoff_multiplier {
            base.backoff_multiplier = v;
        }
        if let Some(v) = self.window_ms {
            base.window_ms = v;
        }
        base
    }
}

impl Settings {
    /// Load settings from the given path, or `leadsync.toml` when absent.
    ///
    /// A missing file yields defaults; a malformed file is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(CONFIG_FILE));
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&raw)?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Effective limits for a service: preset profile plus any override.
    pub fn limits_for(&self, service: &str) -> ServiceLimits {
        let base = ServiceLimits::for_service(service);
        match self.services.get(service) {
            Some(overrides) => overrides.apply(base),
            None => base,
        }
    }

    /// All per-service overrides resolved into full limit profiles.
    pub fn resolved_overrides(&self) -> HashMap<String, ServiceLimits> {
        self.services
            .iter()
            .map(|(name, overrides)| {
                (
                    name.clone(),
                    overrides.apply(ServiceLimits::for_service(name)),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::load(Some(Path::new("/nonexistent/leadsync.toml"))).unwrap();
        assert_eq!(settings.sync.max_retries, 3);
        assert!(!settings.sync.stop_on_error);
        assert_eq!(settings.keys.max_cache_size, DEFAULT_MAX_CACHE_SIZE);
    }

    #[test]
    fn test_load_and_merge_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[sync]
max_retries = 5

[services.lemlist]
requests_per_second = 2
max_batch_size = 10
"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.sync.max_retries, 5);

        let limits = settings.limits_for("lemlist");
        assert_eq!(limits.requests_per_second, 2);
        assert_eq!(limits.max_batch_size, 10);
        // Untouched fields keep preset values.
        assert_eq!(limits.backoff_multiplier, 2.0);

        // Services without overrides keep their presets.
        let hubspot = settings.limits_for("hubspot");
        assert_eq!(hubspot.requests_per_second, 5);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not [valid toml").unwrap();
        assert!(Settings::load(Some(file.path())).is_err());
    }
}
