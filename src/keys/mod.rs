//! Idempotency key generation for synchronized events.
//!
//! Every event destined for storage gets a short, stable, collision-
//! resistant key before it reaches the persistence layer, so reruns and
//! racing callers never store the same event twice. Generation is total:
//! invalid input degrades to a fallback key rather than failing the sync.

mod canonical;
mod platforms;
mod registry;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use canonical::{clean_component, fingerprint, looks_like_email, random_base36, random_hex};
pub use registry::{KeyRecord, KeyRegistry, DEFAULT_MAX_CACHE_SIZE};

/// Metadata keys consulted, in priority order, for a platform-native
/// identifier before one is synthesized.
const IDENTIFIER_METADATA_KEYS: &[&str] = &[
    "activity_id",
    "event_id",
    "id",
    "seq_id",
    "email_campaign_seq_id",
];

/// Identifying fields for one logical event.
#[derive(Debug, Clone, Default)]
pub struct EventKeyFields {
    pub platform: String,
    pub campaign_id: String,
    pub event_type: String,
    pub email: String,
    pub activity_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub namespace: Option<String>,
    pub metadata: Value,
}

/// Generation statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeyStats {
    pub total_generated: u64,
    pub collisions_detected: u64,
    pub fallbacks_used: u64,
    pub invalid_inputs: u64,
    pub registry_size: usize,
}

impl KeyStats {
    /// Collisions per generated key.
    pub fn collision_rate(&self) -> f64 {
        if self.total_generated == 0 {
            0.0
        } else {
            self.collisions_detected as f64 / self.total_generated as f64
        }
    }
}

/// Generates collision-resistant idempotency keys.
///
/// Owned by its caller; there is no process-wide instance. The bounded
/// registry makes collision detection testable per instance and caps
/// memory regardless of run length.
#[derive(Debug)]
pub struct EventKeyGenerator {
    registry: KeyRegistry,
    total_generated: u64,
    collisions_detected: u64,
    fallbacks_used: u64,
    invalid_inputs: u64,
}

impl EventKeyGenerator {
    /// Create a generator with the default registry capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_CACHE_SIZE)
    }

    /// Create a generator retaining at most `max_cache_size` keys.
    pub fn with_capacity(max_cache_size: usize) -> Self {
        Self {
            registry: KeyRegistry::new(max_cache_size),
            total_generated: 0,
            collisions_detected: 0,
            fallbacks_used: 0,
            invalid_inputs: 0,
        }
    }

    /// Generate a key for the event. Total: always returns a usable key.
    ///
    /// Happy path: `{platform}_{campaign}_{event}_{unique_id}_{8 hex}`.
    /// Invalid input degrades to `{platform}_fallback_{ms}_{16 hex}`; a
    /// registry hit appends `_collision_{ms}_{4 base36}`.
    pub fn generate(&mut self, fields: &EventKeyFields) -> String {
        self.total_generated += 1;

        if let Some(reason) = validate(fields) {
            warn!("Invalid key input ({reason}), using fallback key");
            self.invalid_inputs += 1;
            let platform = clean_component(&fields.platform);
            let key = format!(
                "{}_fallback_{}_{}",
                platform,
                Utc::now().timestamp_millis(),
                random_hex(16)
            );
            self.registry
                .register(key.clone(), serde_json::json!({ "fallback": true }));
            return key;
        }

        let platform = clean_component(&fields.platform);
        let campaign_id = clean_component(&fields.campaign_id);
        let event_type = clean_component(&fields.event_type);
        let email = clean_component(&fields.email);

        let unique_id = self.unique_identifier(fields, &email);

        let timestamp_ms = fields
            .timestamp
            .map(|t| Value::from(t.timestamp_millis()))
            .unwrap_or(Value::Null);
        let namespace = fields.namespace.as_deref().unwrap_or("default");

        let mut identity = BTreeMap::new();
        identity.insert("platform", Value::from(platform.as_str()));
        identity.insert("campaign_id", Value::from(campaign_id.as_str()));
        identity.insert("event_type", Value::from(event_type.as_str()));
        identity.insert("email", Value::from(email.as_str()));
        identity.insert("unique_id", Value::from(unique_id.as_str()));
        identity.insert("timestamp_ms", timestamp_ms);
        identity.insert("namespace", Value::from(namespace));

        let key = format!(
            "{}_{}_{}_{}_{}",
            platform,
            campaign_id,
            event_type,
            unique_id,
            fingerprint(&identity)
        );

        if self.registry.contains(&key) {
            self.collisions_detected += 1;
            let variant = format!(
                "{}_collision_{}_{}",
                key,
                Utc::now().timestamp_millis(),
                random_base36(4)
            );
            debug!("Key collision on {key}, issuing {variant}");
            self.registry.register(
                variant.clone(),
                serde_json::json!({ "collision": true, "original": key }),
            );
            return variant;
        }

        self.registry.register(key.clone(), Value::Null);
        key
    }

    /// Resolve the event's unique identifier component.
    ///
    /// Priority: explicit activity id, then platform-native ids from
    /// metadata, then a synthesized identifier (counted as a fallback).
    fn unique_identifier(&mut self, fields: &EventKeyFields, clean_email: &str) -> String {
        if let Some(activity_id) = fields
            .activity_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
        {
            return clean_component(activity_id);
        }

        if let Some(map) = fields.metadata.as_object() {
            for name in IDENTIFIER_METADATA_KEYS {
                match map.get(*name) {
                    Some(Value::String(s)) if !s.trim().is_empty() => {
                        return clean_component(s);
                    }
                    Some(Value::Number(n)) => {
                        return clean_component(&n.to_string());
                    }
                    _ => {}
                }
            }
        }

        self.fallbacks_used += 1;
        let timestamp_ms = fields
            .timestamp
            .map(|t| t.timestamp_millis())
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        format!("{}{}{}", clean_email, timestamp_ms, random_base36(6))
    }

    /// Current generation statistics.
    pub fn stats(&self) -> KeyStats {
        KeyStats {
            total_generated: self.total_generated,
            collisions_detected: self.collisions_detected,
            fallbacks_used: self.fallbacks_used,
            invalid_inputs: self.invalid_inputs,
            registry_size: self.registry.len(),
        }
    }

    /// The bounded registry backing collision detection.
    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }
}

impl Default for EventKeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Check required fields, returning a description of the first problem.
fn validate(fields: &EventKeyFields) -> Option<&'static str> {
    if fields.platform.trim().is_empty() {
        return Some("missing platform");
    }
    if fields.campaign_id.trim().is_empty() {
        return Some("missing campaign_id");
    }
    if fields.event_type.trim().is_empty() {
        return Some("missing event_type");
    }
    if fields.email.trim().is_empty() {
        return Some("missing email");
    }
    if !looks_like_email(&fields.email) {
        return Some("malformed email");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> EventKeyFields {
        EventKeyFields {
            platform: "lemlist".to_string(),
            campaign_id: "camp-678".to_string(),
            event_type: "emailsSent".to_string(),
            email: "a@b.com".to_string(),
            activity_id: Some("act1".to_string()),
            ..EventKeyFields::default()
        }
    }

    #[test]
    fn test_happy_path_format() {
        let mut generator = EventKeyGenerator::new();
        let key = generator.generate(&fields());

        let parts: Vec<&str> = key.split('_').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], "lemlist");
        assert_eq!(parts[1], "camp678");
        assert_eq!(parts[2], "emailssent");
        assert_eq!(parts[3], "act1");
        assert_eq!(parts[4].len(), 8);
        assert!(parts[4].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_duplicate_generates_collision_variant() {
        let mut generator = EventKeyGenerator::new();
        let first = generator.generate(&fields());
        let second = generator.generate(&fields());

        assert_ne!(first, second);
        assert!(second.starts_with(&format!("{first}_collision_")));
        assert_eq!(generator.stats().collisions_detected, 1);
    }

    #[test]
    fn test_missing_fields_fall_back() {
        let mut generator = EventKeyGenerator::new();
        let key = generator.generate(&EventKeyFields {
            platform: "lemlist".to_string(),
            ..EventKeyFields::default()
        });

        let parts: Vec<&str> = key.splitn(3, '_').collect();
        assert_eq!(parts[0], "lemlist");
        assert_eq!(parts[1], "fallback");
        assert_eq!(generator.stats().invalid_inputs, 1);

        // Suffix is {ms}_{16 hex}.
        let suffix: Vec<&str> = parts[2].split('_').collect();
        assert_eq!(suffix.len(), 2);
        assert!(suffix[0].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(suffix[1].len(), 16);
        assert!(suffix[1].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_malformed_email_falls_back() {
        let mut generator = EventKeyGenerator::new();
        let key = generator.generate(&EventKeyFields {
            email: "not-an-email".to_string(),
            ..fields()
        });

        assert!(key.contains("_fallback_"));
        assert_eq!(generator.stats().invalid_inputs, 1);
    }

    #[test]
    fn test_metadata_identifier_priority() {
        let mut generator = EventKeyGenerator::new();
        let key = generator.generate(&EventKeyFields {
            activity_id: None,
            metadata: serde_json::json!({
                "id": "low-priority",
                "event_id": "evt-42"
            }),
            ..fields()
        });

        // event_id outranks id.
        assert!(key.contains("_evt42_"));
        assert_eq!(generator.stats().fallbacks_used, 0);
    }

    #[test]
    fn test_synthesized_identifier_counts_fallback() {
        let mut generator = EventKeyGenerator::new();
        let key = generator.generate(&EventKeyFields {
            activity_id: None,
            ..fields()
        });

        // Still primary format, just with a synthesized identifier.
        assert!(!key.contains("_fallback_"));
        assert_eq!(generator.stats().fallbacks_used, 1);
        assert_eq!(generator.stats().invalid_inputs, 0);
    }

    #[test]
    fn test_registry_eviction_forgets_old_keys() {
        let mut generator = EventKeyGenerator::with_capacity(5);

        let first = generator.generate(&fields());
        for i in 0..5 {
            generator.generate(&EventKeyFields {
                activity_id: Some(format!("act-{i}")),
                ..fields()
            });
        }

        // The first key was evicted, so regenerating it is not a collision.
        let again = generator.generate(&fields());
        assert_eq!(first, again);
        assert_eq!(generator.stats().collisions_detected, 0);
    }

    #[test]
    fn test_stats_accumulate() {
        let mut generator = EventKeyGenerator::new();
        generator.generate(&fields());
        generator.generate(&fields());
        generator.generate(&EventKeyFields::default());

        let stats = generator.stats();
        assert_eq!(stats.total_generated, 3);
        assert_eq!(stats.collisions_detected, 1);
        assert_eq!(stats.invalid_inputs, 1);
        assert!(stats.collision_rate() > 0.3);
        assert_eq!(stats.registry_size, 3);
    }
}
