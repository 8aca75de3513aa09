//! Bounded in-memory registry of recently generated keys.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Default registry capacity.
pub const DEFAULT_MAX_CACHE_SIZE: usize = 10_000;

/// One registered key.
#[derive(Debug, Clone)]
pub struct KeyRecord {
    pub registered_at: DateTime<Utc>,
    pub metadata: Value,
}

/// Insertion-ordered bounded key set.
///
/// Membership here is the sole collision oracle: it knows nothing about the
/// real persisted store, so it only catches collisions within its own
/// retention window. The downstream store's uniqueness constraint remains
/// the dedup authority; this registry just cuts duplicate-key churn within
/// a run. O(1) insert, membership test, and eviction.
#[derive(Debug)]
pub struct KeyRegistry {
    capacity: usize,
    order: VecDeque<String>,
    entries: HashMap<String, KeyRecord>,
}

impl KeyRegistry {
    /// Create a registry evicting FIFO past `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Whether `key` is still within the retention window.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Record a key, evicting the oldest entry when full.
    pub fn register(&mut self, key: String, metadata: Value) {
        if self.entries.contains_key(&key) {
            // Refresh metadata without duplicating the order entry.
            if let Some(record) = self.entries.get_mut(&key) {
                record.registered_at = Utc::now();
                record.metadata = metadata;
            }
            return;
        }

        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }

        self.order.push_back(key.clone());
        self.entries.insert(
            key,
            KeyRecord {
                registered_at: Utc::now(),
                metadata,
            },
        );
    }

    /// Look up a registered key's record.
    pub fn get(&self, key: &str) -> Option<&KeyRecord> {
        self.entries.get(key)
    }

    /// Number of retained keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
