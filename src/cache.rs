//! Freshness-class cache for collected data.
//!
//! A process-local fingerprint → value store. Fingerprints are stable within
//! a process run for identical `(operation, device, category, params)`
//! inputs; entries expire by TTL and expired reads miss. No size-based
//! eviction: the working set is bounded by the command catalog × fleet size.

use std::collections::BTreeMap;
use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

/// A single cached value with its freshness envelope
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached payload
    pub value: Value,
    /// Insertion time
    pub created_at: DateTime<Utc>,
    /// Time-to-live in seconds
    pub ttl_seconds: u64,
    /// The fingerprint this entry is stored under
    pub fingerprint: String,
    /// Operation name, kept for targeted invalidation
    pub operation: String,
    /// Device the data belongs to
    pub device_id: String,
    /// Data category, kept for category-wide invalidation
    pub category: String,
    /// Free-form entry metadata (operation id, execution time)
    pub metadata: Value,
}

impl CacheEntry {
    /// True once the entry has outlived its TTL
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let ttl = ChronoDuration::seconds(i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX));
        now > self.created_at + ttl
    }
}

/// Hit/miss counters exposed through the collector's statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered from the store
    pub hits: u64,
    /// Reads that fell through (absent, expired, or forced fresh)
    pub misses: u64,
    /// Live entry count at snapshot time
    pub entries: usize,
}

impl CacheStats {
    /// Hit ratio in `[0, 1]`; 0 when no reads happened yet
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Process-local keyed store with TTL and targeted invalidation
#[derive(Debug, Default)]
pub struct CacheManager {
    entries: RwLock<HashMap<String, CacheEntry>>,
    stats: RwLock<CacheStats>,
}

impl CacheManager {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable fingerprint for a cache slot.
    ///
    /// Params arrive in a `BTreeMap`, so iteration order is already the
    /// canonical sorted-key order the fingerprint contract requires.
    #[must_use]
    pub fn fingerprint(
        operation: &str,
        device_id: &str,
        category: &str,
        additional_params: &BTreeMap<String, String>,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(operation.as_bytes());
        hasher.update([0u8]);
        hasher.update(device_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(category.as_bytes());
        for (key, value) in additional_params {
            hasher.update([0u8]);
            hasher.update(key.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Look up a value. Misses when absent, expired, or `force_fresh`.
    ///
    /// A `true` hit flag guarantees the returned value is non-null and
    /// satisfied its TTL at the moment of return.
    pub async fn get(
        &self,
        operation: &str,
        device_id: &str,
        category: &str,
        additional_params: &BTreeMap<String, String>,
        force_fresh: bool,
    ) -> (Option<Value>, bool) {
        let fingerprint = Self::fingerprint(operation, device_id, category, additional_params);

        if force_fresh {
            self.stats.write().await.misses += 1;
            return (None, false);
        }

        let hit = {
            let entries = self.entries.read().await;
            entries
                .get(&fingerprint)
                .filter(|e| !e.is_expired())
                .map(|e| e.value.clone())
        };

        let mut stats = self.stats.write().await;
        match hit {
            Some(value) => {
                stats.hits += 1;
                (Some(value), true)
            }
            None => {
                stats.misses += 1;
                (None, false)
            }
        }
    }

    /// Store a value, overwriting any previous entry. A zero TTL is a no-op.
    #[allow(clippy::too_many_arguments)]
    pub async fn set(
        &self,
        operation: &str,
        device_id: &str,
        value: Value,
        category: &str,
        additional_params: &BTreeMap<String, String>,
        ttl_seconds: u64,
        metadata: Value,
    ) {
        if ttl_seconds == 0 {
            return;
        }
        let fingerprint = Self::fingerprint(operation, device_id, category, additional_params);
        let entry = CacheEntry {
            value,
            created_at: Utc::now(),
            ttl_seconds,
            fingerprint: fingerprint.clone(),
            operation: operation.to_string(),
            device_id: device_id.to_string(),
            category: category.to_string(),
            metadata,
        };
        self.entries.write().await.insert(fingerprint, entry);
    }

    /// Remove all entries for one operation on one device
    pub async fn invalidate(&self, operation: &str, device_id: &str) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !(e.operation == operation && e.device_id == device_id));
        entries.len() < before
    }

    /// Remove all entries for one device; returns the count removed
    pub async fn invalidate_device(&self, device_id: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.device_id != device_id);
        before - entries.len()
    }

    /// Remove all entries in one category; returns the count removed
    pub async fn invalidate_by_type(&self, category: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.category != category);
        before - entries.len()
    }

    /// Drop everything; returns the count removed
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        count
    }

    /// Counter snapshot including the live entry count
    pub async fn stats(&self) -> CacheStats {
        let mut stats = *self.stats.read().await;
        stats.entries = self.entries.read().await.len();
        stats
    }
}
