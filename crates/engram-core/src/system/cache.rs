//! Cache Memory - TTL + LRU system cache
//!
//! Bounded LRU with per-entry expiry. `get` promotes to most-recently-used
//! and deletes on expiry; inserting past capacity evicts the
//! least-recently-accessed entry.

use std::num::NonZeroUsize;

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde_json::Value;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

/// Process-wide TTL + LRU cache
pub struct CacheMemory {
    cache: LruCache<String, CacheEntry>,
    default_ttl_seconds: i64,
}

impl CacheMemory {
    /// `max_size` bounds entry count; `default_ttl_seconds` applies when
    /// `set` is called without an explicit TTL (0 = no expiry).
    pub fn new(max_size: usize, default_ttl_seconds: i64) -> Self {
        let capacity = NonZeroUsize::new(max_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            default_ttl_seconds,
        }
    }

    /// Store a value, stamping `expires_at` from the TTL. Eviction of the
    /// least-recently-used entry happens automatically past capacity.
    pub fn set(&mut self, key: impl Into<String>, value: Value, ttl_seconds: Option<i64>) {
        let ttl = ttl_seconds.unwrap_or(self.default_ttl_seconds);
        let now = Utc::now();
        let entry = CacheEntry {
            value,
            created_at: now,
            expires_at: (ttl > 0).then(|| now + Duration::seconds(ttl)),
        };
        self.cache.put(key.into(), entry);
    }

    /// Fetch a value. Expired entries are deleted and report as absent;
    /// a hit moves the entry to most-recently-used.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let expired = match self.cache.get(key) {
            Some(entry) => entry.expires_at.map(|t| Utc::now() > t).unwrap_or(false),
            None => return None,
        };
        if expired {
            self.cache.pop(key);
            return None;
        }
        self.cache.get(key).map(|entry| entry.value.clone())
    }

    /// Fetch with a default for absent or expired keys
    pub fn get_or(&mut self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Whether the key is present and not expired
    pub fn has(&mut self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn delete(&mut self, key: &str) {
        self.cache.pop(key);
    }

    /// Sweep every expired entry
    pub fn cleanup_expired(&mut self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .cache
            .iter()
            .filter(|(_, entry)| entry.expires_at.map(|t| now > t).unwrap_or(false))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.cache.pop(key);
        }
        expired.len()
    }

    pub fn size(&self) -> usize {
        self.cache.len()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Age of an entry, diagnostics only
    pub fn age_of(&self, key: &str) -> Option<chrono::TimeDelta> {
        self.cache.peek(key).map(|entry| Utc::now() - entry.created_at)
    }
}

impl Default for CacheMemory {
    fn default() -> Self {
        Self::new(1000, 3600)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_roundtrip() {
        let mut cache = CacheMemory::new(10, 3600);
        cache.set("k", json!({"a": 1}), None);
        assert_eq!(cache.get("k"), Some(json!({"a": 1})));
        assert_eq!(cache.get_or("missing", json!("fallback")), json!("fallback"));
    }

    #[test]
    fn test_expired_entry_is_deleted_on_get() {
        let mut cache = CacheMemory::new(10, 3600);
        // Negative TTL: already expired at insert time
        cache.set("gone", json!(1), Some(-1));
        assert_eq!(cache.get("gone"), None);
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let mut cache = CacheMemory::new(10, 0);
        cache.set("forever", json!(1), None);
        assert!(cache.has("forever"));
        assert_eq!(cache.cleanup_expired(), 0);
    }

    #[test]
    fn test_lru_eviction_prefers_least_recently_accessed() {
        let mut cache = CacheMemory::new(2, 3600);
        cache.set("a", json!(1), None);
        cache.set("b", json!(2), None);

        // Touch "a" so "b" is the LRU entry
        assert!(cache.has("a"));
        cache.set("c", json!(3), None);

        assert!(cache.has("a"));
        assert!(!cache.has("b"));
        assert!(cache.has("c"));
    }

    #[test]
    fn test_cleanup_expired_sweeps_only_expired() {
        let mut cache = CacheMemory::new(10, 3600);
        cache.set("live", json!(1), Some(3600));
        cache.set("dead1", json!(2), Some(-1));
        cache.set("dead2", json!(3), Some(-5));

        assert_eq!(cache.cleanup_expired(), 2);
        assert_eq!(cache.size(), 1);
        assert!(cache.has("live"));
    }
}
