//! TTL key/value cache for computed metric payloads.
//!
//! The store knows nothing about metrics: it holds serialized JSON payloads
//! under string keys with explicit expiry. Expiry is checked on every read,
//! so an expired-but-not-yet-swept entry behaves as a miss. Single-flight
//! coordination is the service's responsibility, not the cache's.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Default entry lifetime: 15 minutes.
pub const DEFAULT_TTL_SECONDS: i64 = 900;

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: serde_json::Value,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(payload: serde_json::Value, ttl_seconds: i64) -> Self {
        Self {
            payload,
            expires_at: Utc::now() + Duration::seconds(ttl_seconds),
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[derive(Debug)]
pub struct CacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    default_ttl_seconds: i64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStore {
    pub fn new(default_ttl_seconds: i64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl_seconds,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.payload.clone())
            }
            Some(_) => {
                entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key, "evicted expired cache entry on read");
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn set(&self, key: &str, payload: serde_json::Value, ttl_seconds: i64) {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), CacheEntry::new(payload, ttl_seconds));
    }

    pub async fn set_default(&self, key: &str, payload: serde_json::Value) {
        self.set(key, payload, self.default_ttl_seconds).await;
    }

    /// Remove entries matching `pattern`: an exact key, or a trailing-`*`
    /// prefix form such as `metrics:*`. Returns the number removed.
    pub async fn invalidate(&self, pattern: &str) -> usize {
        let mut entries = self.entries.write().await;
        let removed = match pattern.strip_suffix('*') {
            Some(prefix) => {
                let before = entries.len();
                entries.retain(|key, _| !key.starts_with(prefix));
                before - entries.len()
            }
            None => usize::from(entries.remove(pattern).is_some()),
        };
        if removed > 0 {
            info!(pattern, removed, "invalidated cache entries");
        }
        removed
    }

    /// Sweep expired entries. Returns the number removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "swept expired cache entries");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_returns_payload_unchanged() {
        let cache = CacheStore::new(DEFAULT_TTL_SECONDS);
        let payload = json!({"value": 20.0, "unit": "percentage"});

        cache.set("metrics:revenue_growth", payload.clone(), 60).await;
        let fetched = cache.get("metrics:revenue_growth").await.unwrap();
        assert_eq!(fetched, payload);
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss_and_is_removed() {
        let cache = CacheStore::new(DEFAULT_TTL_SECONDS);
        cache.set("metrics:ndr", json!(105.0), 0).await;

        assert!(cache.get("metrics:ndr").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn missing_key_is_a_miss() {
        let cache = CacheStore::new(DEFAULT_TTL_SECONDS);
        assert!(cache.get("metrics:absent").await.is_none());
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn exact_invalidation_removes_only_that_key() {
        let cache = CacheStore::new(DEFAULT_TTL_SECONDS);
        cache.set_default("metrics:a", json!(1)).await;
        cache.set_default("metrics:b", json!(2)).await;

        assert_eq!(cache.invalidate("metrics:a").await, 1);
        assert!(cache.get("metrics:a").await.is_none());
        assert!(cache.get("metrics:b").await.is_some());
    }

    #[tokio::test]
    async fn prefix_invalidation_purges_matching_keys() {
        let cache = CacheStore::new(DEFAULT_TTL_SECONDS);
        cache.set_default("metrics:a", json!(1)).await;
        cache.set_default("metrics:b", json!(2)).await;
        cache.set_default("other:c", json!(3)).await;

        assert_eq!(cache.invalidate("metrics:*").await, 2);
        assert!(cache.get("metrics:a").await.is_none());
        assert!(cache.get("metrics:b").await.is_none());
        assert!(cache.get("other:c").await.is_some());
    }

    #[tokio::test]
    async fn invalidating_absent_key_removes_nothing() {
        let cache = CacheStore::new(DEFAULT_TTL_SECONDS);
        assert_eq!(cache.invalidate("metrics:absent").await, 0);
        assert_eq!(cache.invalidate("metrics:*").await, 0);
    }

    #[tokio::test]
    async fn cleanup_sweeps_only_expired_entries() {
        let cache = CacheStore::new(DEFAULT_TTL_SECONDS);
        cache.set("metrics:stale", json!(1), 0).await;
        cache.set("metrics:fresh", json!(2), 600).await;

        assert_eq!(cache.cleanup_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("metrics:fresh").await.is_some());
    }

    #[tokio::test]
    async fn hit_and_miss_counters_track_reads() {
        let cache = CacheStore::new(DEFAULT_TTL_SECONDS);
        cache.set_default("metrics:x", json!(1)).await;

        cache.get("metrics:x").await;
        cache.get("metrics:x").await;
        cache.get("metrics:y").await;

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }
}
