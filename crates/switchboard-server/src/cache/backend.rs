//! Cache backend with L1 (DashMap) and L2 (shared store) tiers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::store::SharedStore;

/// A cached entry with TTL support.
///
/// The value is wrapped in `Arc` so cache hits clone a pointer, not the
/// serialized JSON.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub value: Arc<String>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    pub fn new(value: String, ttl: Duration) -> Self {
        Self {
            value: Arc::new(value),
            cached_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// L1 TTL used when promoting an L2 hit. The entry may outlive its L2
/// copy; staleness is bounded by the invalidation events and the ceiling.
const PROMOTION_TTL: Duration = Duration::from_secs(3600);

/// Two-tier cache: per-process DashMap in front of the shared store.
///
/// When the shared store is disabled or unavailable the L1 tier keeps
/// working alone — reads just stop seeing other processes' writes until
/// the store recovers.
#[derive(Clone)]
pub struct CacheBackend {
    local: Arc<DashMap<String, CachedEntry>>,
    store: SharedStore,
}

impl CacheBackend {
    pub fn new(store: SharedStore) -> Self {
        Self {
            local: Arc::new(DashMap::new()),
            store,
        }
    }

    /// Get a value, checking L1 before L2 and promoting L2 hits.
    pub async fn get(&self, key: &str) -> Option<Arc<String>> {
        if let Some(entry) = self.local.get(key) {
            if !entry.is_expired() {
                tracing::debug!(key = %key, "cache hit (L1)");
                crate::metrics::record_cache_hit("L1");
                return Some(Arc::clone(&entry.value));
            }
            drop(entry);
            self.local.remove(key);
        }

        match self.store.get(key).await {
            Some(value) => {
                tracing::debug!(key = %key, "cache hit (L2)");
                crate::metrics::record_cache_hit("L2");
                let entry = CachedEntry::new(value, PROMOTION_TTL);
                let value = Arc::clone(&entry.value);
                self.local.insert(key.to_string(), entry);
                Some(value)
            }
            None => {
                tracing::debug!(key = %key, "cache miss");
                crate::metrics::record_cache_miss();
                None
            }
        }
    }

    /// Write a value to both tiers with the given TTL.
    ///
    /// The L2 write is fire-and-forget; the store is best-effort anyway.
    pub async fn set(&self, key: &str, value: String, ttl: Duration) {
        let entry = CachedEntry::new(value, ttl);
        let for_store = Arc::clone(&entry.value);
        self.local.insert(key.to_string(), entry);

        let store = self.store.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            store.set(&key, &for_store, Some(ttl)).await;
        });
    }

    /// Remove an entry from both tiers.
    ///
    /// Awaited, not spawned: the writer path must see the shared delete
    /// complete before it publishes the corresponding event.
    pub async fn invalidate(&self, key: &str) {
        self.local.remove(key);
        self.store.delete(key).await;
        tracing::debug!(key = %key, "cache invalidated");
    }

    /// Remove every entry under a key prefix from both tiers.
    ///
    /// Used by the bulk-resynchronization path to clear a tenant's whole
    /// key space.
    pub async fn invalidate_prefix(&self, prefix: &str) {
        self.local.retain(|key, _| !key.starts_with(prefix));
        self.store.delete_prefix(prefix).await;
        tracing::debug!(prefix = %prefix, "cache key space invalidated");
    }

    /// Cache statistics (L1 only).
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l1_entries: self.local.len(),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub l1_entries: usize,
}
