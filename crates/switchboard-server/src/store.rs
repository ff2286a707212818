//! Shared store adapter.
//!
//! The shared store is the only coordination point between Switchboard
//! processes: cache entries, rate counters, cooldown flags and the pub/sub
//! bus all live here. Every command fails soft — on any error the caller
//! gets a neutral result (`get` → absent, `set`/`delete` → no-op,
//! `increment_with_expiry` → `None`) and never an `Err`. The store is an
//! optimization layer; correctness always falls back to the source of
//! truth.
//!
//! Availability transitions are logged once (warn on loss, info on
//! recovery), not per failing request.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use deadpool_redis::Pool;
use redis::AsyncCommands;

use crate::config::RedisConfig;

/// Errors surfaced by store construction and subscriber duplication.
///
/// Regular data commands never return these — they fail soft instead.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("shared store is disabled")]
    Disabled,

    #[error("redis client error: {0}")]
    Client(String),

    #[error("redis connection error: {0}")]
    Connection(String),
}

/// Handle to the shared key-value store.
///
/// Cloneable; all clones share one connection pool. When the store is
/// disabled (or the pool could not be created) every operation degrades to
/// its neutral result, which the rest of the system treats as "no caching,
/// no real-time sync, no rate limiting".
#[derive(Clone)]
pub enum SharedStore {
    Disabled,
    Redis(Arc<RedisStore>),
}

pub struct RedisStore {
    pool: Pool,
    url: String,
    degraded: AtomicBool,
}

impl SharedStore {
    /// Build a store from configuration, modeled as a best-effort connect:
    /// a missing or misconfigured Redis yields a disabled store rather
    /// than a startup failure.
    pub async fn connect(config: &RedisConfig) -> Self {
        if !config.enabled {
            tracing::info!("shared store disabled, running without cache/bus/rate limits");
            return SharedStore::Disabled;
        }

        tracing::info!(url = %config.url, "connecting to shared store");

        let mut redis_config = deadpool_redis::Config::from_url(&config.url);
        if let Some(ref mut pool_config) = redis_config.pool {
            pool_config.max_size = config.pool_size;
            pool_config.timeouts.wait = Some(Duration::from_millis(config.timeout_ms));
            pool_config.timeouts.create = Some(Duration::from_millis(config.timeout_ms));
            pool_config.timeouts.recycle = Some(Duration::from_millis(config.timeout_ms));
        }

        let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(error = %e, "failed to create store pool, running degraded");
                return SharedStore::Disabled;
            }
        };

        let store = RedisStore {
            pool,
            url: config.url.clone(),
            degraded: AtomicBool::new(false),
        };

        // Probe once so startup logs tell the truth; a failed probe keeps
        // the pool, deadpool reconnects on demand.
        match store.pool.get().await {
            Ok(_) => tracing::info!("connected to shared store"),
            Err(e) => {
                store.degraded.store(true, Ordering::Relaxed);
                tracing::warn!(error = %e, "shared store unreachable at startup, will keep retrying");
            }
        }

        SharedStore::Redis(Arc::new(store))
    }

    /// Whether the store currently answers commands. Used by readiness.
    pub async fn is_available(&self) -> bool {
        match self {
            SharedStore::Disabled => false,
            SharedStore::Redis(store) => store.pool.get().await.is_ok(),
        }
    }

    /// Get a value. Absent on miss *or* on any store failure.
    pub async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn().await?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(e) => {
                self.note_error("GET", key, &e);
                None
            }
        }
    }

    /// Set a value, with store-level TTL when given. Fails soft.
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let Some(mut conn) = self.conn().await else {
            return;
        };
        let result = match ttl {
            Some(ttl) => {
                conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                    .await
            }
            None => conn.set::<_, _, ()>(key, value).await,
        };
        if let Err(e) = result {
            self.note_error("SET", key, &e);
        }
    }

    /// Delete a key. Fails soft.
    pub async fn delete(&self, key: &str) {
        let Some(mut conn) = self.conn().await else {
            return;
        };
        if let Err(e) = conn.del::<_, ()>(key).await {
            self.note_error("DEL", key, &e);
        }
    }

    /// Presence check. False on miss or failure.
    pub async fn exists(&self, key: &str) -> bool {
        let Some(mut conn) = self.conn().await else {
            return false;
        };
        match conn.exists::<_, bool>(key).await {
            Ok(present) => present,
            Err(e) => {
                self.note_error("EXISTS", key, &e);
                false
            }
        }
    }

    /// Atomically increment a fixed-window counter.
    ///
    /// Creates the key with count 1 and the given expiry when absent;
    /// otherwise increments and leaves the existing expiry untouched.
    /// Returns `None` when the store is unavailable — callers fail open.
    pub async fn increment_with_expiry(&self, key: &str, window: Duration) -> Option<u64> {
        let mut conn = self.conn().await?;
        let count = match conn.incr::<_, _, u64>(key, 1u64).await {
            Ok(count) => count,
            Err(e) => {
                self.note_error("INCR", key, &e);
                return None;
            }
        };
        if count == 1 {
            // First request in the window owns the expiry. A crash between
            // INCR and EXPIRE orphans one counter for one window; nothing
            // depends on the counter being precise.
            if let Err(e) = conn.expire::<_, ()>(key, window.as_secs().max(1) as i64).await {
                self.note_error("EXPIRE", key, &e);
            }
        }
        Some(count)
    }

    /// Remaining TTL of a key, if it exists and has one.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let mut conn = self.conn().await?;
        match conn.ttl::<_, i64>(key).await {
            Ok(secs) if secs > 0 => Some(Duration::from_secs(secs as u64)),
            Ok(_) => None,
            Err(e) => {
                self.note_error("TTL", key, &e);
                None
            }
        }
    }

    /// Delete every key starting with `prefix` (cursored SCAN, never the
    /// blocking KEYS).
    pub async fn delete_prefix(&self, prefix: &str) {
        let Some(mut conn) = self.conn().await else {
            return;
        };
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut deleted = 0usize;
        loop {
            let reply: Result<(u64, Vec<String>), _> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await;
            let (next, batch) = match reply {
                Ok(reply) => reply,
                Err(e) => {
                    self.note_error("SCAN", &pattern, &e);
                    return;
                }
            };
            if !batch.is_empty() {
                deleted += batch.len();
                if let Err(e) = conn.del::<_, ()>(&batch).await {
                    self.note_error("DEL", &pattern, &e);
                    return;
                }
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        if deleted > 0 {
            tracing::debug!(prefix = %prefix, count = deleted, "cleared key space");
        }
    }

    /// Publish a raw payload on a channel.
    ///
    /// Returns the number of subscribed connections that received it; 0 on
    /// no subscribers (a silent no-op, nothing is buffered) or on failure.
    pub async fn publish(&self, channel: &str, payload: &str) -> usize {
        let Some(mut conn) = self.conn().await else {
            return 0;
        };
        match conn.publish::<_, _, i64>(channel, payload).await {
            Ok(receivers) => receivers.max(0) as usize,
            Err(e) => {
                self.note_error("PUBLISH", channel, &e);
                0
            }
        }
    }

    /// Produce a second logical connection dedicated to receiving
    /// published messages.
    ///
    /// A connection in subscriber mode cannot issue other commands, so the
    /// bus listener gets its own client rather than a pooled connection.
    pub async fn subscriber_connection(&self) -> Result<redis::aio::PubSub, StoreError> {
        match self {
            SharedStore::Disabled => Err(StoreError::Disabled),
            SharedStore::Redis(store) => {
                let client = redis::Client::open(store.url.as_str())
                    .map_err(|e| StoreError::Client(e.to_string()))?;
                client
                    .get_async_pubsub()
                    .await
                    .map_err(|e| StoreError::Connection(e.to_string()))
            }
        }
    }

    async fn conn(&self) -> Option<deadpool_redis::Connection> {
        match self {
            SharedStore::Disabled => None,
            SharedStore::Redis(store) => match store.pool.get().await {
                Ok(conn) => {
                    if store.degraded.swap(false, Ordering::Relaxed) {
                        tracing::info!("shared store recovered");
                    }
                    Some(conn)
                }
                Err(e) => {
                    if !store.degraded.swap(true, Ordering::Relaxed) {
                        tracing::warn!(error = %e, "shared store unavailable, degrading");
                    }
                    None
                }
            },
        }
    }

    fn note_error(&self, command: &str, key: &str, error: &redis::RedisError) {
        tracing::warn!(command = %command, key = %key, error = %error, "store command failed");
    }
}

impl std::fmt::Debug for SharedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SharedStore::Disabled => f.write_str("SharedStore::Disabled"),
            SharedStore::Redis(store) => f
                .debug_struct("SharedStore::Redis")
                .field("url", &store.url)
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_store_returns_neutral_results() {
        let store = SharedStore::Disabled;

        store.set("k", "v", None).await;
        assert_eq!(store.get("k").await, None);
        assert!(!store.exists("k").await);
        assert_eq!(
            store
                .increment_with_expiry("k", Duration::from_secs(60))
                .await,
            None
        );
        assert_eq!(store.publish("chan", "{}").await, 0);
        assert!(!store.is_available().await);
        assert!(matches!(
            store.subscriber_connection().await,
            Err(StoreError::Disabled)
        ));
    }

    #[tokio::test]
    async fn disabled_config_yields_disabled_store() {
        let config = RedisConfig {
            enabled: false,
            ..RedisConfig::default()
        };
        let store = SharedStore::connect(&config).await;
        assert!(matches!(store, SharedStore::Disabled));
    }
}
