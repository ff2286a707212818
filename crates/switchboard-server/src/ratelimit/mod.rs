//! Fixed-window rate limiting on the shared store.
//!
//! Counters are plain store keys with store-native TTL: the first request
//! in a window creates the key with the window's expiry, every further
//! request increments it. Windows reset at fixed intervals, not sliding
//! ones. Because the counters live in the shared store, every process
//! enforces the same window.
//!
//! An unreachable counter store never blocks traffic — limiters fail
//! open. The hard block-list is the opposite: a present flag
//! short-circuits everything with a fixed "temporarily blocked" response.

pub mod cooldown;

pub use cooldown::CooldownTracker;

use std::time::Duration;

use switchboard_core::epoch_ms_now;

use crate::store::SharedStore;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Epoch milliseconds at which the window expires.
    pub reset_at_ms: i64,
}

impl RateLimitDecision {
    /// Pure decision math: allowed iff `count <= limit`,
    /// `remaining = max(0, limit - count)`.
    fn evaluate(count: u64, limit: u32, window_remaining: Duration) -> Self {
        Self {
            allowed: count <= limit as u64,
            limit,
            remaining: (limit as u64).saturating_sub(count) as u32,
            reset_at_ms: epoch_ms_now() + window_remaining.as_millis() as i64,
        }
    }
}

/// One fixed-window limiter instance (e.g. IP-scoped or user-scoped).
#[derive(Clone)]
pub struct FixedWindowLimiter {
    store: SharedStore,
    prefix: &'static str,
    limit: u32,
    window: Duration,
}

impl FixedWindowLimiter {
    pub fn new(store: SharedStore, prefix: &'static str, limit: u32, window: Duration) -> Self {
        Self {
            store,
            prefix,
            limit,
            window,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Count a request against `identifier`'s current window.
    ///
    /// `None` means the store could not answer — the caller must allow
    /// the request (fail open) and skip the rate-limit headers.
    pub async fn check(&self, identifier: &str) -> Option<RateLimitDecision> {
        let key = format!("{}:{identifier}", self.prefix);
        let count = self.store.increment_with_expiry(&key, self.window).await?;
        if count == 1 {
            tracing::debug!(key = %key, "rate window opened");
        }
        // Remaining window TTL drives resetAt; a racing expiry between the
        // two commands just reports a full window, which is what the next
        // request will actually see.
        let window_remaining = self.store.ttl(&key).await.unwrap_or(self.window);
        let decision = RateLimitDecision::evaluate(count, self.limit, window_remaining);
        if !decision.allowed {
            crate::metrics::record_rate_limit_rejection(self.prefix);
        }
        Some(decision)
    }
}

/// Retry-after reported when a blocked identifier has no readable TTL.
const DEFAULT_BLOCK_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Hard block-list, checked before any limiter.
#[derive(Clone)]
pub struct BlockList {
    store: SharedStore,
}

impl BlockList {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    fn key(identifier: &str) -> String {
        format!("blocked:{identifier}")
    }

    /// If blocked, the remaining block duration to report as retry-after.
    pub async fn is_blocked(&self, identifier: &str) -> Option<Duration> {
        let key = Self::key(identifier);
        if !self.store.exists(&key).await {
            return None;
        }
        Some(
            self.store
                .ttl(&key)
                .await
                .unwrap_or(DEFAULT_BLOCK_RETRY_AFTER),
        )
    }

    /// Put an identifier on the block-list for `duration`.
    pub async fn block(&self, identifier: &str, duration: Duration) {
        self.store
            .set(&Self::key(identifier), "1", Some(duration))
            .await;
        tracing::info!(identifier = %identifier, secs = duration.as_secs(), "identifier blocked");
    }

    /// Lift a block early.
    pub async fn unblock(&self, identifier: &str) {
        self.store.delete(&Self::key(identifier)).await;
    }
}
