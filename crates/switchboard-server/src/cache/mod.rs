//! Two-tier caching over the shared store.
//!
//! - **L1 (DashMap)**: per-process, microsecond latency
//! - **L2 (shared store)**: cross-process, millisecond latency
//!
//! ```text
//! read → L1 → L2 (shared store) → source of truth
//! ```
//!
//! A present entry is never guaranteed fresh; absence is the only hard
//! guarantee (a miss forces a reload from the source of truth). Entries
//! always carry a bounded TTL so a missed invalidation self-heals.

pub mod backend;
pub mod tenant;

pub use backend::{CacheBackend, CacheStats, CachedEntry};
pub use tenant::TenantConfigCache;
