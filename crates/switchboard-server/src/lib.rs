//! Switchboard server: the real-time synchronization layer for a
//! multi-tenant configuration store.
//!
//! One binary serves three roles, all built on the same shared store:
//! a read-through cache with explicit invalidation, a typed pub/sub bus
//! for change notifications, and a fixed-window counter service for rate
//! limiting and cooldowns — plus the WebSocket gateway that pushes bus
//! events to authorization-gated tenant rooms.

pub mod cache;
pub mod config;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod provider;
pub mod ratelimit;
pub mod server;
pub mod store;
pub mod sync;

pub use cache::{CacheBackend, TenantConfigCache};
pub use config::{AppConfig, RedisConfig};
pub use events::{EventBus, RedisBusListener};
pub use gateway::{ConnectionRegistry, GatewayAuth};
pub use observability::init_tracing;
pub use provider::{ConfigProvider, MemoryProvider, TenantDirectory};
pub use ratelimit::{BlockList, CooldownTracker, FixedWindowLimiter};
pub use server::{AppState, ServerBuilder, SwitchboardServer, build_app};
pub use store::SharedStore;
pub use sync::{CacheSyncHook, ChangePublisher};
