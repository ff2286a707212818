//! Event infrastructure for cross-process synchronization.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   Event Broadcaster                      │
//! │             (tokio::sync::broadcast channel)             │
//! └─────────────────────────────────────────────────────────┘
//!          │                 │                  │
//!          ▼                 ▼                  ▼
//!    ┌───────────┐     ┌───────────┐     ┌───────────┐
//!    │ CacheSync │     │  Gateway  │     │   ...     │
//!    │   hook    │     │  fan-out  │     │           │
//!    └───────────┘     └───────────┘     └───────────┘
//! ```
//!
//! Events arrive from two directions: published locally by a write path,
//! or received from the shared store's pub/sub and forwarded by the bus
//! listener. Either way they land on the [`EventBroadcaster`] and the
//! [`HookDispatcher`](registry::HookDispatcher) routes them to registered
//! hooks. Hooks run isolated: a failing or panicking handler is logged and
//! never takes the dispatcher down.
//!
//! Delivery is at-most-once with no cross-process ordering. A subscriber
//! that is down at publish time misses the message permanently. This is
//! the intended consistency model: every handler reaction is
//! invalidate-and-reload against the source of truth, which converges even
//! when intermediate events are lost.

pub mod broadcaster;
pub mod hooks;
pub mod registry;
pub mod types;

pub use broadcaster::EventBroadcaster;
pub use hooks::{HookError, SyncHook};
pub use registry::{HookDispatcher, HookRegistry};
pub use types::{BusChannel, ReceivedEvent, SyncEvent};
