//! In-process event broadcaster.
//!
//! The broadcaster is the junction between the wire and local handlers:
//! locally-published events and events received from the shared store both
//! land here, and every subscriber (cache sync, gateway fan-out, ...)
//! receives its own copy.

use std::sync::Arc;
use tokio::sync::broadcast;

use super::types::SyncEvent;

/// Buffer size for the broadcast channel. A slow receiver that falls more
/// than this far behind starts losing the oldest events — acceptable,
/// since every handler reaction is a reload that converges regardless.
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Thread-safe broadcaster for [`SyncEvent`]s.
///
/// Cloneable and shareable; multiple subscribers receive events from a
/// single sender. Sending with no subscribers is a no-op.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBroadcaster {
    /// Create a new broadcaster with the default buffer size.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new broadcaster with a custom buffer size.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a new broadcaster wrapped in an `Arc` for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Send an event to all subscribers.
    ///
    /// Returns the number of subscribers that received it; 0 when nobody
    /// is listening.
    pub fn send(&self, event: SyncEvent) -> usize {
        self.sender.send(event).unwrap_or_default()
    }

    /// Subscribe to events broadcast after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Whether any subscriber is attached.
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
