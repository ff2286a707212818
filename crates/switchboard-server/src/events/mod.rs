//! Event bus over the shared store's pub/sub.
//!
//! Publishing serializes the typed envelope and fans it out to every
//! currently-subscribed connection on the channel; with no subscriber it
//! is a silent no-op (nothing is buffered). Receiving happens on a
//! dedicated subscriber connection owned by [`RedisBusListener`], which
//! forwards decoded events to the process-local broadcaster — including
//! the publisher's own process, which hears its own messages echoed back
//! and reacts like any other subscriber.

pub mod redis;

pub use redis::{BusError, RedisBusListener};

use switchboard_core::{EnvelopeError, SyncEvent};

use crate::store::SharedStore;

/// Publishing half of the bus.
#[derive(Clone)]
pub struct EventBus {
    store: SharedStore,
}

impl EventBus {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Serialize `event` with a fresh publisher timestamp and publish it.
    ///
    /// Returns the number of subscribed connections that received the
    /// message. Store failures degrade to 0 — the envelope is lost, and
    /// that is an accepted outcome: every subscriber reaction is an
    /// idempotent invalidate-and-reload.
    pub async fn publish(&self, event: &SyncEvent) -> Result<usize, EnvelopeError> {
        let channel = event.channel();
        let payload = event.encode()?;
        let receivers = self.store.publish(channel.as_str(), &payload).await;
        crate::metrics::record_bus_published(channel.as_str());
        tracing::debug!(
            channel = %channel,
            tenant_id = %event.tenant_id(),
            receivers = receivers,
            "published bus event"
        );
        Ok(receivers)
    }
}
