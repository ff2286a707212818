//! Subscriber side of the event bus.
//!
//! Holds the dedicated pub/sub connection (a subscribed connection cannot
//! issue other store commands), decodes envelopes defensively, and
//! forwards typed events to the local broadcaster. Reconnects with capped
//! exponential backoff when the stream drops.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use switchboard_core::{BusChannel, EventBroadcaster, SyncEvent};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::store::{SharedStore, StoreError};

/// Errors that can occur on the subscriber connection.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("pub/sub stream ended")]
    StreamEnded,
}

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Background task bridging the wire to the local broadcaster.
pub struct RedisBusListener {
    store: SharedStore,
    broadcaster: Arc<EventBroadcaster>,
}

impl RedisBusListener {
    pub fn new(store: SharedStore, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self { store, broadcaster }
    }

    /// Spawn the listener loop. With a disabled store this returns
    /// immediately and the process runs without real-time sync.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        if matches!(self.store, SharedStore::Disabled) {
            info!("shared store disabled, bus listener not started");
            return;
        }

        let mut backoff = INITIAL_BACKOFF;
        loop {
            match self.subscribe_loop().await {
                Ok(()) => {
                    info!("bus listener stopped gracefully");
                    break;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        backoff_secs = backoff.as_secs(),
                        "bus listener error, reconnecting"
                    );
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn subscribe_loop(&self) -> Result<(), BusError> {
        let mut pubsub = self.store.subscriber_connection().await?;

        for channel in BusChannel::ALL {
            pubsub
                .subscribe(channel.as_str())
                .await
                .map_err(|e| BusError::Subscribe(e.to_string()))?;
        }
        info!(channels = BusChannel::ALL.len(), "subscribed to bus channels");

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let channel_name = msg.get_channel_name().to_string();
            let Some(channel) = BusChannel::parse(&channel_name) else {
                warn!(channel = %channel_name, "message on unknown channel, dropping");
                continue;
            };

            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(channel = %channel, error = %e, "unreadable bus payload, dropping");
                    continue;
                }
            };

            // Malformed payloads are logged and dropped; they never
            // propagate into the handler chain.
            match SyncEvent::decode(channel, &payload) {
                Ok(received) => {
                    debug!(
                        channel = %channel,
                        tenant_id = %received.event.tenant_id(),
                        "received bus event"
                    );
                    crate::metrics::record_bus_received(channel.as_str());
                    self.broadcaster.send(received.event);
                }
                Err(e) => {
                    warn!(
                        channel = %channel,
                        error = %e,
                        payload = %payload,
                        "malformed bus message, dropping"
                    );
                }
            }
        }

        Err(BusError::StreamEnded)
    }
}
