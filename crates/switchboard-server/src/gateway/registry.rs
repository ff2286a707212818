//! Process-local connection registry.
//!
//! Owned exclusively by this gateway instance: `userId → connections` and
//! `roomId (tenantId) → connections`. Entries are created on successful
//! handshake, updated on join/leave, and removed on disconnect; nothing
//! here is persisted or mirrored to other processes.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::ServerMessage;

/// Handle for sending frames to one connected client.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub id: Uuid,
    pub user_id: String,
    sender: mpsc::Sender<ServerMessage>,
}

impl ConnectionHandle {
    pub fn new(user_id: impl Into<String>, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            sender,
        }
    }

    /// Queue a frame for this connection. A send to a dead connection is
    /// a no-op apart from the debug log — the socket task has already
    /// unregistered or is about to.
    pub async fn send(&self, message: ServerMessage) {
        if let Err(e) = self.sender.send(message).await {
            tracing::debug!(connection_id = %self.id, error = %e, "send to closed connection");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Registry of live connections and room membership.
#[derive(Default)]
pub struct ConnectionRegistry {
    users: RwLock<HashMap<String, Vec<ConnectionHandle>>>,
    rooms: RwLock<HashMap<String, Vec<ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly authenticated connection.
    pub fn register(&self, handle: ConnectionHandle) {
        let mut users = self.users.write();
        users
            .entry(handle.user_id.clone())
            .or_default()
            .push(handle.clone());
        crate::metrics::gateway_connection_opened();
        tracing::debug!(
            connection_id = %handle.id,
            user_id = %handle.user_id,
            "connection registered"
        );
    }

    /// Remove a connection from every room and from its user's set.
    /// The user entry disappears with its last connection.
    pub fn unregister(&self, handle: &ConnectionHandle) {
        {
            let mut rooms = self.rooms.write();
            for members in rooms.values_mut() {
                members.retain(|h| h.id != handle.id);
            }
            rooms.retain(|_, members| !members.is_empty());
        }
        {
            let mut users = self.users.write();
            if let Some(handles) = users.get_mut(&handle.user_id) {
                handles.retain(|h| h.id != handle.id);
                if handles.is_empty() {
                    users.remove(&handle.user_id);
                }
            }
        }
        crate::metrics::gateway_connection_closed();
        tracing::debug!(
            connection_id = %handle.id,
            user_id = %handle.user_id,
            "connection unregistered"
        );
    }

    /// Add a connection to a tenant's room. Idempotent per connection.
    /// Joining a dead connection is a no-op — this is where an
    /// authorization check that resolved after a disconnect lands.
    pub fn join_room(&self, tenant_id: &str, handle: &ConnectionHandle) {
        if handle.is_closed() {
            tracing::debug!(connection_id = %handle.id, "join after disconnect, ignoring");
            return;
        }
        let mut rooms = self.rooms.write();
        let members = rooms.entry(tenant_id.to_string()).or_default();
        if !members.iter().any(|h| h.id == handle.id) {
            members.push(handle.clone());
            tracing::debug!(
                connection_id = %handle.id,
                tenant_id = %tenant_id,
                "joined room"
            );
        }
    }

    /// Remove a connection from a tenant's room without closing it.
    pub fn leave_room(&self, tenant_id: &str, connection_id: Uuid) {
        let mut rooms = self.rooms.write();
        if let Some(members) = rooms.get_mut(tenant_id) {
            members.retain(|h| h.id != connection_id);
            if members.is_empty() {
                rooms.remove(tenant_id);
            }
        }
    }

    /// Whether a connection is currently in a tenant's room.
    pub fn in_room(&self, tenant_id: &str, connection_id: Uuid) -> bool {
        self.rooms
            .read()
            .get(tenant_id)
            .map(|members| members.iter().any(|h| h.id == connection_id))
            .unwrap_or(false)
    }

    /// Every live connection belonging to a user.
    pub fn connections_for_user(&self, user_id: &str) -> Vec<ConnectionHandle> {
        self.users.read().get(user_id).cloned().unwrap_or_default()
    }

    /// Send a frame to every connection in a tenant's room.
    pub async fn broadcast_room(&self, tenant_id: &str, message: ServerMessage) {
        let handles = self
            .rooms
            .read()
            .get(tenant_id)
            .cloned()
            .unwrap_or_default();
        for handle in handles {
            handle.send(message.clone()).await;
        }
    }

    /// Number of connections in a tenant's room.
    pub fn room_size(&self, tenant_id: &str) -> usize {
        self.rooms
            .read()
            .get(tenant_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Total number of tracked connections.
    pub fn total_connections(&self) -> usize {
        self.users.read().values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(user: &str) -> (ConnectionHandle, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(8);
        (ConnectionHandle::new(user, tx), rx)
    }

    #[tokio::test]
    async fn register_join_broadcast_flow() {
        let registry = ConnectionRegistry::new();
        let (h1, mut rx1) = handle("alice");
        let (h2, mut rx2) = handle("bob");

        registry.register(h1.clone());
        registry.register(h2.clone());
        registry.join_room("G1", &h1);
        registry.join_room("G1", &h2);

        registry
            .broadcast_room("G1", ServerMessage::error("hello"))
            .await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert_eq!(registry.room_size("G1"), 2);
    }

    #[tokio::test]
    async fn join_is_idempotent_per_connection() {
        let registry = ConnectionRegistry::new();
        let (h, _rx) = handle("alice");
        registry.register(h.clone());
        registry.join_room("G1", &h);
        registry.join_room("G1", &h);
        assert_eq!(registry.room_size("G1"), 1);
    }

    #[tokio::test]
    async fn unregister_clears_rooms_and_user_entry() {
        let registry = ConnectionRegistry::new();
        let (h, _rx) = handle("alice");
        registry.register(h.clone());
        registry.join_room("G1", &h);
        registry.join_room("G2", &h);

        registry.unregister(&h);

        assert_eq!(registry.room_size("G1"), 0);
        assert_eq!(registry.room_size("G2"), 0);
        assert!(registry.connections_for_user("alice").is_empty());
        assert_eq!(registry.total_connections(), 0);
    }

    #[tokio::test]
    async fn dead_connection_cannot_join_a_room() {
        let registry = ConnectionRegistry::new();
        let (h, rx) = handle("alice");
        registry.register(h.clone());
        drop(rx);

        registry.join_room("G1", &h);
        assert_eq!(registry.room_size("G1"), 0);
    }

    #[tokio::test]
    async fn leave_room_keeps_connection_alive() {
        let registry = ConnectionRegistry::new();
        let (h, _rx) = handle("alice");
        registry.register(h.clone());
        registry.join_room("G1", &h);
        registry.leave_room("G1", h.id);

        assert!(!registry.in_room("G1", h.id));
        assert_eq!(registry.connections_for_user("alice").len(), 1);
    }
}
