//! Connection gateway.
//!
//! Authenticates persistent client connections, scopes them into
//! authorization-gated tenant rooms, and forwards bus events as
//! room-scoped pushes.
//!
//! Per-connection state machine:
//!
//! ```text
//! Connecting → Authenticating → Authenticated → RoomJoined* → Disconnected
//! ```
//!
//! - Authentication happens before the transport handshake completes; a
//!   bad token never sees an upgraded socket.
//! - After authentication the server auto-joins the connection to every
//!   room the user is entitled to, so clients receive pushes without
//!   enumerating their tenants first.
//! - `permission:revoked` is the only bus event that mutates gateway
//!   state: the named user's connections are pulled out of the named
//!   tenant's room and told to leave that context.
//!
//! The connection registry is process-local by design. Scaling the
//! gateway horizontally needs sticky routing per user or bus-carried
//! gateway-to-gateway forwarding; unresolved, see DESIGN.md.

pub mod auth;
pub mod registry;
pub mod session;
pub mod websocket;

pub use auth::{AuthError, Claims, GatewayAuth};
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use websocket::{GatewayFanoutHook, gateway_handler};

use serde::Serialize;
use serde_json::Value;
use switchboard_core::epoch_ms_now;

/// A server→client frame: `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServerMessage {
    pub event: String,
    pub data: Value,
}

impl ServerMessage {
    /// An event frame carrying `data` plus a fresh `timestamp`.
    pub fn with_timestamp(event: &str, mut data: Value) -> Self {
        if let Value::Object(ref mut map) = data {
            map.insert("timestamp".into(), Value::from(epoch_ms_now()));
        }
        Self {
            event: event.to_string(),
            data,
        }
    }

    /// The reply to a client `ping`.
    pub fn pong() -> Self {
        Self {
            event: "pong".into(),
            data: serde_json::json!({ "timestamp": epoch_ms_now() }),
        }
    }

    /// An error frame. Authorization denials travel this way — they are
    /// expected, user-facing outcomes, not server errors.
    pub fn error(message: &str) -> Self {
        Self {
            event: "error".into(),
            data: serde_json::json!({ "message": message }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_timestamp_stamps_object_payloads() {
        let msg = ServerMessage::with_timestamp("config:updated", serde_json::json!({"a": 1}));
        assert_eq!(msg.data["a"], 1);
        assert!(msg.data["timestamp"].is_i64());
    }

    #[test]
    fn frames_serialize_as_event_and_data() {
        let msg = ServerMessage::error("nope");
        let raw = serde_json::to_value(&msg).unwrap();
        assert_eq!(raw["event"], "error");
        assert_eq!(raw["data"]["message"], "nope");
    }
}
