//! Bus channels, typed payloads and the wire envelope.
//!
//! Every message on the bus is a JSON object: the payload fields of one of
//! the types below, flattened, plus a `timestamp` in epoch milliseconds
//! added by the publisher. Envelopes are immutable and fire-and-forget —
//! no sequence numbers, no acknowledgments.

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use time::OffsetDateTime;

/// Current time as epoch milliseconds, the envelope timestamp unit.
pub fn epoch_ms_now() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

// ============================================================================
// Channels
// ============================================================================

/// Named pub/sub channels on the shared store.
///
/// The wire names keep the `guild` vocabulary of the client protocol; the
/// rest of the codebase says `tenant` for the same scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusChannel {
    /// A tenant's settings changed.
    ConfigUpdate,
    /// A tenant module was enabled or disabled.
    ModuleToggle,
    /// Bulk resynchronization: drop everything cached for the tenant.
    TenantReload,
    /// A user's access to a tenant was revoked mid-session.
    PermissionRevoked,
    /// A command finished executing somewhere in the fleet.
    CommandExecuted,
}

impl BusChannel {
    /// All channels, in the order subscribers register them.
    pub const ALL: [BusChannel; 5] = [
        BusChannel::ConfigUpdate,
        BusChannel::ModuleToggle,
        BusChannel::TenantReload,
        BusChannel::PermissionRevoked,
        BusChannel::CommandExecuted,
    ];

    /// The channel name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            BusChannel::ConfigUpdate => "config:update",
            BusChannel::ModuleToggle => "module:toggle",
            BusChannel::TenantReload => "guild:reload",
            BusChannel::PermissionRevoked => "permission:revoked",
            BusChannel::CommandExecuted => "command:executed",
        }
    }

    /// Resolve a wire channel name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == name)
    }
}

impl std::fmt::Display for BusChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Outcome reported in a `command:executed` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandOutcome {
    Success,
    Error,
}

/// Payload for [`BusChannel::ConfigUpdate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    pub tenant_id: String,
    /// The committed settings object, as stored in the source of truth.
    pub settings: serde_json::Value,
}

/// Payload for [`BusChannel::ModuleToggle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleToggle {
    pub tenant_id: String,
    pub module_name: String,
    pub enabled: bool,
    /// Module configuration, when the toggle also changed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

/// Payload for [`BusChannel::TenantReload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantReload {
    pub tenant_id: String,
}

/// Payload for [`BusChannel::PermissionRevoked`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRevoked {
    pub tenant_id: String,
    pub user_id: String,
    pub reason: String,
}

/// Payload for [`BusChannel::CommandExecuted`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandExecuted {
    pub tenant_id: String,
    pub command: String,
    pub executor: String,
    pub result: CommandOutcome,
}

// ============================================================================
// Events and envelopes
// ============================================================================

/// A typed bus event, one variant per channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    ConfigUpdate(ConfigUpdate),
    ModuleToggle(ModuleToggle),
    TenantReload(TenantReload),
    PermissionRevoked(PermissionRevoked),
    CommandExecuted(CommandExecuted),
}

impl SyncEvent {
    /// The channel this event travels on.
    pub fn channel(&self) -> BusChannel {
        match self {
            SyncEvent::ConfigUpdate(_) => BusChannel::ConfigUpdate,
            SyncEvent::ModuleToggle(_) => BusChannel::ModuleToggle,
            SyncEvent::TenantReload(_) => BusChannel::TenantReload,
            SyncEvent::PermissionRevoked(_) => BusChannel::PermissionRevoked,
            SyncEvent::CommandExecuted(_) => BusChannel::CommandExecuted,
        }
    }

    /// The tenant scope; every payload carries one.
    pub fn tenant_id(&self) -> &str {
        match self {
            SyncEvent::ConfigUpdate(p) => &p.tenant_id,
            SyncEvent::ModuleToggle(p) => &p.tenant_id,
            SyncEvent::TenantReload(p) => &p.tenant_id,
            SyncEvent::PermissionRevoked(p) => &p.tenant_id,
            SyncEvent::CommandExecuted(p) => &p.tenant_id,
        }
    }

    /// Serialize to the wire envelope with the given publisher timestamp.
    pub fn encode_at(&self, timestamp_ms: i64) -> Result<String, EnvelopeError> {
        fn wrap<T: Serialize>(payload: &T, timestamp: i64) -> Result<String, EnvelopeError> {
            Ok(serde_json::to_string(&Envelope {
                payload,
                timestamp,
            })?)
        }
        match self {
            SyncEvent::ConfigUpdate(p) => wrap(p, timestamp_ms),
            SyncEvent::ModuleToggle(p) => wrap(p, timestamp_ms),
            SyncEvent::TenantReload(p) => wrap(p, timestamp_ms),
            SyncEvent::PermissionRevoked(p) => wrap(p, timestamp_ms),
            SyncEvent::CommandExecuted(p) => wrap(p, timestamp_ms),
        }
    }

    /// Serialize to the wire envelope, stamping the current time.
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        self.encode_at(epoch_ms_now())
    }

    /// Parse a raw message received on `channel`.
    pub fn decode(channel: BusChannel, raw: &str) -> Result<ReceivedEvent, EnvelopeError> {
        fn unwrap<T: DeserializeOwned>(raw: &str) -> Result<(T, i64), EnvelopeError> {
            let env: Envelope<T> = serde_json::from_str(raw)?;
            Ok((env.payload, env.timestamp))
        }
        let (event, timestamp_ms) = match channel {
            BusChannel::ConfigUpdate => {
                let (p, ts) = unwrap::<ConfigUpdate>(raw)?;
                (SyncEvent::ConfigUpdate(p), ts)
            }
            BusChannel::ModuleToggle => {
                let (p, ts) = unwrap::<ModuleToggle>(raw)?;
                (SyncEvent::ModuleToggle(p), ts)
            }
            BusChannel::TenantReload => {
                let (p, ts) = unwrap::<TenantReload>(raw)?;
                (SyncEvent::TenantReload(p), ts)
            }
            BusChannel::PermissionRevoked => {
                let (p, ts) = unwrap::<PermissionRevoked>(raw)?;
                (SyncEvent::PermissionRevoked(p), ts)
            }
            BusChannel::CommandExecuted => {
                let (p, ts) = unwrap::<CommandExecuted>(raw)?;
                (SyncEvent::CommandExecuted(p), ts)
            }
        };
        Ok(ReceivedEvent {
            event,
            timestamp_ms,
        })
    }
}

/// A decoded envelope: the typed event plus the publisher's timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedEvent {
    pub event: SyncEvent,
    pub timestamp_ms: i64,
}

/// Wire envelope: payload fields flattened next to the timestamp.
#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    #[serde(flatten)]
    payload: T,
    timestamp: i64,
}

/// Errors produced while encoding or decoding envelopes.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("unknown bus channel: {0}")]
    UnknownChannel(String),

    #[error("envelope serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_wire_names() {
        assert_eq!(BusChannel::ConfigUpdate.as_str(), "config:update");
        assert_eq!(BusChannel::TenantReload.as_str(), "guild:reload");
        assert_eq!(
            BusChannel::parse("permission:revoked"),
            Some(BusChannel::PermissionRevoked)
        );
        assert_eq!(BusChannel::parse("no:such"), None);
    }

    #[test]
    fn envelope_flattens_payload_and_adds_timestamp() {
        let event = SyncEvent::ModuleToggle(ModuleToggle {
            tenant_id: "G1".into(),
            module_name: "economy".into(),
            enabled: false,
            config: None,
        });

        let raw = event.encode_at(1_700_000_000_000).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(value["tenantId"], "G1");
        assert_eq!(value["moduleName"], "economy");
        assert_eq!(value["enabled"], false);
        assert_eq!(value["timestamp"], 1_700_000_000_000_i64);
        // Optional config is omitted entirely when absent
        assert!(value.get("config").is_none());
    }

    #[test]
    fn decode_restores_event_and_timestamp() {
        let raw = json!({
            "tenantId": "G1",
            "userId": "U9",
            "reason": "role removed",
            "timestamp": 42,
        })
        .to_string();

        let received = SyncEvent::decode(BusChannel::PermissionRevoked, &raw).unwrap();
        assert_eq!(received.timestamp_ms, 42);
        match received.event {
            SyncEvent::PermissionRevoked(p) => {
                assert_eq!(p.tenant_id, "G1");
                assert_eq!(p.user_id, "U9");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_malformed_payload() {
        let err = SyncEvent::decode(BusChannel::ConfigUpdate, "{not json");
        assert!(err.is_err());

        // Valid JSON but missing required fields is also malformed
        let err = SyncEvent::decode(BusChannel::ConfigUpdate, r#"{"timestamp": 1}"#);
        assert!(err.is_err());
    }

    #[test]
    fn command_outcome_serializes_lowercase() {
        let event = SyncEvent::CommandExecuted(CommandExecuted {
            tenant_id: "G1".into(),
            command: "purge".into(),
            executor: "U1".into(),
            result: CommandOutcome::Success,
        });
        let raw = event.encode_at(0).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["result"], "success");
    }
}
