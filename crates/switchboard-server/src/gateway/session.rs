//! Client-frame handling, independent of the transport.
//!
//! Frames are `{"event": ..., "data": ...}`. Room joins are gated by an
//! authorization check against the source of truth; a provider failure is
//! treated as a denial (fail closed). Denials go back to the client as an
//! `error` frame — they are expected outcomes, not logged as errors.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::registry::{ConnectionHandle, ConnectionRegistry};
use crate::provider::TenantDirectory;

/// Raw client→server frame.
#[derive(Debug, Deserialize)]
struct ClientFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomTarget {
    tenant_id: String,
}

/// Shared context for session handling.
#[derive(Clone)]
pub struct SessionContext {
    pub registry: Arc<ConnectionRegistry>,
    pub directory: Arc<dyn TenantDirectory>,
}

impl SessionContext {
    /// Join the connection to every room its user is entitled to.
    ///
    /// Runs right after authentication so clients receive pushes without
    /// enumerating their tenants first. Provider failures leave the
    /// connection authenticated but roomless — explicit joins can still
    /// be attempted later.
    pub async fn auto_join(&self, handle: &ConnectionHandle) {
        match self.directory.tenants_for_user(&handle.user_id).await {
            Ok(tenants) => {
                for tenant_id in &tenants {
                    self.registry.join_room(tenant_id, handle);
                }
                tracing::debug!(
                    connection_id = %handle.id,
                    user_id = %handle.user_id,
                    rooms = tenants.len(),
                    "auto-joined entitled rooms"
                );
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %handle.user_id,
                    error = %e,
                    "auto-join skipped, directory unavailable"
                );
            }
        }
    }

    /// Handle one raw client frame.
    pub async fn handle_frame(&self, handle: &ConnectionHandle, raw: &str) {
        let frame: ClientFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(_) => {
                handle.send(super::ServerMessage::error("malformed frame")).await;
                return;
            }
        };

        match frame.event.as_str() {
            "join:guild" => self.handle_join(handle, frame.data).await,
            "leave:guild" => self.handle_leave(handle, frame.data).await,
            "ping" => handle.send(super::ServerMessage::pong()).await,
            other => {
                handle
                    .send(super::ServerMessage::error(&format!(
                        "unknown event: {other}"
                    )))
                    .await;
            }
        }
    }

    async fn handle_join(&self, handle: &ConnectionHandle, data: Value) {
        let Ok(target) = serde_json::from_value::<RoomTarget>(data) else {
            handle
                .send(super::ServerMessage::error("join:guild requires tenantId"))
                .await;
            return;
        };

        let authorized = match self
            .directory
            .can_access(&handle.user_id, &target.tenant_id)
            .await
        {
            Ok(authorized) => authorized,
            Err(e) => {
                // Fail closed: an unreachable source of truth denies the join.
                tracing::warn!(
                    tenant_id = %target.tenant_id,
                    error = %e,
                    "authorization check failed, denying join"
                );
                false
            }
        };

        if authorized {
            self.registry.join_room(&target.tenant_id, handle);
        } else {
            tracing::debug!(
                user_id = %handle.user_id,
                tenant_id = %target.tenant_id,
                "room join denied"
            );
            handle
                .send(super::ServerMessage::error("not authorized for this guild"))
                .await;
        }
    }

    async fn handle_leave(&self, handle: &ConnectionHandle, data: Value) {
        let Ok(target) = serde_json::from_value::<RoomTarget>(data) else {
            handle
                .send(super::ServerMessage::error("leave:guild requires tenantId"))
                .await;
            return;
        };
        self.registry.leave_room(&target.tenant_id, handle.id);
    }
}
