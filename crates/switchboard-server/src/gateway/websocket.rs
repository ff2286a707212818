//! WebSocket transport and bus fan-out.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use switchboard_core::{HookError, SyncEvent, SyncHook};
use tokio::sync::mpsc;

use super::ServerMessage;
use super::auth::GatewayAuth;
use super::registry::{ConnectionHandle, ConnectionRegistry};
use super::session::SessionContext;
use crate::server::AppState;

/// Outbound queue depth per connection.
const SEND_BUFFER: usize = 32;

/// `GET /gateway` — authenticate, then upgrade.
///
/// Verification happens before the handshake completes: a bad or missing
/// token gets a 401 and never an upgraded socket. Handshake failures are
/// security-relevant and logged as such.
pub async fn gateway_handler(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = match GatewayAuth::token_from_handshake(&query, &headers) {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!(error = %e, "gateway handshake rejected: no token");
            return (StatusCode::UNAUTHORIZED, "missing bearer token").into_response();
        }
    };

    let claims = match state.gateway_auth.verify(&token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!(error = %e, "gateway handshake rejected: bad token");
            return (StatusCode::UNAUTHORIZED, "invalid bearer token").into_response();
        }
    };

    let session = SessionContext {
        registry: state.registry.clone(),
        directory: state.directory.clone(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, session, claims.sub))
}

/// Per-connection task: register, auto-join, then pump frames both ways
/// until the transport closes.
async fn handle_socket(socket: WebSocket, session: SessionContext, user_id: String) {
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(SEND_BUFFER);
    let handle = ConnectionHandle::new(user_id, tx);

    session.registry.register(handle.clone());
    session.auto_join(&handle).await;

    tracing::info!(
        connection_id = %handle.id,
        user_id = %handle.user_id,
        "gateway connection established"
    );

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(raw))) => {
                        session.handle_frame(&handle, raw.as_str()).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Binary(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %handle.id, error = %e, "socket error");
                        break;
                    }
                }
            }

            outgoing = rx.recv() => {
                match outgoing {
                    Some(message) => {
                        let raw = match serde_json::to_string(&message) {
                            Ok(raw) => raw,
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to serialize frame");
                                continue;
                            }
                        };
                        if sink.send(Message::Text(raw.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    session.registry.unregister(&handle);
    tracing::info!(
        connection_id = %handle.id,
        user_id = %handle.user_id,
        "gateway connection closed"
    );
}

// ============================================================================
// Bus fan-out
// ============================================================================

/// Hook that re-emits bus events to the affected tenant's room.
///
/// Room-scoped channels broadcast the decoded envelope plus a fresh
/// timestamp. `permission:revoked` is user-scoped instead: the named
/// user's connections are pulled out of the named tenant's room and told
/// to leave that context — the only fan-out that mutates gateway state.
pub struct GatewayFanoutHook {
    registry: Arc<ConnectionRegistry>,
}

impl GatewayFanoutHook {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl SyncHook for GatewayFanoutHook {
    fn name(&self) -> &str {
        "gateway_fanout"
    }

    async fn handle(&self, event: &SyncEvent) -> Result<(), HookError> {
        match event {
            SyncEvent::ConfigUpdate(p) => {
                self.broadcast(&p.tenant_id, "config:updated", p).await
            }
            SyncEvent::ModuleToggle(p) => {
                self.broadcast(&p.tenant_id, "module:toggled", p).await
            }
            SyncEvent::TenantReload(p) => self.broadcast(&p.tenant_id, "guild:reload", p).await,
            SyncEvent::CommandExecuted(p) => {
                self.broadcast(&p.tenant_id, "command:executed", p).await
            }
            SyncEvent::PermissionRevoked(p) => {
                // User-scoped, not room-scoped: every connection belonging
                // to the user is pulled from the tenant's room and told to
                // leave that context.
                let connections = self.registry.connections_for_user(&p.user_id);
                tracing::info!(
                    tenant_id = %p.tenant_id,
                    user_id = %p.user_id,
                    connections = connections.len(),
                    "evicting revoked user from room"
                );
                let notice = ServerMessage::with_timestamp(
                    "permission:revoked",
                    serde_json::json!({
                        "tenantId": p.tenant_id,
                        "reason": p.reason,
                        "action": "redirect_home",
                    }),
                );
                for handle in connections {
                    self.registry.leave_room(&p.tenant_id, handle.id);
                    handle.send(notice.clone()).await;
                }
                Ok(())
            }
        }
    }
}

impl GatewayFanoutHook {
    async fn broadcast<T: serde::Serialize>(
        &self,
        tenant_id: &str,
        event: &str,
        payload: &T,
    ) -> Result<(), HookError> {
        let data = serde_json::to_value(payload)
            .map_err(|e| HookError::Serialization(e.to_string()))?;
        self.registry
            .broadcast_room(tenant_id, ServerMessage::with_timestamp(event, data))
            .await;
        Ok(())
    }
}
