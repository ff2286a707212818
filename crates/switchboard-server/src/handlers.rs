//! HTTP surface: health endpoints and the tenant configuration API.
//!
//! Write handlers decide *what* changed; this layer's only contract with
//! them is commit-to-source-of-truth first, then hand the change to the
//! publisher (invalidate + publish). They never write the cache directly.

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::middleware::AuthContext;
use crate::provider::ProviderError;
use crate::server::AppState;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "switchboard",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Readiness reports the store state but never fails the probe for it:
/// a degraded store means degraded caching, not an unhealthy process.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let store = if state.store.is_available().await {
        "ok"
    } else {
        "degraded"
    };
    Json(json!({ "status": "ok", "store": store }))
}

pub async fn metrics() -> Response {
    match crate::metrics::render_metrics() {
        Some(body) => body.into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response(),
    }
}

// =============================================================================
// Tenant configuration API
// =============================================================================

pub async fn get_tenant_config(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Response {
    match state.cache.tenant_config(&tenant_id).await {
        Ok(Some(settings)) => Json(settings).into_response(),
        Ok(None) => not_found("unknown tenant"),
        Err(e) => provider_error(e),
    }
}

pub async fn put_tenant_config(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Extension(auth): Extension<AuthContext>,
    Json(settings): Json<Value>,
) -> Response {
    if let Some(denied) = require_tenant_access(&state, &auth, &tenant_id).await {
        return denied;
    }
    if let Err(e) = state
        .provider
        .store_tenant_config(&tenant_id, settings.clone())
        .await
    {
        return provider_error(e);
    }
    if let Err(e) = state.publisher.config_updated(&tenant_id, settings).await {
        tracing::error!(tenant_id = %tenant_id, error = %e, "failed to publish config update");
    }
    StatusCode::NO_CONTENT.into_response()
}

pub async fn get_module_config(
    State(state): State<AppState>,
    Path((tenant_id, module)): Path<(String, String)>,
) -> Response {
    match state.cache.module_config(&tenant_id, &module).await {
        Ok(Some(module_state)) => Json(module_state).into_response(),
        Ok(None) => not_found("unknown module"),
        Err(e) => provider_error(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleToggleRequest {
    pub enabled: bool,
    #[serde(default)]
    pub config: Option<Value>,
}

pub async fn put_module_config(
    State(state): State<AppState>,
    Path((tenant_id, module)): Path<(String, String)>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<ModuleToggleRequest>,
) -> Response {
    if let Some(denied) = require_tenant_access(&state, &auth, &tenant_id).await {
        return denied;
    }
    if let Err(e) = state
        .provider
        .store_module_config(&tenant_id, &module, req.enabled, req.config.clone())
        .await
    {
        return provider_error(e);
    }
    if let Err(e) = state
        .publisher
        .module_toggled(&tenant_id, &module, req.enabled, req.config)
        .await
    {
        tracing::error!(tenant_id = %tenant_id, module = %module, error = %e, "failed to publish module toggle");
    }
    StatusCode::NO_CONTENT.into_response()
}

/// Trigger bulk resynchronization of a tenant's cached state.
pub async fn post_tenant_reload(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Extension(auth): Extension<AuthContext>,
) -> Response {
    if let Some(denied) = require_tenant_access(&state, &auth, &tenant_id).await {
        return denied;
    }
    if let Err(e) = state.publisher.tenant_reload(&tenant_id).await {
        tracing::error!(tenant_id = %tenant_id, error = %e, "failed to publish tenant reload");
    }
    (StatusCode::ACCEPTED, Json(json!({ "status": "reloading" }))).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationRequest {
    pub user_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Announce a mid-session access revocation. Gateways evict the user's
/// connections from the tenant's room in every instance.
pub async fn post_revocation(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<RevocationRequest>,
) -> Response {
    if let Some(denied) = require_tenant_access(&state, &auth, &tenant_id).await {
        return denied;
    }
    let reason = req.reason.as_deref().unwrap_or("access revoked");
    if let Err(e) = state
        .publisher
        .permission_revoked(&tenant_id, &req.user_id, reason)
        .await
    {
        tracing::error!(tenant_id = %tenant_id, error = %e, "failed to publish revocation");
    }
    (StatusCode::ACCEPTED, Json(json!({ "status": "revoked" }))).into_response()
}

/// Authorization gate shared by the write handlers. Denials are expected,
/// user-facing outcomes; a provider failure denies too (fail closed).
async fn require_tenant_access(
    state: &AppState,
    auth: &AuthContext,
    tenant_id: &str,
) -> Option<Response> {
    match state.directory.can_access(&auth.user_id, tenant_id).await {
        Ok(true) => None,
        Ok(false) => Some(forbidden()),
        Err(e) => {
            tracing::warn!(tenant_id = %tenant_id, error = %e, "authorization check failed, denying");
            Some(forbidden())
        }
    }
}

fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "not authorized for this tenant" })),
    )
        .into_response()
}

fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
}

fn provider_error(e: ProviderError) -> Response {
    tracing::error!(error = %e, "source of truth error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "source of truth unavailable" })),
    )
        .into_response()
}
