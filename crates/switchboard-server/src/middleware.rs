//! HTTP middleware: request ids, bearer authentication, rate limiting.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::{
    Json,
    body::Body,
    http::{HeaderName, HeaderValue, Request, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use serde_json::json;
use uuid::Uuid;

use crate::config::RateLimitConfig;
use crate::ratelimit::{BlockList, FixedWindowLimiter, RateLimitDecision};
use crate::server::AppState;
use crate::store::SharedStore;

// =============================================================================
// Request id
// =============================================================================

/// Ensure each request has an X-Request-Id and mirror it on the response.
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static("x-request-id");

    let req_id_value = req
        .headers()
        .get(&header_name)
        .cloned()
        .unwrap_or_else(|| {
            HeaderValue::from_str(&Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("invalid"))
        });

    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;
    res.headers_mut().insert(header_name, req_id_value);
    res
}

// =============================================================================
// Authentication
// =============================================================================

/// Authenticated caller, injected into request extensions.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
}

/// Bearer authentication for the API surface.
///
/// Validates the Authorization header against the same verifier the
/// gateway handshake uses and stores an [`AuthContext`] for downstream
/// middleware (the user-scoped rate limiter) and handlers.
pub async fn authentication_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty());

    let Some(token) = token else {
        tracing::debug!(path = %req.uri().path(), "missing Authorization header");
        return unauthorized_response("authentication required");
    };

    match state.gateway_auth.verify(token) {
        Ok(claims) => {
            req.extensions_mut().insert(AuthContext {
                user_id: claims.sub,
            });
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "token validation failed");
            unauthorized_response("invalid bearer token")
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [("WWW-Authenticate", "Bearer")],
        Json(json!({ "error": message })),
    )
        .into_response()
}

// =============================================================================
// Rate limiting
// =============================================================================

/// Both limiter instances plus the hard block-list.
///
/// The IP limiter applies to every request; the user limiter applies in
/// addition when the caller is authenticated. A request can be rejected
/// by either.
#[derive(Clone)]
pub struct RateLimitState {
    pub enabled: bool,
    pub ip_limiter: FixedWindowLimiter,
    pub user_limiter: FixedWindowLimiter,
    pub blocklist: BlockList,
}

impl RateLimitState {
    pub fn from_config(store: SharedStore, config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            ip_limiter: FixedWindowLimiter::new(
                store.clone(),
                "rl:ip",
                config.ip_limit,
                Duration::from_secs(config.ip_window_secs),
            ),
            user_limiter: FixedWindowLimiter::new(
                store.clone(),
                "rl:user",
                config.user_limit,
                Duration::from_secs(config.user_window_secs),
            ),
            blocklist: BlockList::new(store),
        }
    }
}

/// Rate-limit middleware for the API surface.
///
/// Order: block-list → IP limiter → user limiter. Accepted responses get
/// `X-RateLimit-Limit` / `-Remaining` / `-Reset` headers from whichever
/// limiter is closer to its boundary. When the counter store cannot
/// answer, requests pass without headers (fail open).
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let limits = &state.rate_limit;
    if !limits.enabled {
        return next.run(req).await;
    }

    let client_ip = extract_client_ip(&req, addr);
    let user_id = req
        .extensions()
        .get::<AuthContext>()
        .map(|auth| auth.user_id.clone());

    if let Some(retry_after) = limits.blocklist.is_blocked(&client_ip).await {
        return blocked_response(retry_after);
    }
    if let Some(ref user_id) = user_id {
        if let Some(retry_after) = limits.blocklist.is_blocked(user_id).await {
            return blocked_response(retry_after);
        }
    }

    let ip_decision = limits.ip_limiter.check(&client_ip).await;
    if let Some(ref decision) = ip_decision {
        if !decision.allowed {
            return limited_response(decision);
        }
    }

    let user_decision = match user_id {
        Some(ref user_id) => limits.user_limiter.check(user_id).await,
        None => None,
    };
    if let Some(ref decision) = user_decision {
        if !decision.allowed {
            return limited_response(decision);
        }
    }

    // Report the tighter of the two windows
    let reported = match (ip_decision, user_decision) {
        (Some(ip), Some(user)) => Some(if user.remaining < ip.remaining { user } else { ip }),
        (Some(ip), None) => Some(ip),
        (None, Some(user)) => Some(user),
        (None, None) => None,
    };

    let mut res = next.run(req).await;
    if let Some(decision) = reported {
        let headers = res.headers_mut();
        insert_numeric_header(headers, "x-ratelimit-limit", decision.limit as i64);
        insert_numeric_header(headers, "x-ratelimit-remaining", decision.remaining as i64);
        insert_numeric_header(headers, "x-ratelimit-reset", decision.reset_at_ms);
    }
    res
}

fn insert_numeric_header(headers: &mut axum::http::HeaderMap, name: &'static str, value: i64) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

fn blocked_response(retry_after: Duration) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "temporarily blocked",
            "retryAfter": retry_after.as_secs(),
        })),
    )
        .into_response()
}

fn limited_response(decision: &RateLimitDecision) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "rate limit exceeded",
            "remaining": decision.remaining,
            "resetAt": decision.reset_at_ms,
        })),
    )
        .into_response()
}

/// Client address for the IP-scoped limiter: first X-Forwarded-For hop
/// when present, otherwise the socket peer.
fn extract_client_ip(req: &Request<Body>, addr: SocketAddr) -> String {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| addr.ip().to_string())
}
