//! Handshake authentication.
//!
//! Bearer tokens come from the external issuer; the gateway only
//! verifies. The token is supplied as a `token` query parameter (the
//! connect-payload analog) or an `Authorization: Bearer` header, and is
//! checked before the transport handshake completes — a failed
//! verification never produces an upgraded socket.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Verified bearer token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Expiry, unix seconds.
    pub exp: usize,
}

/// Errors from handshake authentication.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),
}

/// HS256 verifier for gateway and API bearer tokens.
pub struct GatewayAuth {
    decoding: DecodingKey,
    validation: Validation,
}

impl GatewayAuth {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Verify a token and return its claims. Expiry is enforced.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    /// Extract the bearer token from a handshake: `token` query parameter
    /// first, `Authorization: Bearer` header as the fallback.
    pub fn token_from_handshake(
        query: &HashMap<String, String>,
        headers: &HeaderMap,
    ) -> Result<String, AuthError> {
        if let Some(token) = query.get("token").filter(|t| !t.is_empty()) {
            return Ok(token.clone());
        }
        headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or(AuthError::MissingToken)
    }
}
