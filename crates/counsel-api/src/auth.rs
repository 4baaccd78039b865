use axum::http::{HeaderMap, header};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use counsel_engine::EngineError;

use crate::error::ApiError;
use crate::run_blocking;
use crate::state::{AppState, AuthConfig};

pub const INTERNAL_KEY_HEADER: &str = "x-internal-api-key";

/// Bearer token claims for site users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: usize,
}

/// Origin allowlist. An empty list allows everything; otherwise a request
/// without an `Origin` header is rejected too.
pub fn check_origin(headers: &HeaderMap, allowed: &[String]) -> Result<(), ApiError> {
    if allowed.is_empty() {
        return Ok(());
    }
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    match origin {
        Some(origin) if allowed.iter().any(|a| a == origin) => Ok(()),
        _ => {
            debug!("Rejected origin {:?}", origin);
            Err(EngineError::Forbidden("Origin not allowed".into()).into())
        }
    }
}

pub fn require_internal_key(headers: &HeaderMap, auth: &AuthConfig) -> Result<(), ApiError> {
    let expected = auth
        .internal_api_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| EngineError::Misconfigured("INTERNAL_API_KEY not configured".into()))?;

    let provided = headers
        .get(INTERNAL_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !keys_match(provided, expected) {
        return Err(EngineError::Unauthorized.into());
    }
    Ok(())
}

/// Constant-time key comparison. Both sides are MACed under the expected key
/// so inputs of any length reduce to equal-size tags before `verify_slice`.
fn keys_match(provided: &str, expected: &str) -> bool {
    let tag = |value: &str| {
        Hmac::<Sha256>::new_from_slice(expected.as_bytes()).map(|mut mac| {
            mac.update(value.as_bytes());
            mac
        })
    };
    match (tag(provided), tag(expected)) {
        (Ok(provided), Ok(expected)) => provided.verify_slice(&expected.finalize().into_bytes()).is_ok(),
        _ => false,
    }
}

/// Validate the `Authorization: Bearer` token.
pub fn require_user(headers: &HeaderMap, auth: &AuthConfig) -> Result<Claims, ApiError> {
    let secret = auth
        .jwt_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EngineError::Misconfigured("COUNSEL_JWT_SECRET not configured".into()))?;

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(EngineError::Unauthorized)?;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!("Bearer token rejected: {}", e);
        EngineError::Unauthorized
    })?;

    Ok(data.claims)
}

/// Authenticated user who is also an active admin.
pub async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<Claims, ApiError> {
    let claims = require_user(headers, &state.auth)?;

    let db = state.db.clone();
    let user_id = claims.sub.clone();
    let is_admin = run_blocking(move || Ok(db.is_active_admin(&user_id)?)).await?;
    if !is_admin {
        return Err(EngineError::Forbidden("Forbidden".into()).into());
    }
    Ok(claims)
}

/// Caller address for rate limiting, as reported by the edge proxy.
pub fn client_ip(headers: &HeaderMap) -> String {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(ip) = get("cf-connecting-ip") {
        return ip.to_string();
    }
    if let Some(forwarded) = get("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            return first.trim().to_string();
        }
    }
    if let Some(ip) = get("x-real-ip") {
        return ip.to_string();
    }
    "unknown".to_string()
}

/// Mint a bearer token. The site's auth service does this in production.
pub fn create_token(secret: &str, user_id: &str, email: Option<&str>, ttl: Duration) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.map(str::to_string),
        exp: (Utc::now() + ttl).timestamp() as usize,
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))?;
    Ok(token)
}
