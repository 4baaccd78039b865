pub mod auth;
pub mod campaigns;
pub mod claims;
pub mod content_cache;
pub mod error;
pub mod outreach;
pub mod state;
pub mod unsubscribe;
pub mod webhooks;

use axum::{
    Json, Router,
    body::Bytes,
    routing::{get, post},
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::error;

use counsel_engine::EngineError;

use crate::error::ApiError;
use crate::state::AppState;

/// All engine routes. CORS and tracing layers are added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/claims/verify", post(claims::verify))
        .route("/claims/consume", post(claims::consume))
        .route("/webhooks/email", post(webhooks::ingest))
        .route("/campaigns/drip/run", post(campaigns::run_drip))
        .route("/campaigns/digest/run", post(campaigns::run_digest))
        .route("/outreach/send", post(outreach::send))
        .route("/unsubscribe", get(unsubscribe::unsubscribe))
        .route(
            "/content-cache/{region}/{locality}",
            get(content_cache::get_entry).put(content_cache::put_entry),
        )
        .route("/health", get(health))
        .with_state(state)
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Run synchronous engine work on the blocking pool.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("Blocking task failed: {}", e);
            ApiError::from(EngineError::Upstream("task failed".into()))
        })?
        .map_err(ApiError::from)
}

/// Required JSON body.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::from(EngineError::InvalidRequest(format!("Invalid JSON body: {}", e))))
}

/// Optional JSON body: empty means defaults.
pub(crate) fn parse_optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_json(body)
}
