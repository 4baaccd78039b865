use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};
use chrono::Utc;

use counsel_engine::EngineError;
use counsel_types::api::{CacheEntryResponse, CachePutRequest};

use crate::auth::require_internal_key;
use crate::error::ApiError;
use crate::state::AppState;
use crate::{parse_json, run_blocking};

/// GET /content-cache/{region}/{locality}
pub async fn get_entry(
    State(state): State<AppState>,
    Path((region, locality)): Path<(String, String)>,
) -> Result<Json<CacheEntryResponse>, ApiError> {
    let st = state.clone();
    let entry = run_blocking(move || st.cache.get(&region, &locality, Utc::now()))
        .await?
        .ok_or_else(|| EngineError::NotFound("Not cached".into()))?;

    Ok(Json(CacheEntryResponse {
        region: entry.region,
        locality: entry.locality,
        payload: entry.payload,
        expires_at: entry.expires_at,
    }))
}

/// PUT /content-cache/{region}/{locality}
///
/// Store generated content.
pub async fn put_entry(
    State(state): State<AppState>,
    Path((region, locality)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CacheEntryResponse>, ApiError> {
    require_internal_key(&headers, &state.auth)?;
    let req: CachePutRequest = parse_json(&body)?;

    let st = state.clone();
    let (r, l, payload) = (region.clone(), locality.clone(), req.payload.clone());
    let expires_at = run_blocking(move || st.cache.put(&r, &l, &payload, req.ttl_days, Utc::now())).await?;

    Ok(Json(CacheEntryResponse {
        region: region.trim().to_lowercase(),
        locality: locality.trim().to_lowercase(),
        payload: req.payload,
        expires_at,
    }))
}
