use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use chrono::Utc;

use counsel_types::api::{DigestRunRequest, DigestRunSummary, DripRunRequest, DripRunSummary};

use crate::auth::require_internal_key;
use crate::error::ApiError;
use crate::parse_optional_json;
use crate::state::AppState;

/// POST /campaigns/drip/run
///
/// Daily onboarding sequence trigger.
pub async fn run_drip(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DripRunSummary>, ApiError> {
    require_internal_key(&headers, &state.auth)?;
    let req: DripRunRequest = parse_optional_json(&body)?;
    let summary = state.campaigns.run_drip(&req, Utc::now()).await?;
    Ok(Json(summary))
}

/// POST /campaigns/digest/run
///
/// Weekly recap trigger.
pub async fn run_digest(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DigestRunSummary>, ApiError> {
    require_internal_key(&headers, &state.auth)?;
    let req: DigestRunRequest = parse_optional_json(&body)?;
    let summary = state.campaigns.run_digest(&req, Utc::now()).await?;
    Ok(Json(summary))
}
