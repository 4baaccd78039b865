use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use chrono::Utc;
use tracing::info;

use counsel_types::api::{OutreachRequest, OutreachResponse};

use crate::auth::require_admin;
use crate::error::ApiError;
use crate::parse_json;
use crate::state::AppState;

/// POST /outreach/send
///
/// Admin-triggered cold outreach for one listing.
pub async fn send(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<OutreachResponse>, ApiError> {
    let admin = require_admin(&state, &headers).await?;
    let req: OutreachRequest = parse_json(&body)?;

    info!("Admin {} requested {} for {}", admin.sub, req.template.as_str(), req.listing_id);
    let response = state
        .campaigns
        .send_outreach(&req.listing_id, req.template, Utc::now())
        .await?;
    Ok(Json(response))
}
