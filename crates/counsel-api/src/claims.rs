use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use chrono::Utc;

use counsel_engine::RateLimit;
use counsel_engine::claims::Claimant;
use counsel_types::api::{ClaimTokenRequest, ConsumeClaimResponse, VerifyClaimResponse};

use crate::auth::{check_origin, client_ip, require_user};
use crate::error::ApiError;
use crate::state::AppState;
use crate::{parse_json, run_blocking};

const VERIFY_LIMIT: RateLimit = RateLimit::new(3600, 30);
const CONSUME_LIMIT: RateLimit = RateLimit::new(3600, 10);

/// POST /claims/verify
///
/// Resolve a claim link to the listing it unlocks.
pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<VerifyClaimResponse>, ApiError> {
    check_origin(&headers, &state.auth.allowed_origins)?;
    let req: ClaimTokenRequest = parse_json(&body)?;
    let ip = client_ip(&headers);

    let st = state.clone();
    let profile = run_blocking(move || {
        let now = Utc::now();
        st.limiter.check("verify-claim-token", &ip, VERIFY_LIMIT, now)?;
        st.claims.verify(&req.token, now)
    })
    .await?;

    Ok(Json(VerifyClaimResponse { success: true, profile }))
}

/// POST /claims/consume
///
/// Take ownership with a bearer-authenticated user.
pub async fn consume(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ConsumeClaimResponse>, ApiError> {
    check_origin(&headers, &state.auth.allowed_origins)?;
    let user = require_user(&headers, &state.auth)?;
    let req: ClaimTokenRequest = parse_json(&body)?;
    let ip = client_ip(&headers);

    let st = state.clone();
    let outcome = run_blocking(move || {
        let now = Utc::now();
        st.limiter.check("claim-profile", &ip, CONSUME_LIMIT, now)?;
        let claimant = Claimant { user_id: user.sub, email: user.email };
        st.claims.claim(&req.token, &claimant, now)
    })
    .await?;

    Ok(Json(ConsumeClaimResponse {
        success: true,
        listing_id: outcome.listing_id,
        slug: outcome.slug,
    }))
}
