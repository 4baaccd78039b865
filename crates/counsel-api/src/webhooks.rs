use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use chrono::Utc;

use counsel_engine::webhook::WebhookHeaders;
use counsel_types::api::WebhookAck;

use crate::error::ApiError;
use crate::run_blocking;
use crate::state::AppState;

/// First present header among `names`, or "".
fn header_value(headers: &HeaderMap, names: &[&str]) -> String {
    names
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        .unwrap_or("")
        .to_string()
}

/// POST /webhooks/email
///
/// Delivery events from the email provider.
///
/// Signature headers follow the Svix scheme the provider uses; the
/// unprefixed `webhook-*` names are accepted as well.
pub async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let delivery_id = header_value(&headers, &["svix-id", "webhook-id"]);
    let timestamp = header_value(&headers, &["svix-timestamp", "webhook-timestamp"]);
    let signatures = header_value(&headers, &["svix-signature", "webhook-signature"]);

    let st = state.clone();
    let outcome = run_blocking(move || {
        let headers = WebhookHeaders {
            delivery_id: &delivery_id,
            timestamp: &timestamp,
            signatures: &signatures,
        };
        st.webhooks.handle(&body, &headers, Utc::now())
    })
    .await?;

    Ok(Json(WebhookAck {
        success: true,
        processed: outcome.processed,
        errors: outcome.errors,
    }))
}
