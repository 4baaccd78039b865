use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
};
use tracing::{error, info};

use counsel_engine::templates::escape_html;
use counsel_types::api::UnsubscribeQuery;
use counsel_types::models::{EmailPreferences, PreferenceKind};

use crate::state::AppState;

enum Outcome {
    Done(String),
    Missing,
}

/// GET /unsubscribe?profile_id=..&type=..
///
/// One-click opt-out from email links. The listing id is the only
/// credential, so the only thing it can do is turn mail off.
pub async fn unsubscribe(
    State(state): State<AppState>,
    Query(query): Query<UnsubscribeQuery>,
) -> (StatusCode, Html<String>) {
    let Some(listing_id) = query.profile_id.filter(|id| !id.trim().is_empty()) else {
        return page(StatusCode::BAD_REQUEST, None, "Missing profile ID");
    };
    let kind_name = query.kind.unwrap_or_else(|| PreferenceKind::WeeklyDigest.as_str().to_string());
    let Some(kind) = PreferenceKind::parse(&kind_name) else {
        return page(StatusCode::BAD_REQUEST, None, "Unknown email type");
    };

    let db = state.db.clone();
    let id = listing_id.clone();
    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<Outcome> {
        let Some(listing) = db.get_listing(&id)? else {
            return Ok(Outcome::Missing);
        };
        let mut prefs = EmailPreferences::from_json(&listing.email_preferences);
        prefs.set(kind, false);
        db.update_email_preferences(&id, &prefs.to_json())?;
        Ok(Outcome::Done(listing.full_name))
    })
    .await;

    match result {
        Ok(Ok(Outcome::Done(name))) => {
            info!("Listing {} unsubscribed from {}", listing_id, kind.as_str());
            page(StatusCode::OK, Some(kind), &name)
        }
        Ok(Ok(Outcome::Missing)) => page(StatusCode::NOT_FOUND, None, "Profile not found"),
        Ok(Err(e)) => {
            error!("Unsubscribe for {} failed: {:#}", listing_id, e);
            page(StatusCode::INTERNAL_SERVER_ERROR, None, "Something went wrong")
        }
        Err(e) => {
            error!("Unsubscribe task failed: {}", e);
            page(StatusCode::INTERNAL_SERVER_ERROR, None, "Something went wrong")
        }
    }
}

/// `done` is the preference turned off; `None` renders `text` as an error.
fn page(status: StatusCode, done: Option<PreferenceKind>, text: &str) -> (StatusCode, Html<String>) {
    let text = escape_html(text);
    let (title, color, body) = match done {
        Some(kind) => {
            let what = match kind {
                PreferenceKind::WeeklyDigest => "weekly digest emails",
                PreferenceKind::Marketing => "tips and onboarding emails",
            };
            (
                "Unsubscribed",
                "#0d9488",
                format!(
                    "<p>Hi {text}, you have been unsubscribed from {what}. You can turn them back on from your dashboard.</p>\
                     <p>Inquiry notifications from couples are not affected.</p>"
                ),
            )
        }
        None => (
            "Error",
            "#dc2626",
            format!("<p>{text}. Contact hello@weddingcounselors.com if you need help.</p>"),
        ),
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} - Wedding Counselors</title>
<style>
body {{ font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; background: #f9fafb; display: flex; justify-content: center; padding-top: 15vh; }}
.card {{ background: #fff; padding: 2rem; border-radius: 12px; max-width: 400px; text-align: center; }}
h1 {{ color: {color}; font-size: 1.25rem; }}
p {{ color: #6b7280; line-height: 1.5; }}
</style>
</head>
<body><div class="card"><h1>{title}</h1>{body}</div></body>
</html>"#
    );
    (status, Html(html))
}
