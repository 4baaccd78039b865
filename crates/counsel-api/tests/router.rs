use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use counsel_api::auth::{INTERNAL_KEY_HEADER, create_token};
use counsel_api::router;
use counsel_api::state::{AppStateInner, AuthConfig};
use counsel_db::models::NewListing;
use counsel_db::{Database, to_db_time};
use counsel_engine::EventBus;
use counsel_engine::campaigns::{CampaignConfig, Pacing};
use counsel_engine::mailer::{EmailProvider, RecordingProvider};
use counsel_engine::webhook::{WebhookHeaders, WebhookSecret};

const JWT_SECRET: &str = "router-test-jwt";
const INTERNAL_KEY: &str = "router-test-internal";
const WEBHOOK_SECRET: &str = "whsec_c2hhcmVkLXNlY3JldC1mb3ItdGVzdHM=";
const ORIGIN: &str = "https://www.weddingcounselors.com";

struct Harness {
    app: Router,
    db: Arc<Database>,
    provider: Arc<RecordingProvider>,
}

fn harness_with(provider: Option<Arc<RecordingProvider>>) -> Harness {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let recording = provider.clone().unwrap_or_else(|| Arc::new(RecordingProvider::new()));
    let provider = provider.map(|p| p as Arc<dyn EmailProvider>);
    let config = CampaignConfig {
        pacing: Pacing { burst: 8, pause: StdDuration::ZERO },
        ..Default::default()
    };
    let auth = AuthConfig {
        jwt_secret: Some(JWT_SECRET.into()),
        internal_api_key: Some(INTERNAL_KEY.into()),
        allowed_origins: vec![ORIGIN.into()],
    };
    let state = AppStateInner::new(
        db.clone(),
        EventBus::new(),
        provider,
        Some(WebhookSecret::parse(WEBHOOK_SECRET).unwrap()),
        config,
        auth,
    );
    Harness { app: router(state), db, provider: recording }
}

fn harness() -> Harness {
    harness_with(Some(Arc::new(RecordingProvider::new())))
}

fn seed_unclaimed(db: &Database, id: &str, token: &str, email: &str) {
    db.insert_listing(&NewListing {
        id: id.into(),
        slug: format!("{}-slug", id),
        full_name: "Morgan Ellis".into(),
        email: Some(email.into()),
        city: Some("Portland".into()),
        state_province: Some("OR".into()),
        claim_token: Some(token.into()),
        claim_token_expires_at: Some(to_db_time(Utc::now() + Duration::days(7))),
        is_seeded: true,
        created_at: to_db_time(Utc::now() - Duration::days(3)),
        ..Default::default()
    })
    .unwrap();
}

fn bearer(user_id: &str) -> String {
    let token = create_token(JWT_SECRET, user_id, Some("owner@example.com"), Duration::hours(1)).unwrap();
    format!("Bearer {}", token)
}

fn post(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

async fn send_text(app: &Router, req: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

fn claim_request(uri: &str, token: &str, ip: &str) -> Request<Body> {
    post(uri)
        .header(header::ORIGIN, ORIGIN)
        .header("x-forwarded-for", ip)
        .body(Body::from(json!({ "token": token }).to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let h = harness();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn verify_classifies_tokens() {
    let h = harness();
    seed_unclaimed(&h.db, "l1", "good-token", "l1@example.com");

    let (status, _, body) = send(&h.app, claim_request("/claims/verify", "good-token", "9.9.9.1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profile"]["id"], "l1");

    let (status, _, body) = send(&h.app, claim_request("/claims/verify", "nope", "9.9.9.1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Invalid or expired claim link");

    let (status, _, body) = send(&h.app, claim_request("/claims/verify", "", "9.9.9.1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing token");
}

#[tokio::test]
async fn verify_rejects_foreign_origin() {
    let h = harness();
    let req = post("/claims/verify")
        .header(header::ORIGIN, "https://evil.example")
        .body(Body::from(r#"{"token":"x"}"#))
        .unwrap();
    let (status, _, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Origin not allowed");
}

#[tokio::test]
async fn verify_is_rate_limited_per_ip() {
    let h = harness();
    for _ in 0..30 {
        let (status, _, _) = send(&h.app, claim_request("/claims/verify", "missing", "5.5.5.5")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    let (status, headers, _) = send(&h.app, claim_request("/claims/verify", "missing", "5.5.5.5")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers[header::RETRY_AFTER], "3600");

    let (status, _, _) = send(&h.app, claim_request("/claims/verify", "missing", "6.6.6.6")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn consume_requires_user_and_claims_once() {
    let h = harness();
    seed_unclaimed(&h.db, "l1", "claim-me", "l1@example.com");

    let (status, _, _) = send(&h.app, claim_request("/claims/consume", "claim-me", "7.7.7.7")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let authed = |token: &str| {
        post("/claims/consume")
            .header(header::ORIGIN, ORIGIN)
            .header(header::AUTHORIZATION, bearer("user-1"))
            .body(Body::from(json!({ "token": token }).to_string()))
            .unwrap()
    };

    let (status, _, body) = send(&h.app, authed("claim-me")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["listingId"], "l1");
    assert_eq!(body["slug"], "l1-slug");

    let (status, _, body) = send(&h.app, authed("claim-me")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Profile already claimed");

    let listing = h.db.get_listing("l1").unwrap().unwrap();
    assert!(listing.is_claimed);
    assert_eq!(listing.owner_id.as_deref(), Some("user-1"));
}

fn signed_webhook(payload: &str, signature_override: Option<&str>) -> Request<Body> {
    let secret = WebhookSecret::parse(WEBHOOK_SECRET).unwrap();
    let ts = Utc::now().timestamp().to_string();
    let headers = WebhookHeaders { delivery_id: "msg_router", timestamp: &ts, signatures: "" };
    let signature = match signature_override {
        Some(sig) => sig.to_string(),
        None => secret.sign(&headers, payload.as_bytes()).unwrap(),
    };
    post("/webhooks/email")
        .header("svix-id", "msg_router")
        .header("svix-timestamp", ts)
        .header("svix-signature", signature)
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn webhook_bounce_suppresses_and_bad_signature_does_not() {
    let h = harness();
    let payload = json!({
        "type": "email.bounced",
        "created_at": "2026-01-01T00:00:00Z",
        "data": { "email_id": "em_9", "to": ["gone@example.com"], "subject": "Hello" }
    })
    .to_string();

    let (status, _, _) = send(&h.app, signed_webhook(&payload, Some("v1,AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(!h.db.is_suppressed("gone@example.com").unwrap());

    let (status, _, body) = send(&h.app, signed_webhook(&payload, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["processed"], 1);
    assert!(h.db.is_suppressed("gone@example.com").unwrap());
}

#[tokio::test]
async fn drip_run_needs_internal_key() {
    let h = harness();
    seed_unclaimed(&h.db, "l1", "t1", "fresh@example.com");

    let req = post("/campaigns/drip/run").body(Body::empty()).unwrap();
    let (status, _, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = post("/campaigns/drip/run")
        .header(INTERNAL_KEY_HEADER, INTERNAL_KEY)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sent"], 1);
    assert_eq!(h.provider.sent().len(), 1);
}

#[tokio::test]
async fn campaign_without_provider_is_misconfigured() {
    let h = harness_with(None);
    let req = post("/campaigns/digest/run")
        .header(INTERNAL_KEY_HEADER, INTERNAL_KEY)
        .body(Body::from(r#"{"max_emails": 5}"#))
        .unwrap();
    let (status, _, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "RESEND_API_KEY not configured");
}

#[tokio::test]
async fn unsubscribe_sets_preference() {
    let h = harness();
    seed_unclaimed(&h.db, "l1", "t1", "l1@example.com");

    let req = Request::builder()
        .uri("/unsubscribe?profile_id=l1&type=marketing")
        .body(Body::empty())
        .unwrap();
    let (status, html) = send_text(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("Morgan Ellis"));
    let prefs = h.db.get_listing("l1").unwrap().unwrap().email_preferences;
    assert_eq!(prefs, r#"{"marketing":false}"#);

    let req = Request::builder().uri("/unsubscribe?profile_id=ghost").body(Body::empty()).unwrap();
    assert_eq!(send_text(&h.app, req).await.0, StatusCode::NOT_FOUND);

    let req = Request::builder().uri("/unsubscribe").body(Body::empty()).unwrap();
    assert_eq!(send_text(&h.app, req).await.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unsubscribe_keeps_unrelated_preferences() {
    let h = harness();
    seed_unclaimed(&h.db, "l1", "t1", "l1@example.com");
    h.db.update_email_preferences("l1", r#"{"digest_day":"monday","marketing":true}"#).unwrap();

    let req = Request::builder()
        .uri("/unsubscribe?profile_id=l1&type=weekly_digest")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send_text(&h.app, req).await.0, StatusCode::OK);

    let raw = h.db.get_listing("l1").unwrap().unwrap().email_preferences;
    let prefs: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(prefs, json!({ "digest_day": "monday", "marketing": true, "weekly_digest": false }));
}

#[tokio::test]
async fn content_cache_rejects_oversized_ttl() {
    let h = harness();
    let put = Request::builder()
        .method("PUT")
        .uri("/content-cache/tx/austin")
        .header(header::CONTENT_TYPE, "application/json")
        .header(INTERNAL_KEY_HEADER, INTERNAL_KEY)
        .body(Body::from(json!({ "payload": {}, "ttl_days": 200_000_000_000i64 }).to_string()))
        .unwrap();
    let (status, _, _) = send(&h.app, put).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn content_cache_put_then_get() {
    let h = harness();
    let put = Request::builder()
        .method("PUT")
        .uri("/content-cache/TX/Austin")
        .header(header::CONTENT_TYPE, "application/json")
        .header(INTERNAL_KEY_HEADER, INTERNAL_KEY)
        .body(Body::from(json!({ "payload": { "title": "Austin" }, "ttl_days": 30 }).to_string()))
        .unwrap();
    let (status, _, body) = send(&h.app, put).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["region"], "tx");

    let get = Request::builder().uri("/content-cache/tx/austin").body(Body::empty()).unwrap();
    let (status, _, body) = send(&h.app, get).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payload"]["title"], "Austin");

    let miss = Request::builder().uri("/content-cache/tx/dallas").body(Body::empty()).unwrap();
    assert_eq!(send(&h.app, miss).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn outreach_is_admin_only() {
    let h = harness();
    seed_unclaimed(&h.db, "l1", "t1", "prospect@example.com");
    let request = || {
        post("/outreach/send")
            .header(header::AUTHORIZATION, bearer("user-9"))
            .body(Body::from(r#"{"listing_id":"l1","template":"initial_outreach"}"#))
            .unwrap()
    };

    let (status, _, _) = send(&h.app, request()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    h.db.add_admin("user-9").unwrap();
    let (status, _, body) = send(&h.app, request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["emails_sent_today"], 1);
    assert!(h.provider.sent()[0].html.contains("/claim/t1"));
}
