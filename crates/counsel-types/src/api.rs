use serde::{Deserialize, Serialize};

use crate::models::{ListingSummary, OutreachTemplate};

// -- Claims --

#[derive(Debug, Deserialize)]
pub struct ClaimTokenRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyClaimResponse {
    pub success: bool,
    pub profile: ListingSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeClaimResponse {
    pub success: bool,
    pub listing_id: String,
    pub slug: String,
}

// -- Campaigns --

#[derive(Debug, Default, Deserialize)]
pub struct DripRunRequest {
    #[serde(default)]
    pub test_mode: bool,
    pub test_email: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct DripRunSummary {
    pub success: bool,
    pub sent: usize,
    pub skipped: usize,
    pub total_listings: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub deadline_exceeded: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct DigestRunRequest {
    pub max_emails: Option<usize>,
    #[serde(default)]
    pub test_mode: bool,
    pub test_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestPeriod {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Serialize)]
pub struct DigestRunSummary {
    pub success: bool,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    pub eligible: usize,
    pub total_listings: usize,
    pub period: DigestPeriod,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub deadline_exceeded: bool,
}

// -- Outreach --

#[derive(Debug, Deserialize)]
pub struct OutreachRequest {
    pub listing_id: String,
    pub template: OutreachTemplate,
}

#[derive(Debug, Serialize)]
pub struct OutreachResponse {
    pub success: bool,
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub emails_sent_today: i64,
    pub daily_limit: i64,
}

// -- Webhooks --

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    pub processed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

// -- Content cache --

#[derive(Debug, Deserialize)]
pub struct CachePutRequest {
    pub payload: serde_json::Value,
    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,
}

fn default_ttl_days() -> i64 {
    30
}

#[derive(Debug, Serialize)]
pub struct CacheEntryResponse {
    pub region: String,
    pub locality: String,
    pub payload: serde_json::Value,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

// -- Unsubscribe --

#[derive(Debug, Deserialize)]
pub struct UnsubscribeQuery {
    pub profile_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}
