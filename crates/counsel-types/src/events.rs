use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events published by the engine after an authoritative state change.
/// Consumers are bookkeeping only; nothing here is part of the transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DomainEvent {
    /// A listing moved to `claimed` through a consumed claim token.
    ListingClaimed {
        listing_id: String,
        owner_id: String,
        owner_email: Option<String>,
        listing_email: Option<String>,
        full_name: String,
        city: Option<String>,
        state_province: Option<String>,
        claimed_at: DateTime<Utc>,
    },
}

/// Delivery-provider webhook body.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderWebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub created_at: String,
    pub data: ProviderWebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderWebhookData {
    #[serde(default)]
    pub email_id: String,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub subject: String,
}

/// Provider event types the engine acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryEventKind {
    Bounced,
    Complained,
    Delivered,
}

impl DeliveryEventKind {
    pub fn parse(event_type: &str) -> Option<Self> {
        match event_type {
            "email.bounced" => Some(Self::Bounced),
            "email.complained" => Some(Self::Complained),
            "email.delivered" => Some(Self::Delivered),
            _ => None,
        }
    }
}
