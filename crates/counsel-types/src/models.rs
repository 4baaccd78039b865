use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Why an address is on the do-not-contact list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    Bounce,
    Complaint,
    Manual,
}

impl SuppressionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bounce => "bounce",
            Self::Complaint => "complaint",
            Self::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bounce" => Some(Self::Bounce),
            "complaint" => Some(Self::Complaint),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Campaign families recorded in the send ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignKind {
    Drip,
    Weekly,
    Outreach,
}

impl CampaignKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Drip => "drip",
            Self::Weekly => "weekly",
            Self::Outreach => "outreach",
        }
    }
}

/// Per-listing email preference switches. A missing key means "allowed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceKind {
    Marketing,
    WeeklyDigest,
}

impl PreferenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Marketing => "marketing",
            Self::WeeklyDigest => "weekly_digest",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "marketing" => Some(Self::Marketing),
            "weekly_digest" => Some(Self::WeeklyDigest),
            _ => None,
        }
    }
}

/// The `email_preferences` JSON object stored on a listing. Keys this
/// crate does not know about are kept as-is when the object is written back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailPreferences(Map<String, Value>);

impl EmailPreferences {
    /// Only an explicit JSON `false` opts out.
    pub fn allows(&self, kind: PreferenceKind) -> bool {
        !matches!(self.0.get(kind.as_str()), Some(Value::Bool(false)))
    }

    pub fn set(&mut self, kind: PreferenceKind, enabled: bool) {
        self.0.insert(kind.as_str().to_string(), Value::Bool(enabled));
    }

    /// Lenient parse: anything that is not a JSON object counts as empty.
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(Value::Object(map)) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".into())
    }
}

/// Status column of the `provider_outreach` tracking table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutreachStatus {
    Emailed,
    Delivered,
    Bounced,
    Complained,
    Claimed,
}

impl OutreachStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Emailed => "emailed",
            Self::Delivered => "delivered",
            Self::Bounced => "bounced",
            Self::Complained => "complained",
            Self::Claimed => "claimed",
        }
    }
}

/// Cold outreach templates an admin can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutreachTemplate {
    InitialOutreach,
    ClaimReminder,
}

impl OutreachTemplate {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitialOutreach => "initial_outreach",
            Self::ClaimReminder => "claim_reminder",
        }
    }
}

/// Public view of an unclaimed listing, shown on the claim page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSummary {
    pub id: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub profession: Option<String>,
    pub city: Option<String>,
    pub state_province: Option<String>,
    pub slug: String,
}
