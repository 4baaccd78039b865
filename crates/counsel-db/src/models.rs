/// Database row types. These map directly to SQLite rows and keep
/// timestamps as stored text; callers parse with `from_db_time`.

#[derive(Debug, Clone)]
pub struct ListingRow {
    pub id: String,
    pub slug: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub profession: Option<String>,
    pub photo_url: Option<String>,
    pub city: Option<String>,
    pub state_province: Option<String>,
    pub is_claimed: bool,
    pub owner_id: Option<String>,
    pub claimed_at: Option<String>,
    pub claim_token: Option<String>,
    pub claim_token_expires_at: Option<String>,
    pub email_preferences: String,
    pub moderation_status: String,
    pub is_seeded: bool,
    pub is_hidden: bool,
    pub hidden_reason: Option<String>,
    pub created_at: String,
}

/// Insert shape for a listing created by import or registration.
#[derive(Debug, Clone, Default)]
pub struct NewListing {
    pub id: String,
    pub slug: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub profession: Option<String>,
    pub photo_url: Option<String>,
    pub city: Option<String>,
    pub state_province: Option<String>,
    pub claim_token: Option<String>,
    pub claim_token_expires_at: Option<String>,
    pub is_seeded: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct SuppressionRow {
    pub email: String,
    pub reason: String,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct SendLogRow {
    pub listing_id: String,
    pub campaign_type: String,
    pub step_or_period: String,
    pub sent_at: String,
    pub provider_message_id: Option<String>,
    pub stats_snapshot: String,
}

#[derive(Debug, Clone)]
pub struct CacheRow {
    pub region: String,
    pub locality: String,
    pub payload: String,
    pub expires_at: String,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct OutreachRow {
    pub email: String,
    pub listing_id: Option<String>,
    pub status: String,
    pub template: Option<String>,
    pub contact_count: i64,
    pub last_contacted_at: Option<String>,
}
