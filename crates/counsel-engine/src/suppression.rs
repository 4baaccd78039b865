use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use counsel_db::{Database, normalize_email, to_db_time};
use counsel_types::models::SuppressionReason;

use crate::error::EngineError;

/// Authoritative do-not-contact list. Entries are permanent for automated
/// flows; there is deliberately no unsuppress here.
#[derive(Clone)]
pub struct SuppressionRegistry {
    db: Arc<Database>,
}

impl SuppressionRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Case-insensitive exact match.
    pub fn is_suppressed(&self, email: &str) -> Result<bool, EngineError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Ok(false);
        }
        Ok(self.db.is_suppressed(&email)?)
    }

    pub fn suppress(
        &self,
        email: &str,
        reason: SuppressionReason,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(EngineError::InvalidRequest("Missing email".into()));
        }
        self.db.upsert_suppression(&email, reason.as_str(), notes, &to_db_time(now))?;
        info!("Suppressed {} ({})", email, reason);
        Ok(())
    }
}
