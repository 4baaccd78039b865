use anyhow::Result;

use crate::models::SendLogRow;
use crate::{Database, OptionalExt};

impl Database {
    pub fn has_send_log(&self, listing_id: &str, campaign_type: &str, step_or_period: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let hit: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM campaign_send_log
                     WHERE listing_id = ?1 AND campaign_type = ?2 AND step_or_period = ?3",
                    rusqlite::params![listing_id, campaign_type, step_or_period],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(hit.is_some())
        })
    }

    /// Append a ledger row. Returns `false` when the key already existed,
    /// which callers treat as "already sent".
    pub fn insert_send_log(&self, entry: &SendLogRow) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO campaign_send_log
                     (listing_id, campaign_type, step_or_period, sent_at, provider_message_id, stats_snapshot)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    entry.listing_id,
                    entry.campaign_type,
                    entry.step_or_period,
                    entry.sent_at,
                    entry.provider_message_id,
                    entry.stats_snapshot,
                ],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn count_send_logs(&self, campaign_type: &str, step_or_period: Option<&str>) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM campaign_send_log
                 WHERE campaign_type = ?1 AND (?2 IS NULL OR step_or_period = ?2)",
                rusqlite::params![campaign_type, step_or_period],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}
