use anyhow::Result;

use crate::models::SuppressionRow;
use crate::{Database, OptionalExt};

impl Database {
    /// `email` must already be normalized.
    pub fn is_suppressed(&self, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let hit: Option<i64> = conn
                .query_row("SELECT 1 FROM suppressions WHERE email = ?1", [email], |row| row.get(0))
                .optional()?;
            Ok(hit.is_some())
        })
    }

    /// Insert or refresh a suppression. The original `created_at` survives.
    pub fn upsert_suppression(&self, email: &str, reason: &str, notes: Option<&str>, now: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO suppressions (email, reason, notes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(email) DO UPDATE SET
                     reason = excluded.reason,
                     notes = excluded.notes,
                     updated_at = excluded.updated_at",
                rusqlite::params![email, reason, notes, now],
            )?;
            Ok(())
        })
    }

    pub fn get_suppression(&self, email: &str) -> Result<Option<SuppressionRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT email, reason, notes, created_at, updated_at FROM suppressions WHERE email = ?1",
                [email],
                |row| {
                    Ok(SuppressionRow {
                        email: row.get(0)?,
                        reason: row.get(1)?,
                        notes: row.get(2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }
}
