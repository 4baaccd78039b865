use anyhow::Result;

use crate::models::OutreachRow;
use crate::{Database, OptionalExt};

impl Database {
    // -- Outreach tracking --

    /// Status update for an existing tracking row. Returns rows changed;
    /// addresses never contacted by outreach have no row and are left alone.
    ///
    /// `claimed` is terminal. `delivered` never replaces `bounced` or
    /// `complained`, so a late or redelivered delivery event cannot undo them.
    pub fn update_outreach_status(
        &self,
        email: &str,
        status: &str,
        last_contacted_at: Option<&str>,
        now: &str,
    ) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE provider_outreach
                 SET status = ?2,
                     last_contacted_at = COALESCE(?3, last_contacted_at),
                     updated_at = ?4
                 WHERE email = ?1
                   AND status <> 'claimed'
                   AND NOT (?2 = 'delivered' AND status IN ('bounced', 'complained'))",
                rusqlite::params![email, status, last_contacted_at, now],
            )?;
            Ok(changed)
        })
    }

    /// Record an outreach send, bumping the contact counter.
    pub fn record_outreach_contact(
        &self,
        email: &str,
        listing_id: &str,
        name: &str,
        template: &str,
        now: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO provider_outreach
                     (email, listing_id, name, status, template, contact_count, last_contacted_at, updated_at)
                 VALUES (?1, ?2, ?3, 'emailed', ?4, 1, ?5, ?5)
                 ON CONFLICT(email) DO UPDATE SET
                     listing_id = excluded.listing_id,
                     name = excluded.name,
                     status = 'emailed',
                     template = excluded.template,
                     contact_count = provider_outreach.contact_count + 1,
                     last_contacted_at = excluded.last_contacted_at,
                     updated_at = excluded.updated_at",
                rusqlite::params![email, listing_id, name, template, now],
            )?;
            Ok(())
        })
    }

    pub fn mark_outreach_claimed(&self, email: &str, listing_id: &str, name: &str, now: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO provider_outreach (email, listing_id, name, status, updated_at)
                 VALUES (?1, ?2, ?3, 'claimed', ?4)
                 ON CONFLICT(email) DO UPDATE SET
                     listing_id = excluded.listing_id,
                     name = excluded.name,
                     status = 'claimed',
                     updated_at = excluded.updated_at",
                rusqlite::params![email, listing_id, name, now],
            )?;
            Ok(())
        })
    }

    pub fn get_outreach(&self, email: &str) -> Result<Option<OutreachRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT email, listing_id, status, template, contact_count, last_contacted_at
                 FROM provider_outreach WHERE email = ?1",
                [email],
                |row| {
                    Ok(OutreachRow {
                        email: row.get(0)?,
                        listing_id: row.get(1)?,
                        status: row.get(2)?,
                        template: row.get(3)?,
                        contact_count: row.get(4)?,
                        last_contacted_at: row.get(5)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Provider events (audit trail) --

    pub fn insert_provider_event(
        &self,
        email: &str,
        listing_id: Option<&str>,
        event_type: &str,
        event_data: &str,
        now: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO provider_events (provider_email, listing_id, event_type, event_data, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![email, listing_id, event_type, event_data, now],
            )?;
            Ok(())
        })
    }

    pub fn count_provider_events_since(&self, event_type: &str, since: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM provider_events WHERE event_type = ?1 AND created_at >= ?2",
                rusqlite::params![event_type, since],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    // -- Settings / admin --

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT value FROM app_settings WHERE key = ?1", [key], |row| row.get(0))
                .optional()
        })
    }

    pub fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO app_settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![key, value],
            )?;
            Ok(())
        })
    }

    pub fn is_active_admin(&self, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let hit: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM admin_users WHERE id = ?1 AND is_active = 1",
                    [user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(hit.is_some())
        })
    }

    pub fn add_admin(&self, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO admin_users (id, is_active) VALUES (?1, 1)",
                [user_id],
            )?;
            Ok(())
        })
    }
}
