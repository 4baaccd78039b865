use anyhow::Result;

use crate::models::CacheRow;
use crate::{Database, OptionalExt};

impl Database {
    /// Only active, unexpired rows are returned.
    pub fn get_cache_entry(&self, region: &str, locality: &str, now: &str) -> Result<Option<CacheRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT region, locality, payload, expires_at, is_active FROM content_cache
                 WHERE region = ?1 AND locality = ?2 AND is_active = 1 AND expires_at > ?3",
                rusqlite::params![region, locality, now],
                |row| {
                    Ok(CacheRow {
                        region: row.get(0)?,
                        locality: row.get(1)?,
                        payload: row.get(2)?,
                        expires_at: row.get(3)?,
                        is_active: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn upsert_cache_entry(
        &self,
        region: &str,
        locality: &str,
        payload: &str,
        expires_at: &str,
        now: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO content_cache (region, locality, payload, expires_at, is_active, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5)
                 ON CONFLICT(region, locality) DO UPDATE SET
                     payload = excluded.payload,
                     expires_at = excluded.expires_at,
                     is_active = 1,
                     updated_at = excluded.updated_at",
                rusqlite::params![region, locality, payload, expires_at, now],
            )?;
            Ok(())
        })
    }

    /// Administrative switch used by data correction; an inactive row reads as a miss.
    pub fn deactivate_cache_entry(&self, region: &str, locality: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE content_cache SET is_active = 0 WHERE region = ?1 AND locality = ?2",
                rusqlite::params![region, locality],
            )?;
            Ok(changed)
        })
    }
}
