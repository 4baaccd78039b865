use std::collections::HashMap;

use anyhow::Result;
use rusqlite::Connection;

use crate::Database;

/// Activity tables are written by the browsing front-end; the engine only
/// aggregates them for digest and drip stats.
impl Database {
    pub fn record_view(&self, listing_id: &str, at: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO profile_views (listing_id, created_at) VALUES (?1, ?2)",
                rusqlite::params![listing_id, at],
            )?;
            Ok(())
        })
    }

    pub fn record_inquiry(&self, listing_id: &str, at: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO profile_inquiries (listing_id, created_at) VALUES (?1, ?2)",
                rusqlite::params![listing_id, at],
            )?;
            Ok(())
        })
    }

    /// listing_id -> views at or after `since`. Listings with no views are absent.
    pub fn view_counts_since(&self, since: &str) -> Result<HashMap<String, i64>> {
        self.with_conn(|conn| grouped_counts(conn, "profile_views", since))
    }

    pub fn inquiry_counts_since(&self, since: &str) -> Result<HashMap<String, i64>> {
        self.with_conn(|conn| grouped_counts(conn, "profile_inquiries", since))
    }
}

fn grouped_counts(conn: &Connection, table: &str, since: &str) -> Result<HashMap<String, i64>> {
    let sql = format!(
        "SELECT listing_id, COUNT(*) FROM {} WHERE created_at >= ?1 GROUP BY listing_id",
        table
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([since], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<std::result::Result<HashMap<_, _>, _>>()?;
    Ok(rows)
}
