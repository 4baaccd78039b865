use anyhow::Result;

use crate::Database;

impl Database {
    /// Requests recorded for the pair at or after `since`.
    pub fn count_requests_since(&self, endpoint: &str, caller_key: &str, since: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM request_logs
                 WHERE endpoint = ?1 AND caller_key = ?2 AND created_at >= ?3",
                rusqlite::params![endpoint, caller_key, since],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn record_request(&self, endpoint: &str, caller_key: &str, at: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO request_logs (endpoint, caller_key, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![endpoint, caller_key, at],
            )?;
            Ok(())
        })
    }

    pub fn prune_request_logs(&self, before: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute("DELETE FROM request_logs WHERE created_at < ?1", [before])?;
            Ok(removed)
        })
    }
}
