use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use counsel_db::{Database, from_db_time, to_db_time};

use crate::error::EngineError;

/// Expiries stay within four-digit years so stored timestamps keep sorting as text.
pub const MAX_TTL_DAYS: i64 = 36_500;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedContent {
    pub region: String,
    pub locality: String,
    pub payload: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

/// TTL-bound store of generated page content keyed by (region, locality).
/// Staleness is resolved by expiry alone; a miss is not an error.
#[derive(Clone)]
pub struct ContentCache {
    db: Arc<Database>,
}

impl ContentCache {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn get(&self, region: &str, locality: &str, now: DateTime<Utc>) -> Result<Option<CachedContent>, EngineError> {
        let (region, locality) = cache_key(region, locality)?;
        let Some(row) = self.db.get_cache_entry(&region, &locality, &to_db_time(now))? else {
            return Ok(None);
        };

        let payload = match serde_json::from_str(&row.payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Corrupt cache payload for {}/{}: {}", region, locality, e);
                return Ok(None);
            }
        };

        Ok(Some(CachedContent {
            region: row.region,
            locality: row.locality,
            payload,
            expires_at: from_db_time(&row.expires_at)?,
        }))
    }

    /// Upsert and (re)activate. Returns the new expiry.
    pub fn put(
        &self,
        region: &str,
        locality: &str,
        payload: &serde_json::Value,
        ttl_days: i64,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, EngineError> {
        if ttl_days <= 0 {
            return Err(EngineError::InvalidRequest("ttl_days must be positive".into()));
        }
        if ttl_days > MAX_TTL_DAYS {
            return Err(EngineError::InvalidRequest(format!("ttl_days must be at most {}", MAX_TTL_DAYS)));
        }
        let (region, locality) = cache_key(region, locality)?;
        let expires_at = Duration::try_days(ttl_days)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| EngineError::InvalidRequest("ttl_days is out of range".into()))?;

        self.db.upsert_cache_entry(
            &region,
            &locality,
            &payload.to_string(),
            &to_db_time(expires_at),
            &to_db_time(now),
        )?;
        Ok(expires_at)
    }
}

fn cache_key(region: &str, locality: &str) -> Result<(String, String), EngineError> {
    let region = region.trim().to_lowercase();
    let locality = locality.trim().to_lowercase();
    if region.is_empty() || locality.is_empty() {
        return Err(EngineError::InvalidRequest("region and locality are required".into()));
    }
    Ok((region, locality))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn cache() -> (Arc<Database>, ContentCache) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        (db.clone(), ContentCache::new(db))
    }

    #[test]
    fn hit_until_expiry() {
        let (_db, cache) = cache();
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let payload = json!({ "headline": "Premarital counseling in Austin" });

        let expires_at = cache.put("tx", "austin", &payload, 30, now).unwrap();
        assert_eq!(expires_at, now + Duration::days(30));

        let hit = cache.get("TX", "Austin", now).unwrap().unwrap();
        assert_eq!(hit.payload, payload);

        assert!(cache.get("tx", "austin", expires_at).unwrap().is_none());
        assert!(cache.get("tx", "austin", expires_at + Duration::seconds(1)).unwrap().is_none());
    }

    #[test]
    fn put_overwrites_and_reactivates() {
        let (db, cache) = cache();
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();

        cache.put("tx", "austin", &json!({ "v": 1 }), 30, now).unwrap();
        db.deactivate_cache_entry("tx", "austin").unwrap();
        assert!(cache.get("tx", "austin", now).unwrap().is_none());

        cache.put("tx", "austin", &json!({ "v": 2 }), 30, now).unwrap();
        assert_eq!(cache.get("tx", "austin", now).unwrap().unwrap().payload, json!({ "v": 2 }));
    }

    #[test]
    fn rejects_bad_input() {
        let (_db, cache) = cache();
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        assert!(cache.put("tx", "austin", &json!({}), 0, now).is_err());
        assert!(cache.get("", "austin", now).is_err());
    }

    #[test]
    fn oversized_ttl_is_invalid_not_a_panic() {
        let (_db, cache) = cache();
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        for ttl in [i64::MAX, 200_000_000_000, 10_000_000] {
            assert!(matches!(
                cache.put("tx", "austin", &json!({}), ttl, now),
                Err(EngineError::InvalidRequest(_))
            ));
        }
        assert!(cache.get("tx", "austin", now).unwrap().is_none());

        assert!(cache.put("tx", "austin", &json!({}), MAX_TTL_DAYS, now).is_ok());
    }
}
