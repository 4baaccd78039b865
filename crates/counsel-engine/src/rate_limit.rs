use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use counsel_db::{Database, to_db_time};

use crate::error::EngineError;

/// Window and ceiling for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub window_seconds: u64,
    pub max_requests: u32,
}

impl RateLimit {
    pub const fn new(window_seconds: u64, max_requests: u32) -> Self {
        Self {
            window_seconds,
            max_requests,
        }
    }
}

/// Sliding-window limiter backed by one row per observed request.
///
/// Count and record are separate statements, so concurrent callers can
/// overshoot `max_requests` slightly. Good enough for abuse mitigation.
#[derive(Clone)]
pub struct RateLimiter {
    db: Arc<Database>,
}

impl RateLimiter {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn check(
        &self,
        endpoint: &str,
        caller_key: &str,
        limit: RateLimit,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let window_start = now - Duration::seconds(limit.window_seconds as i64);
        let count = self
            .db
            .count_requests_since(endpoint, caller_key, &to_db_time(window_start))?;

        if count >= i64::from(limit.max_requests) {
            debug!("Rate limited {} on {} ({} in window)", caller_key, endpoint, count);
            return Err(EngineError::RateLimited {
                retry_after_secs: limit.window_seconds,
            });
        }

        self.db.record_request(endpoint, caller_key, &to_db_time(now))?;
        Ok(())
    }

    /// Drop records older than `before`. Returns rows removed.
    pub fn prune(&self, before: DateTime<Utc>) -> Result<usize, EngineError> {
        Ok(self.db.prune_request_logs(&to_db_time(before))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const HOURLY_TEN: RateLimit = RateLimit::new(3600, 10);

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    #[test]
    fn eleventh_call_in_window_is_limited() {
        let limiter = limiter();
        let start = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();

        for i in 0..10 {
            let at = start + Duration::seconds(i * 60);
            limiter.check("claim-profile", "203.0.113.7", HOURLY_TEN, at).unwrap();
        }

        let err = limiter
            .check("claim-profile", "203.0.113.7", HOURLY_TEN, start + Duration::minutes(30))
            .unwrap_err();
        assert!(matches!(err, EngineError::RateLimited { retry_after_secs: 3600 }));

        // All ten originals have aged out.
        let after_window = start + Duration::seconds(9 * 60 + 3601);
        assert!(limiter.check("claim-profile", "203.0.113.7", HOURLY_TEN, after_window).is_ok());
    }

    #[test]
    fn pairs_are_counted_independently() {
        let limiter = limiter();
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        let tight = RateLimit::new(60, 1);

        limiter.check("verify", "a", tight, now).unwrap();
        assert!(limiter.check("verify", "a", tight, now).is_err());
        assert!(limiter.check("verify", "b", tight, now).is_ok());
        assert!(limiter.check("claim", "a", tight, now).is_ok());
    }

    #[test]
    fn rejected_calls_are_not_recorded() {
        let limiter = limiter();
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        let tight = RateLimit::new(60, 1);

        limiter.check("verify", "a", tight, now).unwrap();
        for _ in 0..5 {
            assert!(limiter.check("verify", "a", tight, now).is_err());
        }
        assert!(limiter.check("verify", "a", tight, now + Duration::seconds(61)).is_ok());
    }

    #[test]
    fn prune_removes_old_records() {
        let limiter = limiter();
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        limiter.check("verify", "a", HOURLY_TEN, now - Duration::days(2)).unwrap();
        limiter.check("verify", "a", HOURLY_TEN, now).unwrap();

        assert_eq!(limiter.prune(now - Duration::days(1)).unwrap(), 1);
    }
}
