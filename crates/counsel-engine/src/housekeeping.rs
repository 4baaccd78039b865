use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::rate_limit::RateLimiter;

/// Background task that prunes rate-limit records older than `retention`.
pub async fn run_prune_loop(limiter: RateLimiter, retention: Duration, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let cutoff = match chrono::Duration::from_std(retention) {
            Ok(retention) => Utc::now() - retention,
            Err(e) => {
                warn!("Prune: invalid retention {:?}: {}", retention, e);
                return;
            }
        };

        let limiter = limiter.clone();
        match tokio::task::spawn_blocking(move || limiter.prune(cutoff)).await {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("Prune: removed {} request log rows", count);
                }
            }
            Ok(Err(e)) => warn!("Prune error: {}", e),
            Err(e) => warn!("Prune task failed: {}", e),
        }
    }
}
