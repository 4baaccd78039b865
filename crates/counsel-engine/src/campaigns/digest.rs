use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::{debug, info, warn};

use counsel_db::{from_db_time, normalize_email, to_db_time};
use counsel_types::api::{DigestPeriod, DigestRunRequest, DigestRunSummary};
use counsel_types::models::{CampaignKind, EmailPreferences, PreferenceKind};

use super::{
    CampaignScheduler, DeliveryOutcome, Dispatch, LedgerKey, Pacer, RunBudget, redirect_target, truncate_errors,
};
use crate::blocking;
use crate::error::EngineError;
use crate::templates::{DigestStats, Template};

const PERIOD_DAYS: i64 = 7;
const TRAILING_DAYS: i64 = 30;

/// The seven days ending at today's UTC midnight.
pub fn digest_period(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    (end - Duration::days(PERIOD_DAYS), end)
}

impl CampaignScheduler {
    /// Send the weekly recap to every eligible claimed listing. The ledger
    /// key is the period start date, so reruns in the same week are no-ops.
    pub async fn run_digest(&self, req: &DigestRunRequest, now: DateTime<Utc>) -> Result<DigestRunSummary, EngineError> {
        let pipeline = self.pipeline()?;
        let budget = RunBudget::start(self.config.run_budget);
        let mut pacer = Pacer::new(self.config.pacing);
        let redirect = redirect_target(req.test_mode, req.test_email.as_deref());
        let max_emails = req.max_emails.unwrap_or(self.config.default_digest_max);

        let (start, end) = digest_period(now);
        let period = DigestPeriod {
            start: start.format("%Y-%m-%d").to_string(),
            end: end.format("%Y-%m-%d").to_string(),
        };

        let period_key = period.start.clone();
        let since_period = to_db_time(start);
        let since_trailing = to_db_time(now - Duration::days(TRAILING_DAYS));
        let (total, eligible, views_7d, views_30d, inquiries_7d, inquiries_30d) = blocking(&self.db, move |db| {
            let candidates = db.digest_candidates()?;
            let total = candidates.len();
            let mut eligible = Vec::new();
            for listing in candidates {
                if !EmailPreferences::from_json(&listing.email_preferences).allows(PreferenceKind::WeeklyDigest) {
                    continue;
                }
                if db.has_send_log(&listing.id, CampaignKind::Weekly.as_str(), &period_key)? {
                    continue;
                }
                let email = normalize_email(listing.email.as_deref().unwrap_or(""));
                if email.is_empty() || db.is_suppressed(&email)? {
                    continue;
                }
                eligible.push(listing);
            }
            Ok((
                total,
                eligible,
                db.view_counts_since(&since_period)?,
                db.view_counts_since(&since_trailing)?,
                db.inquiry_counts_since(&since_period)?,
                db.inquiry_counts_since(&since_trailing)?,
            ))
        })
        .await?;

        info!(
            "Digest {}: {} of {} listings eligible",
            period.start,
            eligible.len(),
            total
        );

        let mut summary = DigestRunSummary {
            success: true,
            sent: 0,
            failed: 0,
            skipped: total - eligible.len(),
            eligible: eligible.len(),
            total_listings: total,
            period: period.clone(),
            errors: Vec::new(),
            deadline_exceeded: false,
        };
        let mut errors = Vec::new();
        let count = |map: &std::collections::HashMap<String, i64>, id: &str| map.get(id).copied().unwrap_or(0);

        for listing in eligible.iter().take(max_emails) {
            if budget.exhausted() {
                summary.deadline_exceeded = true;
                break;
            }
            let Some(email) = listing.email.as_deref() else {
                continue;
            };

            let days_listed = match from_db_time(&listing.created_at) {
                Ok(created) => (now - created).num_days().max(0),
                Err(e) => {
                    warn!("Listing {} has unreadable created_at: {}", listing.id, e);
                    0
                }
            };
            let stats = DigestStats {
                views_7d: count(&views_7d, &listing.id),
                views_30d: count(&views_30d, &listing.id),
                inquiries_7d: count(&inquiries_7d, &listing.id),
                inquiries_30d: count(&inquiries_30d, &listing.id),
                days_listed,
            };

            let dispatch = Dispatch {
                key: LedgerKey::new(&listing.id, CampaignKind::Weekly, period.start.clone()),
                recipient: email.to_string(),
                redirect: redirect.clone(),
                email: Template::WeeklyDigest { listing, stats }.render(&self.config.links),
                snapshot: serde_json::to_value(stats).unwrap_or_default(),
            };

            match pipeline.deliver(dispatch, now).await {
                Ok(DeliveryOutcome::Sent { .. }) => {
                    summary.sent += 1;
                    pacer.after_send().await;
                }
                Ok(DeliveryOutcome::Suppressed) | Ok(DeliveryOutcome::AlreadySent) => {
                    debug!("Digest for {} skipped at dispatch", listing.id);
                    summary.skipped += 1;
                }
                Err(e) => {
                    warn!("Failed to send digest to {}: {}", email, e);
                    summary.failed += 1;
                    errors.push(format!("{}: {}", email, e));
                }
            }
        }

        info!(
            "Digest {} run: {} sent, {} failed, {} skipped{}",
            period.start,
            summary.sent,
            summary.failed,
            summary.skipped,
            if summary.deadline_exceeded { " (deadline exceeded)" } else { "" }
        );
        summary.errors = truncate_errors(errors);
        Ok(summary)
    }
}
