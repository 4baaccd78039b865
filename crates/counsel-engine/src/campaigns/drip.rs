use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use counsel_db::{from_db_time, to_db_time};
use counsel_types::api::{DripRunRequest, DripRunSummary};
use counsel_types::models::{CampaignKind, EmailPreferences, PreferenceKind};

use super::{
    CampaignScheduler, DeliveryOutcome, Dispatch, LedgerKey, Pacer, RunBudget, redirect_target, truncate_errors,
};
use crate::blocking;
use crate::error::EngineError;
use crate::templates::{DripStats, DripStep, Template};

/// Step timing for the onboarding sequence.
#[derive(Debug, Clone)]
pub struct DripSchedule {
    steps: Vec<(DripStep, i64)>,
    grace_days: i64,
}

impl Default for DripSchedule {
    fn default() -> Self {
        Self::new(DripStep::all().iter().map(|s| (*s, s.default_days_after())).collect(), 3)
    }
}

impl DripSchedule {
    pub fn new(mut steps: Vec<(DripStep, i64)>, grace_days: i64) -> Self {
        steps.sort_by_key(|(_, days)| *days);
        Self { steps, grace_days: grace_days.max(0) }
    }

    /// How far back a reference date can be and still have a due step.
    pub fn lookback_days(&self) -> i64 {
        self.steps.iter().map(|(_, d)| *d).max().unwrap_or(0) + self.grace_days + 1
    }

    /// Steps whose window contains `days_since`, in ascending order.
    pub fn due_steps(&self, days_since: i64) -> impl Iterator<Item = DripStep> + '_ {
        self.steps
            .iter()
            .filter(move |(_, after)| days_since >= *after && days_since <= after + self.grace_days)
            .map(|(step, _)| *step)
    }
}

impl CampaignScheduler {
    /// Send every due onboarding step to recent listings.
    pub async fn run_drip(&self, req: &DripRunRequest, now: DateTime<Utc>) -> Result<DripRunSummary, EngineError> {
        let pipeline = self.pipeline()?;
        let budget = RunBudget::start(self.config.run_budget);
        let mut pacer = Pacer::new(self.config.pacing);
        let redirect = redirect_target(req.test_mode, req.test_email.as_deref());

        let since = to_db_time(now - Duration::days(self.config.drip.lookback_days()));
        let epoch = to_db_time(DateTime::<Utc>::UNIX_EPOCH);
        let (listings, views) = blocking(&self.db, move |db| {
            Ok((db.drip_candidates(&since)?, db.view_counts_since(&epoch)?))
        })
        .await?;

        let mut summary = DripRunSummary {
            success: true,
            total_listings: listings.len(),
            ..Default::default()
        };
        let mut errors = Vec::new();

        'listings: for listing in &listings {
            let Some(email) = listing.email.as_deref().filter(|e| !e.trim().is_empty()) else {
                summary.skipped += 1;
                continue;
            };

            if !EmailPreferences::from_json(&listing.email_preferences).allows(PreferenceKind::Marketing) {
                debug!("Listing {} opted out of marketing", listing.id);
                summary.skipped += 1;
                continue;
            }

            let reference = listing.claimed_at.as_deref().unwrap_or(&listing.created_at);
            let reference = match from_db_time(reference) {
                Ok(at) => at,
                Err(e) => {
                    errors.push(format!("{}: bad reference date: {}", email, e));
                    continue;
                }
            };
            let days_since = (now - reference).num_days();
            let variant = if listing.is_claimed { "claim_welcome" } else { "welcome" };
            let stats = DripStats { total_views: views.get(&listing.id).copied().unwrap_or(0) };

            for step in self.config.drip.due_steps(days_since) {
                if budget.exhausted() {
                    summary.deadline_exceeded = true;
                    break 'listings;
                }

                let email_content = Template::Drip { step, listing, stats }.render(&self.config.links);
                let dispatch = Dispatch {
                    key: LedgerKey::new(&listing.id, CampaignKind::Drip, step.number().to_string()),
                    recipient: email.to_string(),
                    redirect: redirect.clone(),
                    email: email_content,
                    snapshot: json!({
                        "variant": variant,
                        "step": step.number(),
                        "days_since": days_since,
                        "total_views": stats.total_views,
                    }),
                };

                match pipeline.deliver(dispatch, now).await {
                    Ok(DeliveryOutcome::Sent { .. }) => {
                        summary.sent += 1;
                        pacer.after_send().await;
                    }
                    Ok(DeliveryOutcome::Suppressed) => {
                        summary.skipped += 1;
                        continue 'listings;
                    }
                    Ok(DeliveryOutcome::AlreadySent) => {}
                    Err(e) => {
                        warn!("Drip step {} for {} failed: {}", step.number(), email, e);
                        errors.push(format!("{} step {}: {}", email, step.number(), e));
                    }
                }
            }
        }

        info!(
            "Drip run: {} sent, {} skipped, {} errors over {} listings{}",
            summary.sent,
            summary.skipped,
            errors.len(),
            summary.total_listings,
            if summary.deadline_exceeded { " (deadline exceeded)" } else { "" }
        );
        summary.errors = truncate_errors(errors);
        Ok(summary)
    }
}
