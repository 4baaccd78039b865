//! Campaign runs: onboarding drip, weekly digest and admin-triggered cold
//! outreach. Every path dispatches through `SendPipeline::deliver`, which
//! owns the suppression check and the idempotency ledger.

pub mod digest;
pub mod drip;
pub mod outreach;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use counsel_db::models::SendLogRow;
use counsel_db::{Database, to_db_time};
use counsel_types::models::CampaignKind;

use crate::error::EngineError;
use crate::mailer::{EmailProvider, OutboundEmail};
use crate::suppression::SuppressionRegistry;
use crate::templates::{RenderedEmail, SiteLinks};
use crate::{blocking, off_runtime};

pub use drip::DripSchedule;

/// Summaries carry at most this many error strings.
pub const MAX_REPORTED_ERRORS: usize = 10;

/// Provider throughput ceiling: pause after every `burst` sends.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub burst: u32,
    pub pause: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self { burst: 8, pause: Duration::from_secs(1) }
    }
}

#[derive(Debug, Clone)]
pub struct CampaignConfig {
    pub links: SiteLinks,
    pub drip: DripSchedule,
    pub pacing: Pacing,
    /// Wall-clock budget for a single run invocation.
    pub run_budget: Duration,
    pub default_digest_max: usize,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            links: SiteLinks::new("https://www.weddingcounselors.com"),
            drip: DripSchedule::default(),
            pacing: Pacing::default(),
            run_budget: Duration::from_secs(120),
            default_digest_max: 200,
        }
    }
}

/// Entry point for all campaign sends.
#[derive(Clone)]
pub struct CampaignScheduler {
    db: Arc<Database>,
    suppression: SuppressionRegistry,
    provider: Option<Arc<dyn EmailProvider>>,
    config: Arc<CampaignConfig>,
}

impl CampaignScheduler {
    /// `provider` is `None` when no delivery credentials are configured;
    /// every run then fails with `Misconfigured`.
    pub fn new(db: Arc<Database>, provider: Option<Arc<dyn EmailProvider>>, config: CampaignConfig) -> Self {
        Self {
            suppression: SuppressionRegistry::new(db.clone()),
            db,
            provider,
            config: Arc::new(config),
        }
    }

    fn pipeline(&self) -> Result<SendPipeline<'_>, EngineError> {
        let provider = self
            .provider
            .as_deref()
            .ok_or_else(|| EngineError::Misconfigured("RESEND_API_KEY not configured".into()))?;
        Ok(SendPipeline {
            db: &self.db,
            suppression: &self.suppression,
            provider,
        })
    }
}

/// Idempotency ledger key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerKey {
    pub listing_id: String,
    pub kind: CampaignKind,
    pub step_or_period: String,
}

impl LedgerKey {
    pub fn new(listing_id: &str, kind: CampaignKind, step_or_period: impl Into<String>) -> Self {
        Self {
            listing_id: listing_id.to_string(),
            kind,
            step_or_period: step_or_period.into(),
        }
    }
}

/// One message bound for one listing.
pub struct Dispatch {
    pub key: LedgerKey,
    /// The listing's own address. Always checked against the suppression list.
    pub recipient: String,
    /// Test-mode target. When set, the message goes here and the ledger is
    /// left untouched.
    pub redirect: Option<String>,
    pub email: RenderedEmail,
    pub snapshot: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent { message_id: String },
    Suppressed,
    AlreadySent,
}

pub(crate) struct SendPipeline<'a> {
    db: &'a Arc<Database>,
    suppression: &'a SuppressionRegistry,
    provider: &'a dyn EmailProvider,
}

impl SendPipeline<'_> {
    /// Ledger pre-check, suppression check, provider send, ledger write.
    ///
    /// The suppression lookup happens right before the provider call so a
    /// bounce processed mid-batch still stops the send. A ledger write that
    /// fails after the provider accepted the message is surfaced as an error:
    /// the next run may send it again.
    pub async fn deliver(&self, dispatch: Dispatch, now: DateTime<Utc>) -> Result<DeliveryOutcome, EngineError> {
        let Dispatch { key, recipient, redirect, email, snapshot } = dispatch;
        let record = redirect.is_none();

        if record {
            let k = key.clone();
            let sent = blocking(self.db, move |db| {
                db.has_send_log(&k.listing_id, k.kind.as_str(), &k.step_or_period)
            })
            .await?;
            if sent {
                debug!("{} {} already sent to {}", key.kind.as_str(), key.step_or_period, key.listing_id);
                return Ok(DeliveryOutcome::AlreadySent);
            }
        }

        let registry = self.suppression.clone();
        let checks: Vec<String> = std::iter::once(recipient.clone()).chain(redirect.clone()).collect();
        let suppressed = off_runtime(move || {
            for address in &checks {
                if registry.is_suppressed(address)? {
                    return Ok(true);
                }
            }
            Ok(false)
        })
        .await?;
        if suppressed {
            debug!("Skipping suppressed recipient {} ({})", recipient, key.kind.as_str());
            return Ok(DeliveryOutcome::Suppressed);
        }

        let to = redirect.unwrap_or(recipient);
        let outbound = OutboundEmail {
            from: email.from,
            to: vec![to],
            reply_to: email.reply_to,
            subject: email.subject,
            html: email.html,
        };
        let receipt = self.provider.send(&outbound).await?;

        if !record {
            return Ok(DeliveryOutcome::Sent { message_id: receipt.id });
        }

        let row = SendLogRow {
            listing_id: key.listing_id.clone(),
            campaign_type: key.kind.as_str().to_string(),
            step_or_period: key.step_or_period.clone(),
            sent_at: to_db_time(now),
            provider_message_id: Some(receipt.id.clone()),
            stats_snapshot: snapshot.to_string(),
        };
        match blocking(self.db, move |db| db.insert_send_log(&row)).await {
            Ok(true) => {}
            Ok(false) => warn!(
                "Ledger row for {} {} {} already present; concurrent run sent it too",
                key.listing_id,
                key.kind.as_str(),
                key.step_or_period
            ),
            Err(e) => {
                error!(
                    "ALERT: {} {} sent to {} (message {}) but ledger write failed, duplicate possible: {}",
                    key.kind.as_str(),
                    key.step_or_period,
                    key.listing_id,
                    receipt.id,
                    e
                );
                return Err(e);
            }
        }

        Ok(DeliveryOutcome::Sent { message_id: receipt.id })
    }
}

/// Sleeps after every `burst` successful sends.
pub(crate) struct Pacer {
    pacing: Pacing,
    sent: u32,
}

impl Pacer {
    pub fn new(pacing: Pacing) -> Self {
        Self { pacing, sent: 0 }
    }

    pub async fn after_send(&mut self) {
        self.sent += 1;
        if self.pacing.burst > 0 && self.sent % self.pacing.burst == 0 && !self.pacing.pause.is_zero() {
            tokio::time::sleep(self.pacing.pause).await;
        }
    }
}

/// Wall-clock deadline for one run.
pub(crate) struct RunBudget {
    deadline: Instant,
}

impl RunBudget {
    pub fn start(budget: Duration) -> Self {
        Self { deadline: Instant::now() + budget }
    }

    pub fn exhausted(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Resolve the test-mode redirect. Only honored when both fields are set.
pub(crate) fn redirect_target(test_mode: bool, test_email: Option<&str>) -> Option<String> {
    match test_email.map(str::trim) {
        Some(email) if test_mode && !email.is_empty() => Some(email.to_string()),
        _ => None,
    }
}

pub(crate) fn truncate_errors(mut errors: Vec<String>) -> Vec<String> {
    errors.truncate(MAX_REPORTED_ERRORS);
    errors
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use counsel_types::models::SuppressionReason;

    use crate::templates::{DripStats, DripStep, Template};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 15, 0, 0).unwrap()
    }

    fn dispatch(db: &Database, redirect: Option<&str>) -> Dispatch {
        let row = db.get_listing("l1").unwrap().unwrap();
        let email = Template::Drip { step: DripStep::CompleteProfile, listing: &row, stats: DripStats::default() }
            .render(&SiteLinks::new("https://example.com"));
        Dispatch {
            key: LedgerKey::new("l1", CampaignKind::Drip, "1"),
            recipient: "owner@example.com".into(),
            redirect: redirect.map(str::to_string),
            email,
            snapshot: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn deliver_writes_ledger_once() {
        let (db, provider, scheduler) = test_support::scheduler(test_support::fast_config());
        db.insert_listing(&test_support::listing("l1", "owner@example.com", 2, now())).unwrap();
        let pipeline = scheduler.pipeline().unwrap();

        let first = pipeline.deliver(dispatch(&db, None), now()).await.unwrap();
        assert!(matches!(first, DeliveryOutcome::Sent { .. }));
        let second = pipeline.deliver(dispatch(&db, None), now()).await.unwrap();
        assert_eq!(second, DeliveryOutcome::AlreadySent);

        assert_eq!(provider.sent().len(), 1);
        assert_eq!(db.count_send_logs("drip", Some("1")).unwrap(), 1);
    }

    #[tokio::test]
    async fn suppressed_recipient_never_reaches_provider() {
        let (db, provider, scheduler) = test_support::scheduler(test_support::fast_config());
        db.insert_listing(&test_support::listing("l1", "owner@example.com", 2, now())).unwrap();
        scheduler
            .suppression
            .suppress("Owner@Example.com", SuppressionReason::Bounce, None, now())
            .unwrap();

        let outcome = scheduler.pipeline().unwrap().deliver(dispatch(&db, None), now()).await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::Suppressed);
        assert!(provider.sent().is_empty());
        assert_eq!(db.count_send_logs("drip", None).unwrap(), 0);
    }

    #[tokio::test]
    async fn redirect_skips_ledger_and_goes_to_test_address() {
        let (db, provider, scheduler) = test_support::scheduler(test_support::fast_config());
        db.insert_listing(&test_support::listing("l1", "owner@example.com", 2, now())).unwrap();

        scheduler
            .pipeline()
            .unwrap()
            .deliver(dispatch(&db, Some("qa@example.com")), now())
            .await
            .unwrap();

        assert_eq!(provider.sent()[0].to, vec!["qa@example.com".to_string()]);
        assert_eq!(db.count_send_logs("drip", None).unwrap(), 0);
    }

    #[tokio::test]
    async fn provider_failure_leaves_no_ledger_row() {
        let (db, provider, scheduler) = test_support::scheduler(test_support::fast_config());
        db.insert_listing(&test_support::listing("l1", "owner@example.com", 2, now())).unwrap();
        provider.fail_recipient("owner@example.com");

        let result = scheduler.pipeline().unwrap().deliver(dispatch(&db, None), now()).await;
        assert!(matches!(result, Err(EngineError::Upstream(_))));
        assert_eq!(db.count_send_logs("drip", None).unwrap(), 0);
    }

    #[test]
    fn missing_provider_is_misconfigured() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let scheduler = CampaignScheduler::new(db, None, CampaignConfig::default());
        assert!(matches!(scheduler.pipeline(), Err(EngineError::Misconfigured(_))));
    }

    #[test]
    fn redirect_requires_both_fields() {
        assert_eq!(redirect_target(true, Some("qa@example.com")).as_deref(), Some("qa@example.com"));
        assert_eq!(redirect_target(false, Some("qa@example.com")), None);
        assert_eq!(redirect_target(true, None), None);
        assert_eq!(redirect_target(true, Some("  ")), None);
    }

    #[test]
    fn errors_are_truncated() {
        let errors: Vec<String> = (0..25).map(|i| i.to_string()).collect();
        assert_eq!(truncate_errors(errors).len(), MAX_REPORTED_ERRORS);
    }
}
