use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use counsel_db::{from_db_time, normalize_email, to_db_time};
use counsel_types::api::OutreachResponse;
use counsel_types::models::{CampaignKind, OutreachTemplate};

use super::{CampaignScheduler, DeliveryOutcome, Dispatch, LedgerKey};
use crate::blocking;
use crate::claims::{DEFAULT_TOKEN_TTL_DAYS, issue_token};
use crate::error::EngineError;
use crate::off_runtime;
use crate::templates::Template;

pub const DEFAULT_DAILY_LIMIT: i64 = 25;
const DAILY_LIMIT_SETTING: &str = "max_outreach_per_day";

impl CampaignScheduler {
    /// Cold outreach to the address on an unclaimed listing, bounded by a
    /// global daily cap.
    pub async fn send_outreach(
        &self,
        listing_id: &str,
        template: OutreachTemplate,
        now: DateTime<Utc>,
    ) -> Result<OutreachResponse, EngineError> {
        let pipeline = self.pipeline()?;
        let day_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();

        let id = listing_id.to_string();
        let since = to_db_time(day_start);
        let (listing, sent_today, daily_limit) = blocking(&self.db, move |db| {
            let listing = db.get_listing(&id)?;
            let sent = db.count_provider_events_since("email_sent", &since)?;
            let limit = db
                .get_setting(DAILY_LIMIT_SETTING)?
                .and_then(|v| v.trim().parse::<i64>().ok())
                .unwrap_or(DEFAULT_DAILY_LIMIT);
            Ok((listing, sent, limit))
        })
        .await?;

        let listing = listing.ok_or_else(|| EngineError::NotFound("Listing not found".into()))?;
        if listing.is_claimed {
            return Err(EngineError::Conflict("Profile already claimed".into()));
        }
        if listing.is_hidden {
            return Err(EngineError::Forbidden("Listing is hidden".into()));
        }
        let email = normalize_email(listing.email.as_deref().unwrap_or(""));
        if email.is_empty() {
            return Err(EngineError::InvalidRequest("Listing has no email".into()));
        }

        if sent_today >= daily_limit {
            let retry_after = (day_start + Duration::days(1) - now).num_seconds().max(1) as u64;
            info!("Outreach cap reached ({}/{})", sent_today, daily_limit);
            return Err(EngineError::RateLimited { retry_after_secs: retry_after });
        }

        let token = match current_token(&listing.claim_token, &listing.claim_token_expires_at, now) {
            Some(token) => token,
            None => {
                let db = self.db.clone();
                let id = listing.id.clone();
                off_runtime(move || issue_token(&db, &id, DEFAULT_TOKEN_TTL_DAYS, now))
                    .await?
                    .token
            }
        };

        let rendered = Template::Outreach { template, listing: &listing, claim_token: &token }.render(&self.config.links);
        let subject = rendered.subject.clone();
        let dispatch = Dispatch {
            key: LedgerKey::new(&listing.id, CampaignKind::Outreach, template.as_str()),
            recipient: email.clone(),
            redirect: None,
            email: rendered,
            snapshot: json!({ "template": template.as_str() }),
        };

        let message_id = match pipeline.deliver(dispatch, now).await? {
            DeliveryOutcome::Sent { message_id } => message_id,
            DeliveryOutcome::Suppressed => {
                return Ok(declined("do_not_contact", sent_today, daily_limit));
            }
            DeliveryOutcome::AlreadySent => {
                return Ok(declined("already_sent", sent_today, daily_limit));
            }
        };

        info!("Outreach {} sent to {} for listing {}", template.as_str(), email, listing.id);

        let at = to_db_time(now);
        let event = json!({
            "provider_message_id": message_id,
            "template": template.as_str(),
            "subject": subject,
            "sent_at": at,
        })
        .to_string();
        let (listing_id, name) = (listing.id.clone(), listing.full_name.clone());
        let recipient = email.clone();
        let bookkeeping = blocking(&self.db, move |db| {
            db.insert_provider_event(&recipient, Some(&listing_id), "email_sent", &event, &at)?;
            db.record_outreach_contact(&recipient, &listing_id, &name, template.as_str(), &at)
        })
        .await;
        if let Err(e) = bookkeeping {
            warn!("Outreach to {} sent but tracking failed: {}", email, e);
        }

        Ok(OutreachResponse {
            success: true,
            message_id: Some(message_id),
            reason: None,
            emails_sent_today: sent_today + 1,
            daily_limit,
        })
    }
}

fn current_token(token: &Option<String>, expires_at: &Option<String>, now: DateTime<Utc>) -> Option<String> {
    let token = token.as_ref()?;
    match expires_at.as_deref().map(from_db_time) {
        None => Some(token.clone()),
        Some(Ok(at)) if at > now => Some(token.clone()),
        _ => None,
    }
}

fn declined(reason: &str, sent_today: i64, daily_limit: i64) -> OutreachResponse {
    OutreachResponse {
        success: false,
        message_id: None,
        reason: Some(reason.to_string()),
        emails_sent_today: sent_today,
        daily_limit,
    }
}
