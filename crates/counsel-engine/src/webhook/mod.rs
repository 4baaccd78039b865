pub mod signature;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use counsel_db::{Database, normalize_email, to_db_time};
use counsel_types::events::{DeliveryEventKind, ProviderWebhookEvent};
use counsel_types::models::{OutreachStatus, SuppressionReason};

use crate::error::EngineError;
use crate::suppression::SuppressionRegistry;

pub use signature::{WebhookHeaders, WebhookSecret};

/// Aggregate result of one delivery.
#[derive(Debug, Default)]
pub struct WebhookOutcome {
    /// Recipients whose sub-steps all succeeded.
    pub processed: usize,
    pub errors: Vec<String>,
}

/// Consumes signed delivery-provider events. Safe to run repeatedly for the
/// same delivery: every write is an upsert or a status overwrite, apart from
/// the append-only audit rows in `provider_events`.
#[derive(Clone)]
pub struct WebhookEventProcessor {
    db: Arc<Database>,
    suppression: SuppressionRegistry,
    secret: Option<WebhookSecret>,
}

impl WebhookEventProcessor {
    pub fn new(db: Arc<Database>, secret: Option<WebhookSecret>) -> Self {
        Self {
            suppression: SuppressionRegistry::new(db.clone()),
            db,
            secret,
        }
    }

    pub fn handle(
        &self,
        payload: &[u8],
        headers: &WebhookHeaders<'_>,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome, EngineError> {
        let secret = self
            .secret
            .as_ref()
            .ok_or_else(|| EngineError::Misconfigured("RESEND_WEBHOOK_SECRET not configured".into()))?;
        signature::verify(secret, headers, payload, now)?;

        let event: ProviderWebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| EngineError::InvalidRequest(format!("Malformed webhook payload: {}", e)))?;

        let Some(kind) = DeliveryEventKind::parse(&event.event_type) else {
            info!("Ignoring webhook event type {}", event.event_type);
            return Ok(WebhookOutcome::default());
        };

        let mut outcome = WebhookOutcome::default();
        for recipient in &event.data.to {
            let failures = self.apply(kind, &event, recipient, now);
            if failures.is_empty() {
                outcome.processed += 1;
            } else {
                for failure in failures {
                    warn!("Webhook {} for {}: {}", event.event_type, recipient, failure);
                    outcome.errors.push(format!("{}: {}", recipient, failure));
                }
            }
        }

        info!(
            "Webhook {} processed {}/{} recipients",
            event.event_type,
            outcome.processed,
            event.data.to.len()
        );
        Ok(outcome)
    }

    /// Every sub-step runs regardless of the others; returns the failures.
    fn apply(
        &self,
        kind: DeliveryEventKind,
        event: &ProviderWebhookEvent,
        recipient: &str,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let email = normalize_email(recipient);
        let at = to_db_time(now);
        let mut failures = Vec::new();

        let (reason, status, event_type, hidden_reason) = match kind {
            DeliveryEventKind::Bounced => (
                Some(SuppressionReason::Bounce),
                OutreachStatus::Bounced,
                "bounce",
                Some("email_bounced"),
            ),
            DeliveryEventKind::Complained => (
                Some(SuppressionReason::Complaint),
                OutreachStatus::Complained,
                "complaint",
                Some("spam_complaint"),
            ),
            DeliveryEventKind::Delivered => (None, OutreachStatus::Delivered, "email_delivered", None),
        };

        if let Some(reason) = reason {
            let notes = format!(
                "{} on {}. Subject: {}",
                match reason {
                    SuppressionReason::Complaint => "Marked as spam",
                    _ => "Email bounced",
                },
                event.created_at,
                event.data.subject
            );
            if let Err(e) = self.suppression.suppress(&email, reason, Some(&notes), now) {
                failures.push(format!("suppress: {}", e));
            }
        }

        let last_contacted = match kind {
            DeliveryEventKind::Delivered => Some(event.created_at.as_str()),
            _ => None,
        };
        if let Err(e) = self.db.update_outreach_status(&email, status.as_str(), last_contacted, &at) {
            failures.push(format!("outreach status: {:#}", e));
        }

        let data = json!({
            "provider_message_id": event.data.email_id,
            "subject": event.data.subject,
            "occurred_at": event.created_at,
        });
        if let Err(e) = self.db.insert_provider_event(&email, None, event_type, &data.to_string(), &at) {
            failures.push(format!("event log: {:#}", e));
        }

        if let Some(hidden_reason) = hidden_reason {
            match self.db.hide_seeded_unclaimed_by_email(&email, hidden_reason, &at) {
                Ok(0) => {}
                Ok(n) => info!("Hid {} seeded listing(s) for {}", n, email),
                Err(e) => failures.push(format!("hide listing: {:#}", e)),
            }
        }

        failures
    }
}
