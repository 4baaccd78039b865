use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use counsel_db::{Database, normalize_email, to_db_time};
use counsel_types::events::DomainEvent;

/// In-process fan-out for domain events. Publishing never fails the caller:
/// a transition is complete before its event is emitted.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: DomainEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("Domain event dropped, no subscribers: {:?}", e.0);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Background consumer that mirrors domain events into the outreach
/// tracking tables. Failures are logged per event and never retried.
pub async fn run_bookkeeping(db: Arc<Database>, mut rx: broadcast::Receiver<DomainEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let db = db.clone();
                let outcome = tokio::task::spawn_blocking(move || apply_bookkeeping(&db, &event)).await;
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Bookkeeping failed: {:#}", e),
                    Err(e) => warn!("Bookkeeping task panicked: {}", e),
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Bookkeeping lagged, {} domain events skipped", missed);
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!("Event bus closed, bookkeeping stopped");
                break;
            }
        }
    }
}

pub fn apply_bookkeeping(db: &Database, event: &DomainEvent) -> anyhow::Result<()> {
    match event {
        DomainEvent::ListingClaimed {
            listing_id,
            owner_id,
            owner_email,
            listing_email,
            full_name,
            claimed_at,
            ..
        } => {
            let now = to_db_time(Utc::now());
            let provider_email = listing_email.as_deref().or(owner_email.as_deref());

            if let Some(email) = provider_email {
                let data = json!({
                    "claimed_by_user_id": owner_id,
                    "claimed_by_email": owner_email,
                    "claimed_at": claimed_at,
                });
                db.insert_provider_event(
                    &normalize_email(email),
                    Some(listing_id),
                    "claimed",
                    &data.to_string(),
                    &now,
                )?;
            }

            if let Some(email) = listing_email {
                db.mark_outreach_claimed(&normalize_email(email), listing_id, full_name, &now)?;
            }

            Ok(())
        }
    }
}
