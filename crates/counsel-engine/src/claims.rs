use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use counsel_db::models::ListingRow;
use counsel_db::{Database, from_db_time, to_db_time};
use counsel_types::events::DomainEvent;
use counsel_types::models::ListingSummary;

use crate::error::EngineError;
use crate::events::EventBus;

pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 7;

const INVALID_LINK: &str = "Invalid or expired claim link";
const LINK_EXPIRED: &str = "Claim link expired";
const ALREADY_CLAIMED: &str = "Profile already claimed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimOutcome {
    pub listing_id: String,
    pub slug: String,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// The authenticated caller taking ownership.
#[derive(Debug, Clone)]
pub struct Claimant {
    pub user_id: String,
    pub email: Option<String>,
}

/// Issues, verifies and consumes single-use claim tokens.
#[derive(Clone)]
pub struct ClaimTokenManager {
    db: Arc<Database>,
    events: EventBus,
}

impl ClaimTokenManager {
    pub fn new(db: Arc<Database>, events: EventBus) -> Self {
        Self { db, events }
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<ListingSummary, EngineError> {
        let listing = lookup(&self.db, token, now)?;
        Ok(summary(listing))
    }

    /// Consume `token` for `claimant`. Exactly one concurrent caller wins;
    /// everyone else sees `Conflict`.
    pub fn claim(
        &self,
        token: &str,
        claimant: &Claimant,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, EngineError> {
        let listing = lookup(&self.db, token, now)?;

        let changed = self
            .db
            .claim_listing(&listing.id, token, &claimant.user_id, &to_db_time(now))?;
        if changed == 0 {
            warn!("Claim race lost for listing {} by {}", listing.id, claimant.user_id);
            return Err(EngineError::Conflict(ALREADY_CLAIMED.into()));
        }

        info!("Listing {} claimed by {}", listing.id, claimant.user_id);

        self.events.publish(DomainEvent::ListingClaimed {
            listing_id: listing.id.clone(),
            owner_id: claimant.user_id.clone(),
            owner_email: claimant.email.clone(),
            listing_email: listing.email.clone(),
            full_name: listing.full_name.clone(),
            city: listing.city.clone(),
            state_province: listing.state_province.clone(),
            claimed_at: now,
        });

        Ok(ClaimOutcome {
            listing_id: listing.id,
            slug: listing.slug,
        })
    }

    pub fn issue(&self, listing_id: &str, ttl_days: i64, now: DateTime<Utc>) -> Result<IssuedToken, EngineError> {
        issue_token(&self.db, listing_id, ttl_days, now)
    }
}

/// Replace the listing's claim token with a fresh random one.
pub fn issue_token(
    db: &Database,
    listing_id: &str,
    ttl_days: i64,
    now: DateTime<Utc>,
) -> Result<IssuedToken, EngineError> {
    if ttl_days <= 0 {
        return Err(EngineError::InvalidRequest("ttl_days must be positive".into()));
    }

    let listing = db
        .get_listing(listing_id)?
        .ok_or_else(|| EngineError::NotFound("Listing not found".into()))?;
    if listing.is_claimed {
        return Err(EngineError::Conflict(ALREADY_CLAIMED.into()));
    }

    let bytes: [u8; 32] = rand::random();
    let token = URL_SAFE_NO_PAD.encode(bytes);
    let expires_at = now + Duration::days(ttl_days);

    if db.set_claim_token(listing_id, &token, &to_db_time(expires_at))? == 0 {
        return Err(EngineError::Conflict(ALREADY_CLAIMED.into()));
    }

    info!("Issued claim token for listing {} (expires {})", listing_id, expires_at);
    Ok(IssuedToken { token, expires_at })
}

/// Resolve a token to a claimable listing, classifying every failure.
fn lookup(db: &Database, token: &str, now: DateTime<Utc>) -> Result<ListingRow, EngineError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(EngineError::InvalidRequest("Missing token".into()));
    }

    let Some(listing) = db.find_listing_by_claim_token(token)? else {
        if db.find_listing_by_consumed_token(token)?.is_some() {
            return Err(EngineError::Conflict(ALREADY_CLAIMED.into()));
        }
        return Err(EngineError::NotFound(INVALID_LINK.into()));
    };

    if let Some(raw) = &listing.claim_token_expires_at {
        if from_db_time(raw)? <= now {
            return Err(EngineError::Expired(LINK_EXPIRED.into()));
        }
    }

    if listing.is_claimed {
        return Err(EngineError::Conflict(ALREADY_CLAIMED.into()));
    }

    Ok(listing)
}

fn summary(listing: ListingRow) -> ListingSummary {
    ListingSummary {
        id: listing.id,
        full_name: listing.full_name,
        email: listing.email,
        phone: listing.phone,
        bio: listing.bio,
        profession: listing.profession,
        city: listing.city,
        state_province: listing.state_province,
        slug: listing.slug,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use counsel_db::models::NewListing;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    fn setup() -> (Arc<Database>, ClaimTokenManager) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.insert_listing(&NewListing {
            id: "listing-1".into(),
            slug: "jordan-avery-austin".into(),
            full_name: "Jordan Avery".into(),
            email: Some("jordan@example.com".into()),
            city: Some("Austin".into()),
            state_province: Some("TX".into()),
            claim_token: Some("fresh-token".into()),
            claim_token_expires_at: Some(to_db_time(now() + Duration::days(7))),
            is_seeded: true,
            created_at: to_db_time(now() - Duration::days(1)),
            ..Default::default()
        })
        .unwrap();
        let manager = ClaimTokenManager::new(db.clone(), EventBus::new());
        (db, manager)
    }

    fn claimant(id: &str) -> Claimant {
        Claimant {
            user_id: id.into(),
            email: Some(format!("{}@example.com", id)),
        }
    }

    #[test]
    fn verify_returns_summary() {
        let (_db, manager) = setup();
        let summary = manager.verify("fresh-token", now()).unwrap();
        assert_eq!(summary.id, "listing-1");
        assert_eq!(summary.slug, "jordan-avery-austin");
    }

    #[test]
    fn verify_classifies_failures() {
        let (_db, manager) = setup();
        assert!(matches!(manager.verify("nope", now()), Err(EngineError::NotFound(_))));
        assert!(matches!(manager.verify("  ", now()), Err(EngineError::InvalidRequest(_))));
        assert!(matches!(
            manager.verify("fresh-token", now() + Duration::days(8)),
            Err(EngineError::Expired(_))
        ));

        manager.claim("fresh-token", &claimant("owner"), now()).unwrap();
        assert!(matches!(manager.verify("fresh-token", now()), Err(EngineError::Conflict(_))));
    }

    #[test]
    fn claim_transfers_ownership_and_publishes() {
        let (db, manager) = setup();
        let mut rx = manager.events.subscribe();

        let outcome = manager.claim("fresh-token", &claimant("owner-9"), now()).unwrap();
        assert_eq!(outcome.listing_id, "listing-1");

        let row = db.get_listing("listing-1").unwrap().unwrap();
        assert!(row.is_claimed);
        assert_eq!(row.owner_id.as_deref(), Some("owner-9"));
        assert!(row.claim_token.is_none());

        match rx.try_recv().unwrap() {
            DomainEvent::ListingClaimed { listing_id, owner_id, .. } => {
                assert_eq!(listing_id, "listing-1");
                assert_eq!(owner_id, "owner-9");
            }
        }
    }

    #[test]
    fn claim_succeeds_without_subscribers() {
        let (_db, manager) = setup();
        assert!(manager.claim("fresh-token", &claimant("owner"), now()).is_ok());
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        let (_db, manager) = setup();
        let contenders = 16;

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..contenders)
                .map(|i| {
                    let manager = manager.clone();
                    scope.spawn(move || manager.claim("fresh-token", &claimant(&format!("user-{}", i)), now()))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(EngineError::Conflict(_))))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(conflicts, contenders - 1);
    }

    #[test]
    fn issue_replaces_expired_token() {
        let (db, manager) = setup();
        let later = now() + Duration::days(30);
        assert!(matches!(manager.verify("fresh-token", later), Err(EngineError::Expired(_))));

        let issued = manager.issue("listing-1", DEFAULT_TOKEN_TTL_DAYS, later).unwrap();
        assert_eq!(issued.expires_at, later + Duration::days(7));
        assert!(manager.verify(&issued.token, later).is_ok());
        assert!(matches!(manager.verify("fresh-token", later), Err(EngineError::NotFound(_))));

        manager.claim(&issued.token, &claimant("owner"), later).unwrap();
        assert!(matches!(
            manager.issue("listing-1", 7, later),
            Err(EngineError::Conflict(_))
        ));
        assert!(db.get_listing("listing-1").unwrap().unwrap().claim_token.is_none());
    }
}
