use anyhow::Result;
use rusqlite::{Connection, Row};

use crate::models::{ListingRow, NewListing};
use crate::{Database, OptionalExt};

const LISTING_COLUMNS: &str = "id, slug, full_name, email, phone, bio, profession, photo_url,
    city, state_province, is_claimed, owner_id, claimed_at, claim_token, claim_token_expires_at,
    email_preferences, moderation_status, is_seeded, is_hidden, hidden_reason, created_at";

impl Database {
    pub fn insert_listing(&self, listing: &NewListing) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO listings (id, slug, full_name, email, phone, bio, profession, photo_url,
                     city, state_province, claim_token, claim_token_expires_at, is_seeded, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                rusqlite::params![
                    listing.id,
                    listing.slug,
                    listing.full_name,
                    listing.email,
                    listing.phone,
                    listing.bio,
                    listing.profession,
                    listing.photo_url,
                    listing.city,
                    listing.state_province,
                    listing.claim_token,
                    listing.claim_token_expires_at,
                    listing.is_seeded,
                    listing.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_listing(&self, id: &str) -> Result<Option<ListingRow>> {
        self.with_conn(|conn| query_one(conn, "id = ?1", id))
    }

    pub fn find_listing_by_claim_token(&self, token: &str) -> Result<Option<ListingRow>> {
        self.with_conn(|conn| query_one(conn, "claim_token = ?1", token))
    }

    /// Listing that already consumed `token`, if any.
    pub fn find_listing_by_consumed_token(&self, token: &str) -> Result<Option<ListingRow>> {
        self.with_conn(|conn| query_one(conn, "claimed_with_token = ?1", token))
    }

    /// The claim transition as one conditional statement. Returns the number
    /// of rows changed: 1 when this caller won, 0 when the token no longer
    /// matches an unclaimed, unexpired listing.
    pub fn claim_listing(
        &self,
        listing_id: &str,
        token: &str,
        owner_id: &str,
        now: &str,
    ) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE listings
                 SET is_claimed = 1,
                     owner_id = ?3,
                     claimed_at = ?4,
                     claimed_with_token = ?2,
                     claim_token = NULL,
                     claim_token_expires_at = NULL,
                     moderation_status = 'approved'
                 WHERE id = ?1
                   AND claim_token = ?2
                   AND is_claimed = 0
                   AND (claim_token_expires_at IS NULL OR claim_token_expires_at > ?4)",
                rusqlite::params![listing_id, token, owner_id, now],
            )?;
            Ok(changed)
        })
    }

    /// Replace the claim token of an unclaimed listing.
    pub fn set_claim_token(&self, listing_id: &str, token: &str, expires_at: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE listings SET claim_token = ?2, claim_token_expires_at = ?3
                 WHERE id = ?1 AND is_claimed = 0",
                rusqlite::params![listing_id, token, expires_at],
            )?;
            Ok(changed)
        })
    }

    /// Hide seeded listings for an address that failed delivery. Claimed,
    /// owner-managed listings are never touched.
    pub fn hide_seeded_unclaimed_by_email(&self, email: &str, reason: &str, now: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE listings SET is_hidden = 1, hidden_reason = ?2, hidden_at = ?3
                 WHERE lower(email) = ?1 AND is_seeded = 1 AND is_claimed = 0 AND is_hidden = 0",
                rusqlite::params![email, reason, now],
            )?;
            Ok(changed)
        })
    }

    pub fn update_email_preferences(&self, listing_id: &str, preferences_json: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE listings SET email_preferences = ?2 WHERE id = ?1",
                rusqlite::params![listing_id, preferences_json],
            )?;
            Ok(changed)
        })
    }

    /// Visible, approved listings with an email whose drip reference date
    /// (claim date, else creation date) is at or after `since`.
    pub fn drip_candidates(&self, since: &str) -> Result<Vec<ListingRow>> {
        self.with_conn(|conn| {
            query_many(
                conn,
                "is_hidden = 0 AND moderation_status = 'approved' AND email IS NOT NULL
                 AND COALESCE(claimed_at, created_at) >= ?1",
                rusqlite::params![since],
            )
        })
    }

    /// Claimed, visible, approved listings with an email.
    pub fn digest_candidates(&self) -> Result<Vec<ListingRow>> {
        self.with_conn(|conn| {
            query_many(
                conn,
                "is_claimed = 1 AND is_hidden = 0 AND moderation_status = 'approved'
                 AND email IS NOT NULL",
                rusqlite::params![],
            )
        })
    }
}

fn query_one(conn: &Connection, predicate: &str, value: &str) -> Result<Option<ListingRow>> {
    let sql = format!("SELECT {} FROM listings WHERE {}", LISTING_COLUMNS, predicate);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], map_listing).optional()?;
    Ok(row)
}

fn query_many<P: rusqlite::Params>(conn: &Connection, predicate: &str, params: P) -> Result<Vec<ListingRow>> {
    let sql = format!(
        "SELECT {} FROM listings WHERE {} ORDER BY created_at",
        LISTING_COLUMNS, predicate
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, map_listing)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn map_listing(row: &Row<'_>) -> rusqlite::Result<ListingRow> {
    Ok(ListingRow {
        id: row.get(0)?,
        slug: row.get(1)?,
        full_name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        bio: row.get(5)?,
        profession: row.get(6)?,
        photo_url: row.get(7)?,
        city: row.get(8)?,
        state_province: row.get(9)?,
        is_claimed: row.get(10)?,
        owner_id: row.get(11)?,
        claimed_at: row.get(12)?,
        claim_token: row.get(13)?,
        claim_token_expires_at: row.get(14)?,
        email_preferences: row.get(15)?,
        moderation_status: row.get(16)?,
        is_seeded: row.get(17)?,
        is_hidden: row.get(18)?,
        hidden_reason: row.get(19)?,
        created_at: row.get(20)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(id: &str, email: &str) -> NewListing {
        NewListing {
            id: id.into(),
            slug: format!("{}-slug", id),
            full_name: "Jordan Avery, LMFT".into(),
            email: Some(email.into()),
            claim_token: Some(format!("tok-{}", id)),
            claim_token_expires_at: Some("2026-02-01T00:00:00.000Z".into()),
            is_seeded: true,
            created_at: "2026-01-01T00:00:00.000Z".into(),
            ..Default::default()
        }
    }

    #[test]
    fn claim_is_a_single_winner_update() {
        let db = Database::open_in_memory().unwrap();
        db.insert_listing(&seeded("l1", "a@example.com")).unwrap();

        let now = "2026-01-10T00:00:00.000Z";
        assert_eq!(db.claim_listing("l1", "tok-l1", "owner-1", now).unwrap(), 1);
        assert_eq!(db.claim_listing("l1", "tok-l1", "owner-2", now).unwrap(), 0);

        let row = db.get_listing("l1").unwrap().unwrap();
        assert!(row.is_claimed);
        assert_eq!(row.owner_id.as_deref(), Some("owner-1"));
        assert!(row.claim_token.is_none());
        assert!(row.claim_token_expires_at.is_none());
        assert!(db.find_listing_by_claim_token("tok-l1").unwrap().is_none());
        assert_eq!(db.find_listing_by_consumed_token("tok-l1").unwrap().unwrap().id, "l1");
    }

    #[test]
    fn expired_token_does_not_claim() {
        let db = Database::open_in_memory().unwrap();
        db.insert_listing(&seeded("l1", "a@example.com")).unwrap();

        let after_expiry = "2026-03-01T00:00:00.000Z";
        assert_eq!(db.claim_listing("l1", "tok-l1", "owner-1", after_expiry).unwrap(), 0);
        assert!(!db.get_listing("l1").unwrap().unwrap().is_claimed);
    }

    #[test]
    fn hide_skips_claimed_listings() {
        let db = Database::open_in_memory().unwrap();
        db.insert_listing(&seeded("l1", "Shared@Example.com")).unwrap();
        db.insert_listing(&seeded("l2", "shared@example.com")).unwrap();
        db.claim_listing("l2", "tok-l2", "owner", "2026-01-05T00:00:00.000Z").unwrap();

        let hidden = db
            .hide_seeded_unclaimed_by_email("shared@example.com", "email_bounced", "2026-01-06T00:00:00.000Z")
            .unwrap();
        assert_eq!(hidden, 1);
        assert!(db.get_listing("l1").unwrap().unwrap().is_hidden);
        assert!(!db.get_listing("l2").unwrap().unwrap().is_hidden);
    }

    #[test]
    fn drip_candidates_use_claim_date_when_present() {
        let db = Database::open_in_memory().unwrap();
        db.insert_listing(&seeded("old", "old@example.com")).unwrap();
        db.claim_listing("old", "tok-old", "owner", "2026-01-20T00:00:00.000Z").unwrap();
        db.insert_listing(&seeded("stale", "stale@example.com")).unwrap();

        let rows = db.drip_candidates("2026-01-15T00:00:00.000Z").unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["old"]);
    }
}
