use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub const LATEST_VERSION: i64 = 2;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (listings, suppression, ledger)");
        conn.execute_batch(
            "
            CREATE TABLE listings (
                id                      TEXT PRIMARY KEY,
                slug                    TEXT NOT NULL UNIQUE,
                full_name               TEXT NOT NULL,
                email                   TEXT,
                phone                   TEXT,
                bio                     TEXT,
                profession              TEXT,
                photo_url               TEXT,
                city                    TEXT,
                state_province          TEXT,
                is_claimed              INTEGER NOT NULL DEFAULT 0,
                owner_id                TEXT,
                claimed_at              TEXT,
                claim_token             TEXT UNIQUE,
                claim_token_expires_at  TEXT,
                claimed_with_token      TEXT,
                email_preferences       TEXT NOT NULL DEFAULT '{}',
                moderation_status       TEXT NOT NULL DEFAULT 'approved',
                is_seeded               INTEGER NOT NULL DEFAULT 0,
                is_hidden               INTEGER NOT NULL DEFAULT 0,
                hidden_reason           TEXT,
                hidden_at               TEXT,
                created_at              TEXT NOT NULL,
                CHECK (is_claimed = 0 OR (claim_token IS NULL AND owner_id IS NOT NULL))
            );

            CREATE INDEX idx_listings_email ON listings(email);
            CREATE INDEX idx_listings_claimed_with ON listings(claimed_with_token);

            CREATE TABLE suppressions (
                email       TEXT PRIMARY KEY,
                reason      TEXT NOT NULL CHECK (reason IN ('bounce', 'complaint', 'manual')),
                notes       TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE request_logs (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                endpoint    TEXT NOT NULL,
                caller_key  TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_request_logs_window
                ON request_logs(endpoint, caller_key, created_at);

            CREATE TABLE campaign_send_log (
                id                   INTEGER PRIMARY KEY AUTOINCREMENT,
                listing_id           TEXT NOT NULL REFERENCES listings(id),
                campaign_type        TEXT NOT NULL,
                step_or_period       TEXT NOT NULL,
                sent_at              TEXT NOT NULL,
                provider_message_id  TEXT,
                stats_snapshot       TEXT NOT NULL DEFAULT '{}',
                UNIQUE (listing_id, campaign_type, step_or_period)
            );

            CREATE TABLE content_cache (
                region      TEXT NOT NULL,
                locality    TEXT NOT NULL,
                payload     TEXT NOT NULL,
                expires_at  TEXT NOT NULL,
                is_active   INTEGER NOT NULL DEFAULT 1,
                updated_at  TEXT NOT NULL,
                PRIMARY KEY (region, locality)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (outreach tracking, activity, admin)");
        conn.execute_batch(
            "
            CREATE TABLE provider_outreach (
                email              TEXT PRIMARY KEY,
                listing_id         TEXT,
                name               TEXT,
                status             TEXT NOT NULL,
                template           TEXT,
                contact_count      INTEGER NOT NULL DEFAULT 0,
                last_contacted_at  TEXT,
                updated_at         TEXT NOT NULL
            );

            CREATE TABLE provider_events (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                provider_email  TEXT NOT NULL,
                listing_id      TEXT,
                event_type      TEXT NOT NULL,
                event_data      TEXT NOT NULL DEFAULT '{}',
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_provider_events_type
                ON provider_events(event_type, created_at);

            CREATE TABLE profile_views (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                listing_id  TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_profile_views_created ON profile_views(created_at);

            CREATE TABLE profile_inquiries (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                listing_id  TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_profile_inquiries_created ON profile_inquiries(created_at);

            CREATE TABLE admin_users (
                id         TEXT PRIMARY KEY,
                is_active  INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE app_settings (
                key    TEXT PRIMARY KEY,
                value  TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
