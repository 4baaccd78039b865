//! Consent-aware outreach and listing-claim lifecycle engine.
//!
//! Every component is a stateless handle over the shared `Database`;
//! concurrency comes from many simultaneous callers, not from internal
//! scheduling. Send paths all go through `campaigns::SendPipeline`.

pub mod cache;
pub mod campaigns;
pub mod claims;
pub mod error;
pub mod events;
pub mod housekeeping;
pub mod mailer;
pub mod rate_limit;
pub mod suppression;
pub mod templates;
pub mod webhook;

use std::sync::Arc;

use counsel_db::Database;
use tracing::error;

pub use cache::ContentCache;
pub use campaigns::{CampaignConfig, CampaignScheduler};
pub use claims::ClaimTokenManager;
pub use error::EngineError;
pub use events::EventBus;
pub use rate_limit::{RateLimit, RateLimiter};
pub use suppression::SuppressionRegistry;
pub use webhook::WebhookEventProcessor;

/// Run a blocking datastore call off the async runtime.
pub(crate) async fn blocking<F, T>(db: &Arc<Database>, f: F) -> Result<T, EngineError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    off_runtime(move || f(&db).map_err(EngineError::from)).await
}

/// `spawn_blocking` for engine calls that already speak `EngineError`.
pub(crate) async fn off_runtime<F, T>(f: F) -> Result<T, EngineError>
where
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        EngineError::Upstream("datastore task failed".into())
    })?
}
