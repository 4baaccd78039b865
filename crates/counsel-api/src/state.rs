use std::sync::Arc;

use counsel_db::Database;
use counsel_engine::campaigns::CampaignConfig;
use counsel_engine::mailer::EmailProvider;
use counsel_engine::webhook::WebhookSecret;
use counsel_engine::{
    CampaignScheduler, ClaimTokenManager, ContentCache, EventBus, RateLimiter, WebhookEventProcessor,
};

pub type AppState = Arc<AppStateInner>;

/// Secrets and allowlists for the three authorization tiers. A missing
/// secret is not fatal at startup; requests that need it fail with 500.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
    pub internal_api_key: Option<String>,
    pub allowed_origins: Vec<String>,
}

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub claims: ClaimTokenManager,
    pub limiter: RateLimiter,
    pub webhooks: WebhookEventProcessor,
    pub campaigns: CampaignScheduler,
    pub cache: ContentCache,
    pub auth: AuthConfig,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        events: EventBus,
        provider: Option<Arc<dyn EmailProvider>>,
        webhook_secret: Option<WebhookSecret>,
        campaigns: CampaignConfig,
        auth: AuthConfig,
    ) -> AppState {
        Arc::new(Self {
            claims: ClaimTokenManager::new(db.clone(), events),
            limiter: RateLimiter::new(db.clone()),
            webhooks: WebhookEventProcessor::new(db.clone(), webhook_secret),
            campaigns: CampaignScheduler::new(db.clone(), provider, campaigns),
            cache: ContentCache::new(db.clone()),
            db,
            auth,
        })
    }
}
