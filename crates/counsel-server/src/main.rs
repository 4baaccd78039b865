mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{
    HeaderName, HeaderValue, Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use counsel_api::auth::INTERNAL_KEY_HEADER;
use counsel_api::state::{AppStateInner, AuthConfig};
use counsel_db::Database;
use counsel_engine::campaigns::CampaignConfig;
use counsel_engine::mailer::{EmailProvider, ResendProvider};
use counsel_engine::templates::SiteLinks;
use counsel_engine::webhook::WebhookSecret;
use counsel_engine::{EventBus, RateLimiter, events, housekeeping};

use crate::config::Config;

const PRUNE_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "counsel=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    info!("Datastore opened at {}", config.db_path.display());

    let bus = EventBus::new();
    tokio::spawn(events::run_bookkeeping(db.clone(), bus.subscribe()));
    tokio::spawn(housekeeping::run_prune_loop(
        RateLimiter::new(db.clone()),
        config.request_log_retention,
        PRUNE_INTERVAL_SECS,
    ));

    let provider: Option<Arc<dyn EmailProvider>> = match &config.resend_api_key {
        Some(key) => Some(Arc::new(ResendProvider::new(&config.resend_api_base, key)?)),
        None => {
            warn!("RESEND_API_KEY not set; campaign and outreach runs will fail");
            None
        }
    };

    let webhook_secret = match config.webhook_secret.as_deref().map(WebhookSecret::parse) {
        Some(Ok(secret)) => Some(secret),
        Some(Err(e)) => {
            error!("RESEND_WEBHOOK_SECRET rejected: {}", e);
            None
        }
        None => {
            warn!("RESEND_WEBHOOK_SECRET not set; webhook deliveries will fail");
            None
        }
    };

    let campaigns = CampaignConfig {
        links: SiteLinks::new(&config.site_base_url),
        run_budget: config.run_budget,
        ..Default::default()
    };

    let auth = AuthConfig {
        jwt_secret: config.jwt_secret.clone(),
        internal_api_key: config.internal_api_key.clone(),
        allowed_origins: config.allowed_origins.clone(),
    };

    let state = AppStateInner::new(db, bus, provider, webhook_secret, campaigns, auth);

    let app = counsel_api::router(state)
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Counsel server listening on {}", addr);
    if config.allowed_origins.is_empty() {
        info!("Origin allowlist empty; browser endpoints accept any origin");
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring unparseable origin {:?}", o);
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(INTERNAL_KEY_HEADER),
        ])
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    warn!("SIGTERM handler unavailable: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
