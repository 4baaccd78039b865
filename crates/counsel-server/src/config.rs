use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

/// Process configuration read from the environment (and `.env`).
///
/// Secrets are optional here. A missing secret only fails the requests
/// that need it.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub resend_api_key: Option<String>,
    pub resend_api_base: String,
    pub webhook_secret: Option<String>,
    pub internal_api_key: Option<String>,
    pub jwt_secret: Option<String>,
    pub allowed_origins: Vec<String>,
    pub site_base_url: String,
    pub run_budget: Duration,
    pub request_log_retention: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let port: u16 = var_or("COUNSEL_PORT", "3000")
            .parse()
            .context("COUNSEL_PORT must be a port number")?;
        let run_budget_secs: u64 = var_or("CAMPAIGN_RUN_BUDGET_SECS", "120")
            .parse()
            .context("CAMPAIGN_RUN_BUDGET_SECS must be whole seconds")?;
        let retention_secs: u64 = var_or("REQUEST_LOG_RETENTION_SECS", "86400")
            .parse()
            .context("REQUEST_LOG_RETENTION_SECS must be whole seconds")?;

        Ok(Self {
            host: var_or("COUNSEL_HOST", "0.0.0.0"),
            port,
            db_path: var_or("COUNSEL_DB_PATH", "counsel.db").into(),
            resend_api_key: secret("RESEND_API_KEY"),
            resend_api_base: var_or("RESEND_API_BASE", "https://api.resend.com"),
            webhook_secret: secret("RESEND_WEBHOOK_SECRET"),
            internal_api_key: secret("INTERNAL_API_KEY"),
            jwt_secret: secret("COUNSEL_JWT_SECRET"),
            allowed_origins: parse_origins(&var_or("ALLOWED_ORIGINS", "")),
            site_base_url: var_or("SITE_BASE_URL", "https://www.weddingcounselors.com"),
            run_budget: Duration::from_secs(run_budget_secs),
            request_log_retention: Duration::from_secs(retention_secs),
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

/// Unset and blank are the same thing.
fn secret(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_trimmed_and_blank_entries_dropped() {
        let origins = parse_origins(" https://a.example/ ,,https://b.example ");
        assert_eq!(origins, vec!["https://a.example", "https://b.example"]);
        assert!(parse_origins("").is_empty());
    }
}
