use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::EngineError;

/// One message handed to the delivery provider.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEmail {
    pub from: String,
    pub to: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub subject: String,
    pub html: String,
}

/// Provider acknowledgement of an accepted message.
#[derive(Debug, Clone, Deserialize)]
pub struct SendReceipt {
    pub id: String,
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, EngineError>;
}

/// Resend HTTP API.
pub struct ResendProvider {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl ResendProvider {
    pub fn new(api_base: &str, api_key: &str) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/emails", api_base.trim_end_matches('/')),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl EmailProvider for ResendProvider {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, EngineError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(email)
            .send()
            .await
            .map_err(|e| EngineError::Upstream(format!("Resend request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Resend rejected message to {:?}: {} {}", email.to, status, body);
            return Err(EngineError::Upstream(format!("Resend {}: {}", status.as_u16(), body)));
        }

        let receipt: SendReceipt = resp
            .json()
            .await
            .map_err(|e| EngineError::Upstream(format!("Resend response unreadable: {}", e)))?;
        debug!("Resend accepted {} for {:?}", receipt.id, email.to);
        Ok(receipt)
    }
}

/// In-memory provider that records every message. Recipients registered
/// with `fail_recipient` get an upstream error instead.
#[derive(Default)]
pub struct RecordingProvider {
    sent: Mutex<Vec<OutboundEmail>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn fail_recipient(&self, email: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.push(email.to_string());
        }
    }
}

#[async_trait]
impl EmailProvider for RecordingProvider {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, EngineError> {
        let fails = self
            .failing
            .lock()
            .map(|f| email.to.iter().any(|to| f.contains(to)))
            .unwrap_or(false);
        if fails {
            return Err(EngineError::Upstream("Resend 422: recipient rejected".into()));
        }

        let mut sent = self
            .sent
            .lock()
            .map_err(|_| EngineError::Upstream("recording provider poisoned".into()))?;
        sent.push(email.clone());
        Ok(SendReceipt { id: format!("rec_{}", sent.len()) })
    }
}
