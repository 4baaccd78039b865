use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::error::EngineError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted distance between the delivery timestamp and now.
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Delivery metadata sent alongside the payload.
#[derive(Debug, Clone, Copy)]
pub struct WebhookHeaders<'a> {
    pub delivery_id: &'a str,
    pub timestamp: &'a str,
    /// Space-separated candidates, each `v1,<base64>` or bare base64.
    pub signatures: &'a str,
}

/// Shared signing secret. `whsec_`-prefixed values are base64 key material.
#[derive(Clone)]
pub struct WebhookSecret(Vec<u8>);

impl WebhookSecret {
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(EngineError::Misconfigured("webhook secret is empty".into()));
        }
        match raw.strip_prefix("whsec_") {
            Some(encoded) => B64
                .decode(encoded)
                .map(Self)
                .map_err(|e| EngineError::Misconfigured(format!("webhook secret is not base64: {}", e))),
            None => Ok(Self(raw.as_bytes().to_vec())),
        }
    }

    fn mac(&self, headers: &WebhookHeaders<'_>, payload: &[u8]) -> Result<HmacSha256, EngineError> {
        let mut mac = HmacSha256::new_from_slice(&self.0)
            .map_err(|e| EngineError::Misconfigured(format!("webhook secret unusable: {}", e)))?;
        mac.update(headers.delivery_id.as_bytes());
        mac.update(b".");
        mac.update(headers.timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }

    /// `v1,<base64>` signature over `{id}.{timestamp}.{payload}`.
    pub fn sign(&self, headers: &WebhookHeaders<'_>, payload: &[u8]) -> Result<String, EngineError> {
        let digest = self.mac(headers, payload)?.finalize().into_bytes();
        Ok(format!("v1,{}", B64.encode(digest)))
    }
}

impl std::fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WebhookSecret(..)")
    }
}

/// Authenticate a delivery. Runs before anything touches the datastore.
pub fn verify(
    secret: &WebhookSecret,
    headers: &WebhookHeaders<'_>,
    payload: &[u8],
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    if headers.delivery_id.is_empty() || headers.signatures.trim().is_empty() {
        return Err(EngineError::Unauthorized);
    }

    let sent_at: i64 = headers
        .timestamp
        .trim()
        .parse()
        .map_err(|_| EngineError::Unauthorized)?;

    let mac = secret.mac(headers, payload)?;
    let matched = headers.signatures.split_whitespace().any(|candidate| {
        let encoded = match candidate.split_once(',') {
            Some(("v1", sig)) => sig,
            Some(_) => return false,
            None => candidate,
        };
        match B64.decode(encoded) {
            // verify_slice compares in constant time
            Ok(bytes) => mac.clone().verify_slice(&bytes).is_ok(),
            Err(_) => false,
        }
    });
    if !matched {
        debug!("Webhook {} signature mismatch", headers.delivery_id);
        return Err(EngineError::Unauthorized);
    }

    let skew = now.timestamp().checked_sub(sent_at).map(i64::unsigned_abs);
    if skew.is_none_or(|s| s > TIMESTAMP_TOLERANCE_SECS.unsigned_abs()) {
        debug!("Webhook {} outside replay window", headers.delivery_id);
        return Err(EngineError::Unauthorized);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn secret() -> WebhookSecret {
        WebhookSecret::parse("whsec_c2hhcmVkLXNlY3JldC1mb3ItdGVzdHM=").unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn accepts_any_matching_candidate() {
        let secret = secret();
        let ts = now().timestamp().to_string();
        let payload = br#"{"type":"email.delivered"}"#;
        let unsigned = WebhookHeaders { delivery_id: "msg_1", timestamp: &ts, signatures: "" };
        let good = secret.sign(&unsigned, payload).unwrap();

        let candidates = format!("v1,AAAA {}", good);
        let headers = WebhookHeaders { signatures: &candidates, ..unsigned };
        assert!(verify(&secret, &headers, payload, now()).is_ok());
    }

    #[test]
    fn rejects_tampered_payload() {
        let secret = secret();
        let ts = now().timestamp().to_string();
        let unsigned = WebhookHeaders { delivery_id: "msg_1", timestamp: &ts, signatures: "" };
        let good = secret.sign(&unsigned, b"original").unwrap();
        let headers = WebhookHeaders { signatures: &good, ..unsigned };

        assert!(matches!(
            verify(&secret, &headers, b"tampered", now()),
            Err(EngineError::Unauthorized)
        ));
    }

    #[test]
    fn rejects_stale_timestamp_even_when_signed() {
        let secret = secret();
        let stale = (now().timestamp() - 301).to_string();
        let unsigned = WebhookHeaders { delivery_id: "msg_1", timestamp: &stale, signatures: "" };
        let good = secret.sign(&unsigned, b"payload").unwrap();
        let headers = WebhookHeaders { signatures: &good, ..unsigned };

        assert!(matches!(verify(&secret, &headers, b"payload", now()), Err(EngineError::Unauthorized)));

        let edge = (now().timestamp() - 300).to_string();
        let unsigned = WebhookHeaders { delivery_id: "msg_1", timestamp: &edge, signatures: "" };
        let good = secret.sign(&unsigned, b"payload").unwrap();
        let headers = WebhookHeaders { signatures: &good, ..unsigned };
        assert!(verify(&secret, &headers, b"payload", now()).is_ok());
    }

    #[test]
    fn extreme_timestamps_are_rejected_not_overflowed() {
        let secret = secret();
        for ts in [i64::MIN.to_string(), i64::MAX.to_string()] {
            let unsigned = WebhookHeaders { delivery_id: "msg_1", timestamp: &ts, signatures: "" };
            let good = secret.sign(&unsigned, b"payload").unwrap();
            let headers = WebhookHeaders { signatures: &good, ..unsigned };
            assert!(matches!(verify(&secret, &headers, b"payload", now()), Err(EngineError::Unauthorized)));
        }
    }

    #[test]
    fn raw_secrets_and_unknown_versions() {
        let secret = WebhookSecret::parse("plain-secret").unwrap();
        let ts = now().timestamp().to_string();
        let unsigned = WebhookHeaders { delivery_id: "msg_2", timestamp: &ts, signatures: "" };
        let good = secret.sign(&unsigned, b"p").unwrap();
        let v2 = good.replacen("v1,", "v2,", 1);
        let headers = WebhookHeaders { signatures: &v2, ..unsigned };
        assert!(verify(&secret, &headers, b"p", now()).is_err());

        assert!(WebhookSecret::parse("   ").is_err());
        assert!(WebhookSecret::parse("whsec_***").is_err());
    }
}
