//! Gateway credential broker
//!
//! Produces the two artifacts every initiation call needs: a bearer token
//! from the OAuth client-credentials endpoint and the time-boxed request
//! password. Token fetches are not retried here; retry policy belongs to
//! the caller.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::gateway::GatewayError;

/// Refresh this long before the gateway-reported expiry.
const EXPIRY_MARGIN_SECS: u64 = 30;

pub struct CredentialBroker {
    http: reqwest::Client,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
    cached: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    // The gateway sends this as a decimal string.
    expires_in: String,
}

impl CredentialBroker {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        consumer_key: String,
        consumer_secret: String,
    ) -> Self {
        Self {
            http,
            base_url,
            consumer_key,
            consumer_secret,
            cached: Mutex::new(None),
        }
    }

    /// Returns a bearer token, reusing the cached one until shortly before
    /// its reported expiry.
    pub async fn access_token(&self) -> Result<String, GatewayError> {
        let mut cached = self.cached.lock().await;
        if let Some(c) = cached.as_ref() {
            if c.expires_at > Instant::now() {
                return Ok(c.token.clone());
            }
        }
        if self.consumer_key.is_empty() || self.consumer_secret.is_empty() {
            return Err(GatewayError::Credential(
                "consumer key/secret not configured".into(),
            ));
        }
        let response = self
            .http
            .get(format!(
                "{}/oauth/v1/generate?grant_type=client_credentials",
                self.base_url
            ))
            .basic_auth(&self.consumer_key, Some(&self.consumer_secret))
            .send()
            .await
            .map_err(|e| GatewayError::Credential(e.to_string()))?;
        if !response.status().is_success() {
            return Err(GatewayError::Credential(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Credential(e.to_string()))?;
        let ttl = body
            .expires_in
            .parse::<u64>()
            .unwrap_or(3600)
            .saturating_sub(EXPIRY_MARGIN_SECS);
        debug!(ttl_secs = ttl, "gateway access token refreshed");
        *cached = Some(CachedToken {
            token: body.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(ttl),
        });
        Ok(body.access_token)
    }
}

/// Derives the request password for an initiation call made at `at`. The
/// timestamp is part of the signed value and the gateway checks freshness,
/// so callers compute this at the moment of the call.
pub fn stk_password(shortcode: &str, passkey: &str, at: DateTime<Utc>) -> (String, String) {
    let timestamp = at.format("%Y%m%d%H%M%S").to_string();
    let password = BASE64.encode(format!("{shortcode}{passkey}{timestamp}"));
    (password, timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_is_fourteen_digits() {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 14, 30, 12).unwrap();
        let (_, timestamp) = stk_password("174379", "key", at);
        assert_eq!(timestamp, "20240105143012");
        assert_eq!(timestamp.len(), 14);
    }

    #[test]
    fn test_password_is_base64_of_concatenation() {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 14, 30, 12).unwrap();
        let (password, timestamp) = stk_password("174379", "passkey", at);
        let decoded = BASE64.decode(password).unwrap();
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            format!("174379passkey{timestamp}")
        );
    }

    #[test]
    fn test_password_is_deterministic_for_an_instant() {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 14, 30, 12).unwrap();
        assert_eq!(stk_password("174379", "k", at), stk_password("174379", "k", at));
    }
}
