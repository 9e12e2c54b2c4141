//! Environment configuration

use anyhow::Context;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub nats_url: Option<String>,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub callback_url: String,
    /// Prefixes the per-order account reference sent to the gateway.
    pub account_tag: String,
    /// Replaces a leading trunk `0` when normalizing payer phones.
    pub country_code: String,
    pub timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8083),
            nats_url: std::env::var("NATS_URL").ok(),
            gateway: GatewayConfig::from_env()?,
        })
    }
}

impl GatewayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            base_url: std::env::var("MPESA_BASE_URL")
                .unwrap_or_else(|_| "https://sandbox.safaricom.co.ke".to_string()),
            consumer_key: std::env::var("MPESA_CONSUMER_KEY").context("MPESA_CONSUMER_KEY not set")?,
            consumer_secret: std::env::var("MPESA_CONSUMER_SECRET")
                .context("MPESA_CONSUMER_SECRET not set")?,
            shortcode: std::env::var("MPESA_SHORTCODE").context("MPESA_SHORTCODE not set")?,
            passkey: std::env::var("MPESA_PASSKEY").context("MPESA_PASSKEY not set")?,
            callback_url: std::env::var("MPESA_CALLBACK_URL").context("MPESA_CALLBACK_URL not set")?,
            account_tag: std::env::var("MPESA_ACCOUNT_TAG").unwrap_or_else(|_| "SOKONI".to_string()),
            country_code: std::env::var("MPESA_COUNTRY_CODE").unwrap_or_else(|_| "254".to_string()),
            timeout: Duration::from_millis(
                std::env::var("MPESA_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(15_000),
            ),
        })
    }
}
