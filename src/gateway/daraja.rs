//! Daraja STK push client

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::gateway::credentials::{stk_password, CredentialBroker};
use crate::gateway::{GatewayError, PushAcceptance, PushGateway, PushRequest};

pub struct DarajaGateway {
    http: reqwest::Client,
    broker: CredentialBroker,
    config: GatewayConfig,
}

impl DarajaGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        let broker = CredentialBroker::new(
            http.clone(),
            config.base_url.clone(),
            config.consumer_key.clone(),
            config.consumer_secret.clone(),
        );
        Ok(Self { http, broker, config })
    }
}

#[derive(Debug, Serialize)]
struct StkPushBody<'a> {
    #[serde(rename = "BusinessShortCode")]
    business_short_code: &'a str,
    #[serde(rename = "Password")]
    password: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "TransactionType")]
    transaction_type: &'static str,
    #[serde(rename = "Amount")]
    amount: u64,
    #[serde(rename = "PartyA")]
    party_a: &'a str,
    #[serde(rename = "PartyB")]
    party_b: &'a str,
    #[serde(rename = "PhoneNumber")]
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    call_back_url: &'a str,
    #[serde(rename = "AccountReference")]
    account_reference: &'a str,
    #[serde(rename = "TransactionDesc")]
    transaction_desc: &'a str,
}

#[derive(Debug, Deserialize)]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: Option<String>,
    #[serde(rename = "ResponseCode")]
    response_code: Option<String>,
    #[serde(rename = "ResponseDescription")]
    response_description: Option<String>,
    #[serde(rename = "CustomerMessage")]
    customer_message: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[async_trait]
impl PushGateway for DarajaGateway {
    async fn initiate_push(&self, request: &PushRequest) -> Result<PushAcceptance, GatewayError> {
        let token = self.broker.access_token().await?;
        let (password, timestamp) =
            stk_password(&self.config.shortcode, &self.config.passkey, Utc::now());
        let body = StkPushBody {
            business_short_code: &self.config.shortcode,
            password,
            timestamp,
            transaction_type: "CustomerPayBillOnline",
            amount: request.amount,
            party_a: request.payer.as_str(),
            party_b: &self.config.shortcode,
            phone_number: request.payer.as_str(),
            call_back_url: &self.config.callback_url,
            account_reference: &request.account_reference,
            transaction_desc: &request.description,
        };

        let response = self
            .http
            .post(format!("{}/mpesa/stkpush/v1/processrequest", self.config.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::Unavailable(format!("gateway returned {status}")));
        }
        let parsed: StkPushResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        match (
            parsed.response_code.as_deref(),
            parsed.checkout_request_id,
            parsed.merchant_request_id,
        ) {
            (Some("0"), Some(checkout_request_id), Some(merchant_request_id)) => {
                debug!(%checkout_request_id, "push request accepted");
                Ok(PushAcceptance {
                    checkout_request_id,
                    merchant_request_id,
                    customer_message: parsed.customer_message,
                })
            }
            _ => {
                let reason = parsed
                    .response_description
                    .or(parsed.error_message)
                    .unwrap_or_else(|| format!("gateway returned {status}"));
                warn!(%reason, "push request declined");
                Err(GatewayError::Rejected(reason))
            }
        }
    }
}
