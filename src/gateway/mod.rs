//! Payment gateway integration
//!
//! The STK push ("Lipa na M-Pesa Online") flow: the merchant server asks
//! the gateway to prompt the customer's handset, the gateway answers with
//! correlation identifiers, and the payment outcome arrives later on the
//! asynchronous callback.

pub mod credentials;
pub mod daraja;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::Msisdn;

pub use credentials::CredentialBroker;
pub use daraja::DarajaGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("credential exchange failed: {0}")]
    Credential(String),
    #[error("gateway unreachable: {0}")]
    Unavailable(String),
    #[error("push request not accepted: {0}")]
    Rejected(String),
}

/// Outbound push request, already normalized by the initiator.
#[derive(Clone, Debug)]
pub struct PushRequest {
    /// Whole currency units; the gateway rejects fractional amounts.
    pub amount: u64,
    pub payer: Msisdn,
    pub account_reference: String,
    pub description: String,
}

/// Correlation identifiers returned by an accepted initiation.
#[derive(Clone, Debug)]
pub struct PushAcceptance {
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub customer_message: Option<String>,
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn initiate_push(&self, request: &PushRequest) -> Result<PushAcceptance, GatewayError>;
}

// --- Asynchronous result notification -----------------------------------

pub const RESULT_CODE_SUCCESS: i64 = 0;

#[derive(Debug, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata")]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item")]
    pub item: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<serde_json::Value>,
}

impl StkCallback {
    pub fn is_success(&self) -> bool {
        self.result_code == RESULT_CODE_SUCCESS
    }

    fn metadata_value(&self, name: &str) -> Option<&serde_json::Value> {
        self.callback_metadata
            .as_ref()?
            .item
            .iter()
            .find(|i| i.name == name)?
            .value
            .as_ref()
    }

    /// Settlement receipt, present on successful payments.
    pub fn receipt_number(&self) -> Option<String> {
        self.metadata_value("MpesaReceiptNumber")
            .and_then(|v| v.as_str().map(str::to_owned))
    }

    /// `TransactionDate` arrives as a 14-digit local-time number
    /// (gateway clock is UTC+3).
    pub fn transaction_timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.metadata_value("TransactionDate")?;
        let digits = match raw {
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) => s.clone(),
            _ => return None,
        };
        let naive = NaiveDateTime::parse_from_str(&digits, "%Y%m%d%H%M%S").ok()?;
        let eat = FixedOffset::east_opt(3 * 3600)?;
        Some(naive.and_local_timezone(eat).single()?.with_timezone(&Utc))
    }
}
