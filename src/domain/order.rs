//! Order aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::value_objects::Msisdn;

/// The aggregate root. Created once in `(Pending, Pending)`, settled at
/// most once by callback reconciliation, later advanced by fulfillment
/// actions outside this subsystem.
#[derive(Clone, Debug, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub customer: CustomerDetails,
    pub items: Vec<LineItem>,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub payment_details: Option<PaymentDetails>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Customer contact captured once at creation; payment events never
/// mutate it.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct CustomerDetails {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 9, max = 16))]
    pub phone: String,
    #[validate(length(min = 1, max = 240))]
    pub address: String,
    #[validate(length(min = 1, max = 80))]
    pub city: String,
}

/// Line item snapshot. Catalog price changes after placement never alter
/// a placed order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(alias = "id")]
    pub product_id: String,
    pub name: String,
    #[serde(alias = "price")]
    pub unit_price: Decimal,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Gateway correlation sub-record, present only for M-Pesa orders and
/// assigned exactly once after a successful initiation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub payer_phone: Msisdn,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Mpesa,
    CashOnDelivery,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mpesa => "mpesa",
            Self::CashOnDelivery => "cash_on_delivery",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mpesa" => Some(Self::Mpesa),
            "cash_on_delivery" => Some(Self::CashOnDelivery),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    /// Terminal states admit no further payment transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Fields the ledger needs to create an order; identity and timestamps are
/// assigned by the ledger itself.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub customer: CustomerDetails,
    pub items: Vec<LineItem>,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
}

/// The terminal transition applied by callback reconciliation. Built by
/// the reconciler, applied by the ledger's conditional update.
#[derive(Clone, Debug)]
pub struct PaymentSettlement {
    pub payment_status: PaymentStatus,
    pub order_status: Option<OrderStatus>,
    pub receipt_number: Option<String>,
    pub transaction_timestamp: Option<DateTime<Utc>>,
}

impl PaymentSettlement {
    pub fn completed(receipt_number: Option<String>, transaction_timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            payment_status: PaymentStatus::Completed,
            order_status: Some(OrderStatus::Processing),
            receipt_number,
            transaction_timestamp,
        }
    }

    /// A failed or cancelled push leaves fulfillment at Pending so an
    /// operator can decide whether to prompt a retry or cancel.
    pub fn failed() -> Self {
        Self {
            payment_status: PaymentStatus::Failed,
            order_status: None,
            receipt_number: None,
            transaction_timestamp: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_round_trip() {
        for s in [PaymentStatus::Pending, PaymentStatus::Completed, PaymentStatus::Failed] {
            assert_eq!(PaymentStatus::parse(s.as_str()), Some(s));
        }
        for s in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(PaymentStatus::parse("refunded"), None);
    }

    #[test]
    fn test_completed_settlement_advances_fulfillment() {
        let s = PaymentSettlement::completed(Some("QWE123".into()), None);
        assert_eq!(s.payment_status, PaymentStatus::Completed);
        assert_eq!(s.order_status, Some(OrderStatus::Processing));
    }

    #[test]
    fn test_failed_settlement_leaves_fulfillment_alone() {
        let s = PaymentSettlement::failed();
        assert_eq!(s.payment_status, PaymentStatus::Failed);
        assert_eq!(s.order_status, None);
        assert!(s.receipt_number.is_none());
    }
}
