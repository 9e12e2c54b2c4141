//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed {
        order_id: Uuid,
        total_amount: Decimal,
    },
    PaymentCompleted {
        order_id: Uuid,
        receipt_number: Option<String>,
    },
    PaymentFailed {
        order_id: Uuid,
        result_code: i64,
    },
}

impl OrderEvent {
    /// Subject suffix for the message bus.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Placed { .. } => "placed",
            Self::PaymentCompleted { .. } => "payment_completed",
            Self::PaymentFailed { .. } => "payment_failed",
        }
    }
}
