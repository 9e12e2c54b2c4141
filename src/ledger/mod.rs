//! Order ledger
//!
//! The durable store of orders and the only shared mutable resource in the
//! payment flow. Settlement goes through [`OrderLedger::settle_payment`],
//! a compare-and-set on `payment_status` so that two concurrent callback
//! deliveries can never both apply a terminal transition.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{NewOrder, Order, PaymentDetails, PaymentSettlement, PaymentStatus};

pub use memory::InMemoryOrderLedger;
pub use postgres::PgOrderLedger;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("order {0} not found")]
    NotFound(Uuid),
    #[error("storage failure: {0}")]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Persists a new order in `(Pending, Pending)` and returns it with
    /// identity and timestamps assigned. Must be durable before the caller
    /// makes any external call referencing the order.
    async fn create_order(&self, new: NewOrder) -> Result<Order, LedgerError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, LedgerError>;

    /// Looks up the order holding the gateway's checkout request id, the
    /// sole join key between an order and its callback.
    async fn find_by_checkout_request_id(&self, checkout_request_id: &str)
        -> Result<Option<Order>, LedgerError>;

    /// Records the gateway correlation identifiers after an accepted
    /// initiation. Assigned at most once; fails if the order is missing or
    /// already carries payment details.
    async fn attach_payment_details(
        &self,
        order_id: Uuid,
        details: PaymentDetails,
    ) -> Result<(), LedgerError>;

    /// Applies a terminal payment transition only if the order's current
    /// `payment_status` still equals `expected`. Returns whether the update
    /// was applied; `false` means another delivery settled the order first.
    async fn settle_payment(
        &self,
        order_id: Uuid,
        expected: PaymentStatus,
        settlement: PaymentSettlement,
    ) -> Result<bool, LedgerError>;
}
