//! In-memory ledger for tests and local development

use std::collections::HashMap;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{NewOrder, Order, OrderStatus, PaymentDetails, PaymentSettlement, PaymentStatus};
use crate::ledger::{LedgerError, OrderLedger};

#[derive(Default)]
pub struct InMemoryOrderLedger {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl InMemoryOrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl OrderLedger for InMemoryOrderLedger {
    async fn create_order(&self, new: NewOrder) -> Result<Order, LedgerError> {
        if new.items.is_empty() {
            return Err(LedgerError::Backend(anyhow!("order has no items")));
        }
        if new.total_amount.is_sign_negative() || new.total_amount.is_zero() {
            return Err(LedgerError::Backend(anyhow!("order total must be positive")));
        }
        let now = Utc::now();
        let order = Order {
            id: Uuid::now_v7(),
            customer: new.customer,
            items: new.items,
            total_amount: new.total_amount,
            payment_method: new.payment_method,
            payment_status: PaymentStatus::Pending,
            status: OrderStatus::Pending,
            payment_details: None,
            created_at: now,
            updated_at: now,
        };
        self.orders.write().await.insert(order.id, order.clone());
        Ok(order)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, LedgerError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_by_checkout_request_id(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<Order>, LedgerError> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .find(|o| {
                o.payment_details
                    .as_ref()
                    .is_some_and(|d| d.checkout_request_id == checkout_request_id)
            })
            .cloned())
    }

    async fn attach_payment_details(
        &self,
        order_id: Uuid,
        details: PaymentDetails,
    ) -> Result<(), LedgerError> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&order_id).ok_or(LedgerError::NotFound(order_id))?;
        if order.payment_details.is_some() {
            return Err(LedgerError::Backend(anyhow!(
                "order {order_id} already carries payment details"
            )));
        }
        order.payment_details = Some(details);
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn settle_payment(
        &self,
        order_id: Uuid,
        expected: PaymentStatus,
        settlement: PaymentSettlement,
    ) -> Result<bool, LedgerError> {
        // Single write guard makes check-then-mutate atomic.
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&order_id).ok_or(LedgerError::NotFound(order_id))?;
        if order.payment_status != expected {
            return Ok(false);
        }
        order.payment_status = settlement.payment_status;
        if let Some(status) = settlement.order_status {
            order.status = status;
        }
        if let Some(details) = order.payment_details.as_mut() {
            if settlement.receipt_number.is_some() {
                details.receipt_number = settlement.receipt_number;
            }
            if settlement.transaction_timestamp.is_some() {
                details.transaction_timestamp = settlement.transaction_timestamp;
            }
        }
        order.updated_at = Utc::now();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CustomerDetails, LineItem, Msisdn, PaymentMethod};
    use rust_decimal_macros::dec;

    fn new_order() -> NewOrder {
        NewOrder {
            customer: CustomerDetails {
                name: "Wanjiku Kamau".into(),
                email: "wanjiku@example.com".into(),
                phone: "0712345678".into(),
                address: "Moi Avenue 12".into(),
                city: "Nairobi".into(),
            },
            items: vec![LineItem {
                product_id: "P1".into(),
                name: "Kettle".into(),
                unit_price: dec!(80),
                quantity: 1,
                color: None,
            }],
            total_amount: dec!(80),
            payment_method: PaymentMethod::Mpesa,
        }
    }

    fn details() -> PaymentDetails {
        PaymentDetails {
            checkout_request_id: "ws_CO_1".into(),
            merchant_request_id: "mr_1".into(),
            payer_phone: Msisdn::normalize("0712345678", "254").unwrap(),
            receipt_number: None,
            transaction_timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let ledger = InMemoryOrderLedger::new();
        let order = ledger.create_order(new_order()).await.unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.status, OrderStatus::Pending);
        let found = ledger.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(found.id, order.id);
    }

    #[tokio::test]
    async fn test_rejects_empty_items() {
        let ledger = InMemoryOrderLedger::new();
        let mut new = new_order();
        new.items.clear();
        assert!(ledger.create_order(new).await.is_err());
    }

    #[tokio::test]
    async fn test_find_by_checkout_request_id() {
        let ledger = InMemoryOrderLedger::new();
        let order = ledger.create_order(new_order()).await.unwrap();
        ledger.attach_payment_details(order.id, details()).await.unwrap();
        let found = ledger.find_by_checkout_request_id("ws_CO_1").await.unwrap().unwrap();
        assert_eq!(found.id, order.id);
        assert!(ledger.find_by_checkout_request_id("ws_CO_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_details_attach_only_once() {
        let ledger = InMemoryOrderLedger::new();
        let order = ledger.create_order(new_order()).await.unwrap();
        ledger.attach_payment_details(order.id, details()).await.unwrap();
        assert!(ledger.attach_payment_details(order.id, details()).await.is_err());
    }

    #[tokio::test]
    async fn test_settle_is_conditional() {
        let ledger = InMemoryOrderLedger::new();
        let order = ledger.create_order(new_order()).await.unwrap();
        ledger.attach_payment_details(order.id, details()).await.unwrap();

        let first = ledger
            .settle_payment(
                order.id,
                PaymentStatus::Pending,
                PaymentSettlement::completed(Some("QWE123".into()), None),
            )
            .await
            .unwrap();
        assert!(first);

        // A second settlement finds the status no longer pending.
        let second = ledger
            .settle_payment(order.id, PaymentStatus::Pending, PaymentSettlement::failed())
            .await
            .unwrap();
        assert!(!second);

        let settled = ledger.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(settled.payment_status, PaymentStatus::Completed);
        assert_eq!(settled.status, OrderStatus::Processing);
        assert_eq!(
            settled.payment_details.unwrap().receipt_number.as_deref(),
            Some("QWE123")
        );
    }
}
