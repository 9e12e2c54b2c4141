//! Callback reconciliation
//!
//! Consumes the gateway's asynchronous result notification and applies an
//! at-most-once-effective transition to exactly one order. Deliveries are
//! at-least-once and may race; everything after the lookup funnels through
//! the ledger's conditional update.

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::events::OrderEvent;
use crate::domain::{PaymentSettlement, PaymentStatus};
use crate::error::CommerceError;
use crate::events::EventPublisher;
use crate::gateway::CallbackEnvelope;
use crate::ledger::OrderLedger;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    PaymentCompleted { receipt_number: Option<String> },
    PaymentFailed { result_code: i64 },
    /// Duplicate delivery for an order already in a terminal payment
    /// state; acknowledged without mutation.
    AlreadySettled,
}

pub struct CallbackReconciler {
    ledger: Arc<dyn OrderLedger>,
    events: EventPublisher,
}

impl CallbackReconciler {
    pub fn new(ledger: Arc<dyn OrderLedger>, events: EventPublisher) -> Self {
        Self { ledger, events }
    }

    pub async fn reconcile(&self, payload: serde_json::Value) -> Result<ReconcileOutcome, CommerceError> {
        let envelope: CallbackEnvelope = serde_json::from_value(payload)
            .map_err(|e| CommerceError::MalformedCallback(e.to_string()))?;
        let callback = envelope.body.stk_callback;

        let order = self
            .ledger
            .find_by_checkout_request_id(&callback.checkout_request_id)
            .await?
            .ok_or_else(|| CommerceError::UnknownCheckoutRequest(callback.checkout_request_id.clone()))?;

        if order.payment_status.is_terminal() {
            debug!(order_id = %order.id, "duplicate callback for settled order");
            return Ok(ReconcileOutcome::AlreadySettled);
        }

        let settlement = if callback.is_success() {
            PaymentSettlement::completed(callback.receipt_number(), callback.transaction_timestamp())
        } else {
            PaymentSettlement::failed()
        };
        let applied = self
            .ledger
            .settle_payment(order.id, PaymentStatus::Pending, settlement)
            .await?;
        if !applied {
            // A concurrent delivery settled the order between our read and
            // the conditional update.
            debug!(order_id = %order.id, "settlement already applied by a concurrent delivery");
            return Ok(ReconcileOutcome::AlreadySettled);
        }

        if callback.is_success() {
            let receipt_number = callback.receipt_number();
            info!(
                order_id = %order.id,
                checkout_request_id = %callback.checkout_request_id,
                receipt = receipt_number.as_deref().unwrap_or("-"),
                "payment completed"
            );
            self.events
                .publish(&OrderEvent::PaymentCompleted {
                    order_id: order.id,
                    receipt_number: receipt_number.clone(),
                })
                .await;
            Ok(ReconcileOutcome::PaymentCompleted { receipt_number })
        } else {
            info!(
                order_id = %order.id,
                checkout_request_id = %callback.checkout_request_id,
                result_code = callback.result_code,
                result_desc = %callback.result_desc,
                "payment failed"
            );
            self.events
                .publish(&OrderEvent::PaymentFailed {
                    order_id: order.id,
                    result_code: callback.result_code,
                })
                .await;
            Ok(ReconcileOutcome::PaymentFailed { result_code: callback.result_code })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        CustomerDetails, LineItem, Msisdn, NewOrder, Order, OrderStatus, PaymentDetails,
        PaymentMethod,
    };
    use crate::ledger::InMemoryOrderLedger;
    use rust_decimal_macros::dec;

    async fn seeded_ledger(checkout_request_id: &str) -> (Arc<InMemoryOrderLedger>, Order) {
        let ledger = Arc::new(InMemoryOrderLedger::new());
        let order = ledger
            .create_order(NewOrder {
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
            })
            .await
            .unwrap();
        ledger
            .attach_payment_details(
                order.id,
                PaymentDetails {
                    checkout_request_id: checkout_request_id.into(),
                    merchant_request_id: "mr_1".into(),
                    payer_phone: Msisdn::normalize("0712345678", "254").unwrap(),
                    receipt_number: None,
                    transaction_timestamp: None,
                },
            )
            .await
            .unwrap();
        (ledger, order)
    }

    fn reconciler(ledger: Arc<InMemoryOrderLedger>) -> CallbackReconciler {
        CallbackReconciler::new(ledger, EventPublisher::disabled())
    }

    fn success_payload(checkout_request_id: &str) -> serde_json::Value {
        serde_json::json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "mr_1",
                    "CheckoutRequestID": checkout_request_id,
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "CallbackMetadata": {
                        "Item": [
                            { "Name": "Amount", "Value": 80.0 },
                            { "Name": "MpesaReceiptNumber", "Value": "QWE123" },
                            { "Name": "TransactionDate", "Value": 20240105143012u64 },
                            { "Name": "PhoneNumber", "Value": 254712345678u64 }
                        ]
                    }
                }
            }
        })
    }

    fn cancelled_payload(checkout_request_id: &str) -> serde_json::Value {
        serde_json::json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "mr_1",
                    "CheckoutRequestID": checkout_request_id,
                    "ResultCode": 1032,
                    "ResultDesc": "Request cancelled by user"
                }
            }
        })
    }

    #[tokio::test]
    async fn test_success_callback_completes_payment() {
        let (ledger, order) = seeded_ledger("ws_CO_1").await;
        let outcome = reconciler(ledger.clone())
            .reconcile(success_payload("ws_CO_1"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::PaymentCompleted { receipt_number: Some("QWE123".into()) }
        );

        let settled = ledger.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(settled.payment_status, PaymentStatus::Completed);
        assert_eq!(settled.status, OrderStatus::Processing);
        let details = settled.payment_details.unwrap();
        assert_eq!(details.receipt_number.as_deref(), Some("QWE123"));
        assert!(details.transaction_timestamp.is_some());
        assert_eq!(settled.total_amount, dec!(80));
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_a_no_op() {
        let (ledger, order) = seeded_ledger("ws_CO_1").await;
        let r = reconciler(ledger.clone());
        r.reconcile(success_payload("ws_CO_1")).await.unwrap();
        let first = ledger.find_by_id(order.id).await.unwrap().unwrap();

        let outcome = r.reconcile(success_payload("ws_CO_1")).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::AlreadySettled);

        let second = ledger.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(second.payment_status, first.payment_status);
        assert_eq!(second.status, first.status);
        assert_eq!(second.updated_at, first.updated_at);
    }

    #[tokio::test]
    async fn test_repeated_deliveries_settle_exactly_once() {
        let (ledger, order) = seeded_ledger("ws_CO_1").await;
        let r = reconciler(ledger.clone());
        for _ in 0..4 {
            r.reconcile(success_payload("ws_CO_1")).await.unwrap();
        }
        let settled = ledger.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(settled.payment_status, PaymentStatus::Completed);
        assert_eq!(settled.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_cancelled_callback_fails_payment_only() {
        let (ledger, order) = seeded_ledger("ws_CO_1").await;
        let outcome = reconciler(ledger.clone())
            .reconcile(cancelled_payload("ws_CO_1"))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::PaymentFailed { result_code: 1032 });

        let settled = ledger.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(settled.payment_status, PaymentStatus::Failed);
        assert_eq!(settled.status, OrderStatus::Pending);
        assert!(settled.payment_details.unwrap().receipt_number.is_none());
    }

    #[tokio::test]
    async fn test_late_failure_cannot_overwrite_success() {
        let (ledger, order) = seeded_ledger("ws_CO_1").await;
        let r = reconciler(ledger.clone());
        r.reconcile(success_payload("ws_CO_1")).await.unwrap();

        let outcome = r.reconcile(cancelled_payload("ws_CO_1")).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::AlreadySettled);
        let settled = ledger.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(settled.payment_status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrent_conflicting_deliveries_settle_once() {
        let (ledger, order) = seeded_ledger("ws_CO_1").await;
        let r = Arc::new(reconciler(ledger.clone()));

        let (a, b) = tokio::join!(
            r.reconcile(success_payload("ws_CO_1")),
            r.reconcile(cancelled_payload("ws_CO_1")),
        );
        let outcomes = [a.unwrap(), b.unwrap()];
        let settled_count = outcomes
            .iter()
            .filter(|o| !matches!(o, ReconcileOutcome::AlreadySettled))
            .count();
        assert_eq!(settled_count, 1);

        let settled = ledger.find_by_id(order.id).await.unwrap().unwrap();
        assert!(settled.payment_status.is_terminal());
        match settled.payment_status {
            PaymentStatus::Completed => assert_eq!(settled.status, OrderStatus::Processing),
            PaymentStatus::Failed => assert_eq!(settled.status, OrderStatus::Pending),
            PaymentStatus::Pending => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_unknown_checkout_request_mutates_nothing() {
        let (ledger, order) = seeded_ledger("ws_CO_1").await;
        let err = reconciler(ledger.clone())
            .reconcile(success_payload("ws_CO_never_issued"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::UnknownCheckoutRequest(_)));

        let untouched = ledger.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(untouched.payment_status, PaymentStatus::Pending);
        assert_eq!(untouched.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_malformed_envelope_rejected() {
        let (ledger, _order) = seeded_ledger("ws_CO_1").await;
        let err = reconciler(ledger)
            .reconcile(serde_json::json!({ "Body": { "unexpected": true } }))
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::MalformedCallback(_)));
    }

    #[tokio::test]
    async fn test_success_without_metadata_still_completes() {
        let (ledger, order) = seeded_ledger("ws_CO_1").await;
        let payload = serde_json::json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "mr_1",
                    "CheckoutRequestID": "ws_CO_1",
                    "ResultCode": 0,
                    "ResultDesc": "Processed"
                }
            }
        });
        let outcome = reconciler(ledger.clone()).reconcile(payload).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::PaymentCompleted { receipt_number: None });
        let settled = ledger.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(settled.payment_status, PaymentStatus::Completed);
    }
}
