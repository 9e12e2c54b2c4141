//! Checkout payment initiation
//!
//! Turns a validated checkout submission into a durable order plus an
//! outbound STK push. The order row is persisted before any network call
//! so a crash mid-flow leaves a recoverable Pending order instead of an
//! untracked charge.

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::domain::events::OrderEvent;
use crate::domain::{CustomerDetails, LineItem, Msisdn, NewOrder, PaymentDetails, PaymentMethod};
use crate::error::CommerceError;
use crate::events::EventPublisher;
use crate::gateway::{GatewayError, PushGateway, PushRequest};
use crate::ledger::OrderLedger;

/// Site-level knobs for building gateway requests.
#[derive(Debug, Clone)]
pub struct CheckoutPolicy {
    pub account_tag: String,
    pub country_code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate]
    pub customer: CustomerDetails,
    #[validate(
        length(min = 1, message = "order must contain at least one item"),
        custom = "validate_items"
    )]
    pub items: Vec<LineItem>,
    #[validate(custom = "validate_total")]
    pub total_amount: Decimal,
}

fn validate_items(items: &[LineItem]) -> Result<(), ValidationError> {
    for item in items {
        if item.quantity == 0 {
            return Err(ValidationError::new("zero_quantity"));
        }
        if item.name.trim().is_empty() {
            return Err(ValidationError::new("unnamed_item"));
        }
        if item.unit_price.is_sign_negative() {
            return Err(ValidationError::new("negative_unit_price"));
        }
    }
    Ok(())
}

fn validate_total(total: &Decimal) -> Result<(), ValidationError> {
    if total.is_sign_negative() || total.is_zero() {
        return Err(ValidationError::new("non_positive_total"));
    }
    // Daraja caps a single push well below this.
    if *total > Decimal::from(500_000u32) {
        return Err(ValidationError::new("total_above_gateway_cap"));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct CheckoutReceipt {
    pub order_id: Uuid,
    pub checkout_request_id: String,
    pub customer_message: Option<String>,
}

pub struct PaymentInitiator {
    ledger: Arc<dyn OrderLedger>,
    gateway: Arc<dyn PushGateway>,
    events: EventPublisher,
    policy: CheckoutPolicy,
}

impl PaymentInitiator {
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        gateway: Arc<dyn PushGateway>,
        events: EventPublisher,
        policy: CheckoutPolicy,
    ) -> Self {
        Self { ledger, gateway, events, policy }
    }

    pub async fn initiate(&self, submission: CheckoutRequest) -> Result<CheckoutReceipt, CommerceError> {
        submission.validate()?;

        let order = self
            .ledger
            .create_order(NewOrder {
                customer: submission.customer,
                items: submission.items,
                total_amount: submission.total_amount,
                payment_method: PaymentMethod::Mpesa,
            })
            .await?;
        info!(order_id = %order.id, total = %order.total_amount, "order placed");
        self.events
            .publish(&OrderEvent::Placed { order_id: order.id, total_amount: order.total_amount })
            .await;

        let payer = Msisdn::normalize(&order.customer.phone, &self.policy.country_code)
            .map_err(|e| phone_validation_error(&e))?;
        // The gateway rejects fractional amounts; always round up.
        let amount = order
            .total_amount
            .ceil()
            .to_u64()
            .ok_or_else(|| GatewayError::Rejected(format!("amount {} not representable", order.total_amount)))?;

        let request = PushRequest {
            amount,
            payer: payer.clone(),
            account_reference: format!("{}-{}", self.policy.account_tag, order.id),
            description: format!("Order {}", order.id),
        };
        let acceptance = self.gateway.initiate_push(&request).await.map_err(|e| {
            // Non-acceptance does not prove the customer was never
            // charged; only a callback or an operator settles the order.
            warn!(order_id = %order.id, error = %e, "push not accepted; order left pending");
            e
        })?;

        self.ledger
            .attach_payment_details(
                order.id,
                PaymentDetails {
                    checkout_request_id: acceptance.checkout_request_id.clone(),
                    merchant_request_id: acceptance.merchant_request_id,
                    payer_phone: payer,
                    receipt_number: None,
                    transaction_timestamp: None,
                },
            )
            .await?;
        info!(
            order_id = %order.id,
            checkout_request_id = %acceptance.checkout_request_id,
            "push payment initiated"
        );

        Ok(CheckoutReceipt {
            order_id: order.id,
            checkout_request_id: acceptance.checkout_request_id,
            customer_message: acceptance.customer_message,
        })
    }
}

fn phone_validation_error(cause: &crate::domain::MsisdnError) -> CommerceError {
    let mut field_error = ValidationError::new("phone");
    field_error.message = Some(cause.to_string().into());
    let mut errors = validator::ValidationErrors::new();
    errors.add("customer.phone", field_error);
    CommerceError::Validation(errors)
}
