//! Postgres-backed ledger

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    CustomerDetails, LineItem, Msisdn, NewOrder, Order, OrderStatus, PaymentDetails,
    PaymentMethod, PaymentSettlement, PaymentStatus,
};
use crate::ledger::{LedgerError, OrderLedger};

pub struct PgOrderLedger {
    db: PgPool,
}

impl PgOrderLedger {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    customer: Json<CustomerDetails>,
    items: Json<Vec<LineItem>>,
    total_amount: Decimal,
    payment_method: String,
    payment_status: String,
    status: String,
    checkout_request_id: Option<String>,
    merchant_request_id: Option<String>,
    receipt_number: Option<String>,
    payer_phone: Option<String>,
    transaction_timestamp: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = LedgerError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let payment_method = PaymentMethod::parse(&row.payment_method)
            .ok_or_else(|| anyhow!("unknown payment method {:?}", row.payment_method))?;
        let payment_status = PaymentStatus::parse(&row.payment_status)
            .ok_or_else(|| anyhow!("unknown payment status {:?}", row.payment_status))?;
        let status = OrderStatus::parse(&row.status)
            .ok_or_else(|| anyhow!("unknown order status {:?}", row.status))?;
        let payment_details = match (row.checkout_request_id, row.payer_phone) {
            (Some(checkout_request_id), Some(payer_phone)) => Some(PaymentDetails {
                checkout_request_id,
                merchant_request_id: row.merchant_request_id.unwrap_or_default(),
                payer_phone: Msisdn::from_stored(payer_phone),
                receipt_number: row.receipt_number,
                transaction_timestamp: row.transaction_timestamp,
            }),
            _ => None,
        };
        Ok(Order {
            id: row.id,
            customer: row.customer.0,
            items: row.items.0,
            total_amount: row.total_amount,
            payment_method,
            payment_status,
            status,
            payment_details,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl OrderLedger for PgOrderLedger {
    async fn create_order(&self, new: NewOrder) -> Result<Order, LedgerError> {
        if new.items.is_empty() {
            return Err(LedgerError::Backend(anyhow!("order has no items")));
        }
        if new.total_amount.is_sign_negative() || new.total_amount.is_zero() {
            return Err(LedgerError::Backend(anyhow!("order total must be positive")));
        }
        let row = sqlx::query_as::<_, OrderRow>(
            "INSERT INTO orders (id, customer, items, total_amount, payment_method, payment_status, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, 'pending', 'pending', NOW(), NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(Json(&new.customer))
        .bind(Json(&new.items))
        .bind(new.total_amount)
        .bind(new.payment_method.as_str())
        .fetch_one(&self.db)
        .await
        .context("insert order")?;
        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, LedgerError> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("select order by id")?;
        row.map(Order::try_from).transpose()
    }

    async fn find_by_checkout_request_id(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<Order>, LedgerError> {
        let row =
            sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE checkout_request_id = $1")
                .bind(checkout_request_id)
                .fetch_optional(&self.db)
                .await
                .context("select order by checkout request id")?;
        row.map(Order::try_from).transpose()
    }

    async fn attach_payment_details(
        &self,
        order_id: Uuid,
        details: PaymentDetails,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE orders SET checkout_request_id = $2, merchant_request_id = $3, payer_phone = $4, updated_at = NOW() \
             WHERE id = $1 AND checkout_request_id IS NULL",
        )
        .bind(order_id)
        .bind(&details.checkout_request_id)
        .bind(&details.merchant_request_id)
        .bind(details.payer_phone.as_str())
        .execute(&self.db)
        .await
        .context("attach payment details")?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(order_id));
        }
        Ok(())
    }

    async fn settle_payment(
        &self,
        order_id: Uuid,
        expected: PaymentStatus,
        settlement: PaymentSettlement,
    ) -> Result<bool, LedgerError> {
        // Concurrent deliveries race on the status guard; at most one
        // update can match.
        let result = sqlx::query(
            "UPDATE orders SET payment_status = $2, status = COALESCE($3, status), \
             receipt_number = COALESCE($4, receipt_number), \
             transaction_timestamp = COALESCE($5, transaction_timestamp), updated_at = NOW() \
             WHERE id = $1 AND payment_status = $6",
        )
        .bind(order_id)
        .bind(settlement.payment_status.as_str())
        .bind(settlement.order_status.map(|s| s.as_str()))
        .bind(settlement.receipt_number)
        .bind(settlement.transaction_timestamp)
        .bind(expected.as_str())
        .execute(&self.db)
        .await
        .context("settle payment")?;
        Ok(result.rows_affected() == 1)
    }
}
