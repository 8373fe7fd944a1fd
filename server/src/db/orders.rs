//! Order queries
//!
//! Every mutation is a conditional update keyed on the current status —
//! webhook deliveries duplicate and race, and `rows_affected` tells the
//! caller whether this invocation won the transition.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};
use shared::models::{Currency, Order, OrderStatus, PaymentChannel};
use sqlx::PgPool;
use uuid::Uuid;

pub struct NewOrder<'a> {
    pub id: Uuid,
    pub order_number: &'a str,
    pub product_id: Uuid,
    pub currency: Currency,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub payment_channel: PaymentChannel,
    pub buyer_email: &'a str,
    pub country: &'a str,
    pub postal_code: Option<&'a str>,
    pub vat_number: Option<&'a str>,
    pub expires_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    product_id: Uuid,
    currency: String,
    subtotal: Decimal,
    tax_amount: Decimal,
    total: Decimal,
    status: String,
    payment_channel: String,
    payment_reference: Option<String>,
    payment_intent_id: Option<String>,
    buyer_email: String,
    country: String,
    postal_code: Option<String>,
    vat_number: Option<String>,
    needs_review: bool,
    review_reason: Option<String>,
    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self) -> Result<Order, AppError> {
        let decode = |what: &str| {
            AppError::with_message(ErrorCode::Internal, format!("corrupt order column: {what}"))
        };
        Ok(Order {
            id: self.id,
            order_number: self.order_number,
            product_id: self.product_id,
            currency: Currency::parse(&self.currency).ok_or_else(|| decode("currency"))?,
            subtotal: self.subtotal,
            tax_amount: self.tax_amount,
            total: self.total,
            status: OrderStatus::parse(&self.status).ok_or_else(|| decode("status"))?,
            payment_channel: PaymentChannel::parse(&self.payment_channel)
                .ok_or_else(|| decode("payment_channel"))?,
            payment_reference: self.payment_reference,
            payment_intent_id: self.payment_intent_id,
            buyer_email: self.buyer_email,
            country: self.country,
            postal_code: self.postal_code,
            vat_number: self.vat_number,
            needs_review: self.needs_review,
            review_reason: self.review_reason,
            created_at: self.created_at,
            paid_at: self.paid_at,
            expires_at: self.expires_at,
            updated_at: self.updated_at,
        })
    }
}

const ORDER_COLUMNS: &str = "id, order_number, product_id, currency, subtotal, tax_amount, total, \
     status, payment_channel, payment_reference, payment_intent_id, buyer_email, country, \
     postal_code, vat_number, needs_review, review_reason, created_at, paid_at, expires_at, \
     updated_at";

pub async fn create(pool: &PgPool, order: &NewOrder<'_>) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO orders (id, order_number, product_id, currency, subtotal, tax_amount, total,
            status, payment_channel, buyer_email, country, postal_code, vat_number,
            expires_at, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, 'UNPAID', $8, $9, $10, $11, $12, $13, $14, $14)",
    )
    .bind(order.id)
    .bind(order.order_number)
    .bind(order.product_id)
    .bind(order.currency.as_str())
    .bind(order.subtotal)
    .bind(order.tax_amount)
    .bind(order.total)
    .bind(order.payment_channel.as_db())
    .bind(order.buyer_email)
    .bind(order.country)
    .bind(order.postal_code)
    .bind(order.vat_number)
    .bind(order.expires_at)
    .bind(order.now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Order>, sqlx::Error> {
    let row: Option<OrderRow> =
        sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;
    row.map(|r| r.into_order().map_err(|e| sqlx::Error::Decode(e.into())))
        .transpose()
}

/// Record the provider session/intent after the checkout session opens
pub async fn set_payment_intent(
    pool: &PgPool,
    id: Uuid,
    payment_intent_id: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET payment_intent_id = $1, updated_at = now() WHERE id = $2")
        .bind(payment_intent_id)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// UNPAID → PAID, binding the payment reference. Conditional on current
/// status; returns whether this call won the transition.
pub async fn mark_paid(
    pool: &PgPool,
    id: Uuid,
    payment_reference: &str,
    payment_intent_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE orders
         SET status = 'PAID', paid_at = $1, payment_reference = $2,
             payment_intent_id = COALESCE($3, payment_intent_id), updated_at = $1
         WHERE id = $4 AND status = 'UNPAID'
           AND (payment_reference IS NULL OR payment_reference = $2)",
    )
    .bind(now)
    .bind(payment_reference)
    .bind(payment_intent_id)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// UNPAID → EXPIRED
pub async fn mark_expired(pool: &PgPool, id: Uuid, now: DateTime<Utc>) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE orders SET status = 'EXPIRED', updated_at = $1
         WHERE id = $2 AND status = 'UNPAID'",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// PAID → REFUNDED, only via the explicit refund action
pub async fn mark_refunded(
    pool: &PgPool,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE orders SET status = 'REFUNDED', updated_at = $1
         WHERE id = $2 AND status = 'PAID'",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Flag an order for manual review instead of applying a suspect webhook
pub async fn flag_for_review(pool: &PgPool, id: Uuid, reason: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE orders SET needs_review = TRUE, review_reason = $1, updated_at = now()
         WHERE id = $2",
    )
    .bind(reason)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}
