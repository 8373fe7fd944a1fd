//! Checkout endpoint
//!
//! POST /api/checkout — prices the product in the buyer's currency,
//! applies tax for their jurisdiction, persists the UNPAID order, and
//! opens a provider-hosted checkout session.

use axum::extract::State;
use axum::Json;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::error::AppError;
use shared::models::{Currency, PaymentChannel, TaxStrategy};
use std::collections::HashMap;
use uuid::Uuid;

use crate::db;
use crate::error::ServiceResult;
use crate::payments::CheckoutSessionRequest;
use crate::state::AppState;
use crate::tax;

/// How long an unpaid order stays open before an abandonment closes it
const CHECKOUT_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub product_id: Uuid,
    pub payment_channel: PaymentChannel,
    /// Charge currency; defaults to the product's listed currency
    pub currency: Option<Currency>,
    pub buyer_email: String,
    /// ISO 3166-1 alpha-2
    pub country: String,
    pub postal_code: Option<String>,
    /// US state code, where applicable
    pub region: Option<String>,
    pub vat_number: Option<String>,
    #[serde(default)]
    pub tax_strategy: TaxStrategy,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub checkout_url: String,
    pub session_id: String,
    pub currency: Currency,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub tax_region: String,
}

fn order_number(now: chrono::DateTime<Utc>) -> String {
    let suffix: u32 = rand::random::<u32>() & 0xFF_FFFF;
    format!("DW-{}-{suffix:06X}", now.format("%Y%m%d"))
}

pub async fn create_checkout(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> ServiceResult<Json<CheckoutResponse>> {
    if !req.buyer_email.contains('@') {
        return Err(AppError::validation("buyer_email must be a valid email address").into());
    }

    let product = db::products::find_by_id(&state.pool, req.product_id)
        .await?
        .filter(|p| p.active)
        .ok_or_else(|| AppError::not_found("product"))?;
    if product.file_keys.is_empty() {
        return Err(AppError::validation("product has no downloadable files").into());
    }

    // Price in the charge currency; the product currency is the base.
    // Strict conversion: without a real rate the checkout is refused
    // rather than priced at parity.
    let currency = req.currency.unwrap_or(product.currency);
    let price = state
        .fx
        .convert_amount_strict(product.price, product.currency, currency)
        .await?;

    let tax = tax::calculate(&tax::TaxRequest {
        amount: price,
        country: req.country.clone(),
        region: req.region.clone(),
        vat_number: req.vat_number.clone(),
        product_type: Default::default(),
        strategy: req.tax_strategy,
    })?;

    let now = Utc::now();
    let order_id = Uuid::new_v4();
    let order_number = order_number(now);
    let new_order = db::orders::NewOrder {
        id: order_id,
        order_number: &order_number,
        product_id: product.id,
        currency,
        subtotal: tax.subtotal,
        tax_amount: tax.tax_amount,
        total: tax.total,
        payment_channel: req.payment_channel,
        buyer_email: &req.buyer_email,
        country: &req.country,
        postal_code: req.postal_code.as_deref(),
        vat_number: req.vat_number.as_deref(),
        expires_at: Some(now + Duration::hours(CHECKOUT_WINDOW_HOURS)),
        now,
    };
    db::orders::create(&state.pool, &new_order).await?;

    let adapter = state.adapter(req.payment_channel)?;
    let session = adapter
        .create_checkout_session(&CheckoutSessionRequest {
            order_id,
            amount: tax.total,
            currency,
            product_title: product.title.clone(),
            buyer_email: req.buyer_email.clone(),
            success_url: state.checkout_success_url.clone(),
            cancel_url: state.checkout_cancel_url.clone(),
            metadata: HashMap::from([("order_number".to_string(), order_number.clone())]),
        })
        .await?;
    db::orders::set_payment_intent(&state.pool, order_id, session.payment_intent_id.as_deref())
        .await?;

    tracing::info!(
        %order_id,
        %order_number,
        channel = %req.payment_channel,
        total = %tax.total,
        %currency,
        "Checkout session opened"
    );
    db::audit::log(&state.pool, Some(order_id), "order.created", &session.id).await;

    Ok(Json(CheckoutResponse {
        order_id,
        order_number,
        checkout_url: session.url,
        session_id: session.id,
        currency,
        subtotal: tax.subtotal,
        tax_amount: tax.tax_amount,
        total: tax.total,
        tax_region: tax.region,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_numbers_carry_the_date_and_a_hex_suffix() {
        let now = Utc::now();
        let n = order_number(now);
        let expected_prefix = format!("DW-{}-", now.format("%Y%m%d"));
        assert!(n.starts_with(&expected_prefix));
        let suffix = &n[expected_prefix.len()..];
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
