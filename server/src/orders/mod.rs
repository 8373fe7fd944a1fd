//! Order lifecycle
//!
//! The decision of what a payment verification means for an order is a
//! pure function over the current row; applying it is a conditional
//! update that tolerates duplicate and racing webhook deliveries. A
//! verification that contradicts what the order already recorded is
//! never applied — the order is flagged for manual review and the
//! delivery is acknowledged so the provider stops retrying.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use shared::error::{AppError, ErrorCode};
use shared::models::{Order, OrderStatus, PaymentStatus, PaymentVerification};
use uuid::Uuid;

use crate::db;
use crate::error::ServiceResult;
use crate::state::AppState;

/// Amounts within a cent of each other are the same money; provider
/// minor-unit round-trips can drift by less than this.
const AMOUNT_EPSILON: Decimal = dec!(0.01);

/// What a verification means for an order, decided before any write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Apply UNPAID -> PAID, binding the payment reference
    MarkPaid {
        payment_reference: String,
        payment_intent_id: Option<String>,
    },
    /// Apply UNPAID -> EXPIRED
    MarkExpired,
    /// Redelivery of an outcome the order already reflects
    AlreadyApplied,
    /// Nothing to do for this event
    Ignore(&'static str),
    /// The verification contradicts the order; do not apply, flag instead
    Conflict { reason: String },
}

/// Outcome of applying a verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// This delivery won a state transition
    Transitioned,
    /// A duplicate delivery; the order already reflects this outcome
    Duplicate,
    /// Event carried no actionable outcome for this order
    Ignored,
    /// Conflicting evidence; order flagged for manual review
    Flagged,
}

fn amounts_match(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= AMOUNT_EPSILON
}

fn intent_from_metadata(v: &PaymentVerification) -> Option<String> {
    v.metadata
        .get("payment_intent")
        .and_then(|m| m.as_str())
        .map(str::to_owned)
}

/// Decide the transition for a verification against the current order.
///
/// Pure and total: every combination of order status and payment status
/// maps to exactly one transition, so redeliveries and out-of-order
/// arrivals are reasoned about here rather than in handler code.
pub fn decide(order: &Order, v: &PaymentVerification) -> Transition {
    if v.currency != order.currency {
        return Transition::Conflict {
            reason: format!(
                "currency mismatch: order {} vs payment {}",
                order.currency, v.currency
            ),
        };
    }

    match v.status {
        PaymentStatus::Pending => Transition::Ignore("payment still pending"),
        PaymentStatus::Failed => match order.status {
            // A failed or abandoned attempt closes an open order.
            OrderStatus::Unpaid => Transition::MarkExpired,
            OrderStatus::Expired => Transition::AlreadyApplied,
            // Failure events for an order that already settled carry no
            // information; the success evidence already won.
            OrderStatus::Paid | OrderStatus::Refunded => {
                Transition::Ignore("failure event after settlement")
            }
        },
        PaymentStatus::Success => {
            if !amounts_match(v.amount, order.total) {
                return Transition::Conflict {
                    reason: format!(
                        "amount mismatch: order total {} vs payment {}",
                        order.total, v.amount
                    ),
                };
            }
            match order.status {
                OrderStatus::Unpaid => match &order.payment_reference {
                    Some(bound) if bound != &v.payment_reference => Transition::Conflict {
                        reason: format!(
                            "payment reference mismatch: bound {bound} vs {}",
                            v.payment_reference
                        ),
                    },
                    _ => Transition::MarkPaid {
                        payment_reference: v.payment_reference.clone(),
                        payment_intent_id: intent_from_metadata(v),
                    },
                },
                OrderStatus::Paid => match &order.payment_reference {
                    Some(bound) if bound == &v.payment_reference => Transition::AlreadyApplied,
                    _ => Transition::Conflict {
                        reason: format!(
                            "second success with different reference {}",
                            v.payment_reference
                        ),
                    },
                },
                OrderStatus::Expired => Transition::Conflict {
                    reason: "success arrived after the order expired".into(),
                },
                OrderStatus::Refunded => match &order.payment_reference {
                    Some(bound) if bound == &v.payment_reference => {
                        Transition::Ignore("success redelivered after refund")
                    }
                    _ => Transition::Conflict {
                        reason: format!(
                            "success with unknown reference {} on refunded order",
                            v.payment_reference
                        ),
                    },
                },
            }
        }
    }
}

/// Apply a verified payment outcome to its order.
///
/// Safe to call any number of times for the same event: the conditional
/// updates underneath make the first delivery win and the rest collapse
/// into [`ApplyOutcome::Duplicate`]. Conflicts are recorded and the
/// function still returns `Ok` so the webhook is acknowledged.
pub async fn apply_payment_verification(
    state: &AppState,
    v: &PaymentVerification,
) -> ServiceResult<ApplyOutcome> {
    let order_id = match Uuid::parse_str(&v.order_id) {
        Ok(id) => id,
        Err(_) => {
            tracing::warn!(order_id = %v.order_id, "Webhook carried a malformed order id");
            return Ok(ApplyOutcome::Ignored);
        }
    };

    let Some(order) = db::orders::find_by_id(&state.pool, order_id).await? else {
        tracing::warn!(%order_id, "Webhook references an unknown order");
        db::audit::log(
            &state.pool,
            None,
            "webhook.orphan",
            &format!("unknown order {order_id}, reference {}", v.payment_reference),
        )
        .await;
        return Ok(ApplyOutcome::Ignored);
    };

    match decide(&order, v) {
        Transition::MarkPaid {
            payment_reference,
            payment_intent_id,
        } => {
            let won = db::orders::mark_paid(
                &state.pool,
                order.id,
                &payment_reference,
                payment_intent_id.as_deref(),
                Utc::now(),
            )
            .await?;
            if !won {
                // A concurrent delivery got there first.
                return Ok(ApplyOutcome::Duplicate);
            }
            tracing::info!(order_id = %order.id, reference = %payment_reference, "Order paid");
            db::audit::log(&state.pool, Some(order.id), "order.paid", &payment_reference).await;
            fulfill(state, &order).await?;
            Ok(ApplyOutcome::Transitioned)
        }
        Transition::MarkExpired => {
            let won = db::orders::mark_expired(&state.pool, order.id, Utc::now()).await?;
            if !won {
                return Ok(ApplyOutcome::Duplicate);
            }
            tracing::info!(order_id = %order.id, "Order expired");
            db::audit::log(&state.pool, Some(order.id), "order.expired", &v.payment_reference)
                .await;
            Ok(ApplyOutcome::Transitioned)
        }
        Transition::AlreadyApplied => Ok(ApplyOutcome::Duplicate),
        Transition::Ignore(reason) => {
            tracing::debug!(order_id = %order.id, reason, "Webhook ignored");
            Ok(ApplyOutcome::Ignored)
        }
        Transition::Conflict { reason } => {
            tracing::warn!(order_id = %order.id, reason = %reason, "Conflicting webhook, flagging order");
            db::orders::flag_for_review(&state.pool, order.id, &reason).await?;
            db::audit::log(&state.pool, Some(order.id), "order.flagged", &reason).await;
            Ok(ApplyOutcome::Flagged)
        }
    }
}

/// Post-payment fulfillment: issue the download token and notify the
/// buyer. Email failures never unwind the paid transition.
async fn fulfill(state: &AppState, order: &Order) -> ServiceResult<()> {
    let files = match db::products::find_by_id(&state.pool, order.product_id).await? {
        Some(product) => product.file_keys,
        None => {
            tracing::error!(order_id = %order.id, product_id = %order.product_id, "Paid order references a missing product");
            db::orders::flag_for_review(&state.pool, order.id, "product missing at fulfillment")
                .await?;
            return Ok(());
        }
    };

    let token = state.tokens.issue(&state.pool, order, files, None).await?;
    db::audit::log(&state.pool, Some(order.id), "token.issued", &token.id.to_string()).await;

    let download_url = format!("{}/api/download/{}", state.public_base_url, token.token);
    if let Err(e) = crate::email::send_order_confirmation(
        &state.ses,
        &state.ses_from_email,
        &order.buyer_email,
        &order.order_number,
        order.total,
        order.currency,
    )
    .await
    {
        tracing::warn!(order_id = %order.id, error = %e, "Failed to send order confirmation");
    }
    if let Err(e) = crate::email::send_download_ready(
        &state.ses,
        &state.ses_from_email,
        &order.buyer_email,
        &order.order_number,
        &download_url,
        token.max_downloads,
        token.expires_at,
    )
    .await
    {
        tracing::warn!(order_id = %order.id, error = %e, "Failed to send download email");
    }
    Ok(())
}

/// Refund a paid order through its provider, then record PAID -> REFUNDED.
///
/// The provider call happens first; a provider failure leaves the order
/// PAID and retryable. Providers treat refund requests idempotently on
/// their side, so a retry after a lost response is safe.
pub async fn refund(
    state: &AppState,
    order_id: Uuid,
    amount: Option<Decimal>,
    reason: Option<&str>,
) -> ServiceResult<Order> {
    let order = db::orders::find_by_id(&state.pool, order_id)
        .await?
        .ok_or_else(|| AppError::not_found("order"))?;

    if order.status != OrderStatus::Paid {
        return Err(AppError::conflict(format!(
            "only paid orders can be refunded, order is {}",
            order.status.as_db()
        ))
        .into());
    }
    if let Some(amount) = amount {
        if amount <= Decimal::ZERO || amount > order.total {
            return Err(AppError::validation("refund amount must be positive and at most the order total")
                .with_detail("amount", amount.to_string())
                .into());
        }
    }

    let adapter = state.adapter(order.payment_channel)?;
    if !adapter.supports_refund() {
        return Err(AppError::with_message(
            ErrorCode::Unsupported,
            format!("{} does not support refunds", order.payment_channel),
        )
        .into());
    }
    let intent = order
        .payment_intent_id
        .as_deref()
        .or(order.payment_reference.as_deref())
        .ok_or_else(|| AppError::conflict("order has no payment to refund"))?;

    let outcome = adapter.refund(intent, amount, order.currency, reason).await?;
    if !outcome.success {
        return Err(AppError::provider_transient("provider declined the refund").into());
    }

    let won = db::orders::mark_refunded(&state.pool, order.id, Utc::now()).await?;
    if !won {
        // Raced with another refund request that already recorded it.
        tracing::info!(order_id = %order.id, "Order already marked refunded");
    }
    db::audit::log(
        &state.pool,
        Some(order.id),
        "order.refunded",
        outcome.refund_id.as_deref().unwrap_or("unknown"),
    )
    .await;

    if let Err(e) = crate::email::send_refund_processed(
        &state.ses,
        &state.ses_from_email,
        &order.buyer_email,
        &order.order_number,
    )
    .await
    {
        tracing::warn!(order_id = %order.id, error = %e, "Failed to send refund email");
    }

    db::orders::find_by_id(&state.pool, order.id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::Internal).into())
}
