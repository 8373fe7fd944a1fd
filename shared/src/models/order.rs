//! Order model
//!
//! Orders are created at checkout, mutated only by the payment transition
//! function and the explicit refund operation, and never deleted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Currency;

/// Order lifecycle status
///
/// UNPAID → PAID and UNPAID → EXPIRED via webhook verifications;
/// PAID → REFUNDED only via an explicit refund action. EXPIRED and
/// REFUNDED are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Unpaid,
    Paid,
    Expired,
    Refunded,
}

impl OrderStatus {
    /// Database representation
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Unpaid => "UNPAID",
            Self::Paid => "PAID",
            Self::Expired => "EXPIRED",
            Self::Refunded => "REFUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNPAID" => Some(Self::Unpaid),
            "PAID" => Some(Self::Paid),
            "EXPIRED" => Some(Self::Expired),
            "REFUNDED" => Some(Self::Refunded),
            _ => None,
        }
    }

    /// Terminal states admit no further webhook-driven transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Refunded)
    }
}

/// Payment provider handling an order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentChannel {
    Stripe,
    Paypal,
    Mock,
}

impl PaymentChannel {
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Stripe => "STRIPE",
            Self::Paypal => "PAYPAL",
            Self::Mock => "MOCK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "STRIPE" => Some(Self::Stripe),
            "PAYPAL" => Some(Self::Paypal),
            "MOCK" => Some(Self::Mock),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db())
    }
}

/// Order entity
///
/// Invariants: `total = subtotal + tax_amount` (± rounding epsilon);
/// `payment_reference`, once set, is immutable and unique per order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    /// Human-facing unique order number (e.g. `DW-20260830-4F7A2C`)
    pub order_number: String,
    pub product_id: Uuid,
    pub currency: Currency,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub status: OrderStatus,
    pub payment_channel: PaymentChannel,
    /// Provider payment reference, bound exactly once on the paid transition
    pub payment_reference: Option<String>,
    pub payment_intent_id: Option<String>,
    pub buyer_email: String,
    pub country: String,
    pub postal_code: Option<String>,
    pub vat_number: Option<String>,
    /// Set when a webhook conflicted with the order instead of transitioning it
    pub needs_review: bool,
    pub review_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
