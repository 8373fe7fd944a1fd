//! Canonical payment value objects
//!
//! Every provider adapter normalizes its wire shapes into these types;
//! downstream logic switches only on [`PaymentStatus`], never on raw
//! provider event names.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::Currency;

/// Three-state canonical payment outcome
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Success,
    Failed,
    Pending,
}

/// Ephemeral adapter output for one webhook event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentVerification {
    /// Local order id carried through provider metadata
    pub order_id: String,
    /// Provider payment reference (session/capture id)
    pub payment_reference: String,
    pub status: PaymentStatus,
    /// Major-unit amount, already converted from provider minor units
    pub amount: Decimal,
    pub currency: Currency,
    pub metadata: HashMap<String, Value>,
}

/// Verified, provider-agnostic webhook envelope
#[derive(Debug, Clone)]
pub struct WebhookPayload {
    /// Provider event id, used for duplicate suppression
    pub event_id: String,
    /// Provider event name (e.g. `checkout.session.completed`)
    pub event_type: String,
    /// Event object, provider-shaped; only the owning adapter reads it
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

/// Status of a provider-hosted checkout session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutSessionStatus {
    Pending,
    Complete,
    Expired,
}

/// A provider-hosted payment page instance for one payment attempt
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Browser redirect URL
    pub url: String,
    pub payment_intent_id: Option<String>,
    pub status: CheckoutSessionStatus,
}

/// Result of a refund attempt
#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    pub success: bool,
    pub refund_id: Option<String>,
}
