//! Payment provider adapters
//!
//! Each adapter isolates one provider's quirks (minor-unit amounts,
//! webhook envelopes, verification mechanics) behind [`PaymentAdapter`].
//! Downstream code switches only on the canonical
//! [`shared::models::PaymentStatus`], never on raw provider event names.

pub mod mock;
pub mod paypal;
pub mod stripe;

use async_trait::async_trait;
use http::HeaderMap;
use rust_decimal::Decimal;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{
    CheckoutSession, Currency, PaymentChannel, PaymentVerification, RefundOutcome, WebhookPayload,
};
use std::collections::HashMap;
use uuid::Uuid;

pub use mock::MockAdapter;
pub use paypal::PaypalAdapter;
pub use stripe::StripeAdapter;

/// Input for opening a provider checkout session.
///
/// Creating a session touches only the remote provider; the local order is
/// never mutated here.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub order_id: Uuid,
    /// Major-unit amount; must be positive
    pub amount: Decimal,
    pub currency: Currency,
    pub product_title: String,
    pub buyer_email: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: HashMap<String, String>,
}

impl CheckoutSessionRequest {
    /// Pre-flight validation shared by all adapters
    pub fn validate(&self) -> AppResult<()> {
        if self.amount <= Decimal::ZERO {
            return Err(AppError::validation("checkout amount must be positive")
                .with_detail("amount", self.amount.to_string()));
        }
        if self.product_title.is_empty() {
            return Err(AppError::validation("product title must not be empty"));
        }
        Ok(())
    }
}

/// A payment provider behind a common capability set.
///
/// `refund` is an optional capability: the default implementation rejects
/// with `Unsupported`, and callers must check [`supports_refund`] before
/// invoking it.
///
/// [`supports_refund`]: PaymentAdapter::supports_refund
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    fn channel(&self) -> PaymentChannel;

    /// Open a provider-hosted checkout session for one payment attempt.
    async fn create_checkout_session(
        &self,
        req: &CheckoutSessionRequest,
    ) -> AppResult<CheckoutSession>;

    /// Verify a webhook delivery using the provider's official mechanism
    /// and return the canonical envelope. An unverified payload is never
    /// parsed as trusted — signature failures yield `SignatureInvalid`
    /// before any JSON is interpreted.
    async fn verify_webhook(
        &self,
        raw_payload: &[u8],
        headers: &HeaderMap,
    ) -> AppResult<WebhookPayload>;

    /// Map a verified event onto a canonical verification. Unrecognized
    /// event types yield `None` (ignored, not an error).
    fn handle_webhook(&self, payload: &WebhookPayload) -> Option<PaymentVerification>;

    /// Whether this provider supports refunds through this adapter
    fn supports_refund(&self) -> bool {
        false
    }

    /// Refund a payment; retry-safe on the provider side. `currency` scopes
    /// a partial `amount` to the charge currency's minor units.
    async fn refund(
        &self,
        payment_intent_id: &str,
        amount: Option<Decimal>,
        currency: Currency,
        reason: Option<&str>,
    ) -> AppResult<RefundOutcome> {
        let _ = (payment_intent_id, amount, currency, reason);
        Err(AppError::with_message(
            ErrorCode::Unsupported,
            format!("{} does not support refunds", self.channel()),
        ))
    }
}

/// Map a reqwest failure onto the retryable provider error
pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> AppError {
    tracing::warn!(provider = provider, error = %e, "Provider request failed");
    AppError::provider_transient(format!("{provider} request failed"))
}

/// Translate a non-2xx provider response: 5xx/429 are retryable, the rest
/// are terminal adapter failures surfaced with the provider's body.
pub(crate) fn response_error(provider: &str, status: http::StatusCode, body: &str) -> AppError {
    if status.is_server_error() || status.as_u16() == 429 {
        tracing::warn!(provider = provider, status = %status, "Provider unavailable");
        return AppError::provider_transient(format!("{provider} returned {status}"));
    }
    tracing::error!(provider = provider, status = %status, body = body, "Provider rejected request");
    AppError::with_message(
        ErrorCode::Internal,
        format!("{provider} rejected the request ({status})"),
    )
}

/// Pull a required header as a &str
pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> AppResult<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::with_message(
                ErrorCode::SignatureInvalid,
                format!("missing {name} header"),
            )
        })
}
