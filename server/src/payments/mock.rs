//! Deterministic in-process payment adapter
//!
//! Used for development checkouts and tests: sessions are fabricated
//! locally and webhooks are HMAC-signed with a configured secret so the
//! full verify → handle → transition path runs without a provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use http::HeaderMap;
use rust_decimal::Decimal;
use sha2::Sha256;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{
    CheckoutSession, CheckoutSessionStatus, Currency, PaymentChannel, PaymentStatus,
    PaymentVerification, RefundOutcome, WebhookPayload,
};
use std::collections::HashMap;
use std::str::FromStr;

use super::{header_str, CheckoutSessionRequest, PaymentAdapter};

pub struct MockAdapter {
    webhook_secret: String,
    checkout_base_url: String,
}

impl MockAdapter {
    pub fn new(webhook_secret: String, checkout_base_url: String) -> Self {
        Self {
            webhook_secret,
            checkout_base_url,
        }
    }

    /// Compute the `mock-signature` header value for a payload.
    ///
    /// Exposed so tests and dev tooling can construct deliverable webhooks.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.webhook_secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }
}

#[async_trait]
impl PaymentAdapter for MockAdapter {
    fn channel(&self) -> PaymentChannel {
        PaymentChannel::Mock
    }

    async fn create_checkout_session(
        &self,
        req: &CheckoutSessionRequest,
    ) -> AppResult<CheckoutSession> {
        req.validate()?;
        Ok(CheckoutSession {
            id: format!("mock_cs_{}", req.order_id),
            url: format!("{}/mock-checkout/{}", self.checkout_base_url, req.order_id),
            payment_intent_id: Some(format!("mock_pi_{}", req.order_id)),
            status: CheckoutSessionStatus::Pending,
        })
    }

    async fn verify_webhook(
        &self,
        raw_payload: &[u8],
        headers: &HeaderMap,
    ) -> AppResult<WebhookPayload> {
        let signature = header_str(headers, "mock-signature")?;
        let sig_bytes = hex::decode(signature)
            .map_err(|_| AppError::with_message(ErrorCode::SignatureInvalid, "invalid hex"))?;
        let mut mac = Hmac::<Sha256>::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::new(ErrorCode::SignatureInvalid))?;
        mac.update(raw_payload);
        mac.verify_slice(&sig_bytes)
            .map_err(|_| AppError::new(ErrorCode::SignatureInvalid))?;

        let event: serde_json::Value = serde_json::from_slice(raw_payload)
            .map_err(|_| AppError::validation("webhook body is not valid JSON"))?;

        let event_id = event["id"]
            .as_str()
            .ok_or_else(|| AppError::validation("webhook event missing id"))?
            .to_string();
        let event_type = event["type"]
            .as_str()
            .ok_or_else(|| AppError::validation("webhook event missing type"))?
            .to_string();
        let timestamp = event["created"]
            .as_i64()
            .and_then(|s| DateTime::from_timestamp(s, 0))
            .unwrap_or_else(Utc::now);

        Ok(WebhookPayload {
            event_id,
            event_type,
            data: event["data"].clone(),
            timestamp,
        })
    }

    fn handle_webhook(&self, payload: &WebhookPayload) -> Option<PaymentVerification> {
        let status = match payload.event_type.as_str() {
            "mock.payment.succeeded" => PaymentStatus::Success,
            "mock.payment.failed" => PaymentStatus::Failed,
            "mock.payment.pending" => PaymentStatus::Pending,
            _ => return None,
        };

        let data = &payload.data;
        let order_id = data["order_id"].as_str()?.to_string();
        let amount = Decimal::from_str(data["amount"].as_str()?).ok()?;
        let currency = Currency::parse(data["currency"].as_str()?)?;
        let payment_reference = data["reference"].as_str()?.to_string();

        Some(PaymentVerification {
            order_id,
            payment_reference,
            status,
            amount,
            currency,
            metadata: HashMap::new(),
        })
    }

    fn supports_refund(&self) -> bool {
        true
    }

    async fn refund(
        &self,
        payment_intent_id: &str,
        _amount: Option<Decimal>,
        _currency: Currency,
        _reason: Option<&str>,
    ) -> AppResult<RefundOutcome> {
        Ok(RefundOutcome {
            success: true,
            refund_id: Some(format!("mock_re_{payment_intent_id}")),
        })
    }
}

/// Build a mock webhook event body for tests and dev tooling
pub fn mock_event(
    event_id: &str,
    event_type: &str,
    order_id: &str,
    amount: Decimal,
    currency: Currency,
    reference: &str,
) -> Vec<u8> {
    serde_json::json!({
        "id": event_id,
        "type": event_type,
        "created": Utc::now().timestamp(),
        "data": {
            "order_id": order_id,
            "amount": amount.to_string(),
            "currency": currency.as_str(),
            "reference": reference,
        },
    })
    .to_string()
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn adapter() -> MockAdapter {
        MockAdapter::new("test-secret".into(), "http://localhost:8080".into())
    }

    #[tokio::test]
    async fn signed_event_round_trips_to_success() {
        let adapter = adapter();
        let body = mock_event(
            "evt_m1",
            "mock.payment.succeeded",
            "order-1",
            dec!(12.00),
            Currency::Eur,
            "mock_pi_order-1",
        );
        let mut headers = HeaderMap::new();
        headers.insert("mock-signature", adapter.sign(&body).parse().unwrap());

        let payload = adapter.verify_webhook(&body, &headers).await.unwrap();
        let v = adapter.handle_webhook(&payload).unwrap();
        assert_eq!(v.status, PaymentStatus::Success);
        assert_eq!(v.amount, dec!(12.00));
        assert_eq!(v.order_id, "order-1");
    }

    #[tokio::test]
    async fn wrong_signature_is_rejected() {
        let adapter = adapter();
        let body = mock_event(
            "evt_m2",
            "mock.payment.succeeded",
            "order-1",
            dec!(12.00),
            Currency::Eur,
            "ref",
        );
        let other = MockAdapter::new("other-secret".into(), "http://localhost".into());
        let mut headers = HeaderMap::new();
        headers.insert("mock-signature", other.sign(&body).parse().unwrap());

        let err = adapter.verify_webhook(&body, &headers).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SignatureInvalid);
    }
}
