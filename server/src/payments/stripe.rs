//! Stripe integration via REST API (no SDK dependency)

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

use super::{header_str, response_error, transport_error, CheckoutSessionRequest, PaymentAdapter};

/// Reject webhook events older than 5 minutes to prevent replay attacks
const MAX_TIMESTAMP_AGE_SECS: i64 = 300;

pub struct StripeAdapter {
    secret_key: String,
    webhook_secret: String,
    api_base: String,
    client: reqwest::Client,
}

impl StripeAdapter {
    pub fn new(secret_key: String, webhook_secret: String) -> Self {
        Self {
            secret_key,
            webhook_secret,
            api_base: "https://api.stripe.com".into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Point the adapter at a different API base (testing)
    #[allow(dead_code)]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Verify a `Stripe-Signature` header (HMAC-SHA256 over `"{t}.{body}"`)
    fn verify_signature(&self, payload: &[u8], sig_header: &str) -> AppResult<()> {
        let mut timestamp = "";
        let mut signature = "";
        for part in sig_header.split(',') {
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = t;
            } else if let Some(v) = part.strip_prefix("v1=") {
                signature = v;
            }
        }

        if timestamp.is_empty() || signature.is_empty() {
            return Err(AppError::with_message(
                ErrorCode::SignatureInvalid,
                "malformed Stripe-Signature header",
            ));
        }

        let signed_payload = format!("{timestamp}.{}", std::str::from_utf8(payload).unwrap_or(""));
        let mut mac = Hmac::<Sha256>::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::new(ErrorCode::SignatureInvalid))?;
        mac.update(signed_payload.as_bytes());

        // Decode hex signature and use constant-time comparison via verify_slice
        let sig_bytes = hex::decode(signature)
            .map_err(|_| AppError::with_message(ErrorCode::SignatureInvalid, "invalid hex"))?;
        mac.verify_slice(&sig_bytes)
            .map_err(|_| AppError::new(ErrorCode::SignatureInvalid))?;

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| AppError::with_message(ErrorCode::SignatureInvalid, "invalid timestamp"))?;
        let now = Utc::now().timestamp();
        if (now - ts).abs() > MAX_TIMESTAMP_AGE_SECS {
            return Err(AppError::with_message(
                ErrorCode::SignatureInvalid,
                "webhook timestamp too old",
            ));
        }

        Ok(())
    }
}

/// Key a refund request by intent and amount so a retry after a lost
/// response replays the same refund instead of issuing a second one.
fn refund_idempotency_key(payment_intent_id: &str, minor_amount: Option<i64>) -> String {
    match minor_amount {
        Some(minor) => format!("refund-{payment_intent_id}-{minor}"),
        None => format!("refund-{payment_intent_id}-full"),
    }
}

/// A 400 for a charge that is already fully refunded means the money is
/// back with the buyer; the retry succeeded on a previous attempt.
fn charge_already_refunded(body: &serde_json::Value) -> bool {
    body["error"]["code"].as_str() == Some("charge_already_refunded")
}

#[async_trait]
impl PaymentAdapter for StripeAdapter {
    fn channel(&self) -> PaymentChannel {
        PaymentChannel::Stripe
    }

    async fn create_checkout_session(
        &self,
        req: &CheckoutSessionRequest,
    ) -> AppResult<CheckoutSession> {
        req.validate()?;

        let unit_amount = req
            .currency
            .to_minor_units(req.amount)
            .ok_or_else(|| AppError::validation("amount out of range"))?
            .to_string();
        let currency = req.currency.as_str().to_ascii_lowercase();
        let order_id = req.order_id.to_string();

        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("line_items[0][price_data][currency]".into(), currency),
            (
                "line_items[0][price_data][product_data][name]".into(),
                req.product_title.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".into(),
                unit_amount,
            ),
            ("line_items[0][quantity]".into(), "1".into()),
            ("customer_email".into(), req.buyer_email.clone()),
            ("success_url".into(), req.success_url.clone()),
            ("cancel_url".into(), req.cancel_url.clone()),
            ("metadata[order_id]".into(), order_id.clone()),
            (
                "payment_intent_data[metadata][order_id]".into(),
                order_id,
            ),
        ];
        for (k, v) in &req.metadata {
            form.push((format!("metadata[{k}]"), v.clone()));
        }

        let resp = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| transport_error("stripe", e))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| transport_error("stripe", e))?;
        if !status.is_success() {
            return Err(response_error("stripe", status, &body.to_string()));
        }

        let id = body["id"]
            .as_str()
            .ok_or_else(|| AppError::with_message(ErrorCode::Internal, "stripe session missing id"))?
            .to_string();
        let url = body["url"]
            .as_str()
            .ok_or_else(|| AppError::with_message(ErrorCode::Internal, "stripe session missing url"))?
            .to_string();

        Ok(CheckoutSession {
            id,
            url,
            payment_intent_id: body["payment_intent"].as_str().map(String::from),
            status: CheckoutSessionStatus::Pending,
        })
    }

    async fn verify_webhook(
        &self,
        raw_payload: &[u8],
        headers: &HeaderMap,
    ) -> AppResult<WebhookPayload> {
        let sig_header = header_str(headers, "stripe-signature")?;
        self.verify_signature(raw_payload, sig_header)?;

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
            data: event["data"]["object"].clone(),
            timestamp,
        })
    }

    fn handle_webhook(&self, payload: &WebhookPayload) -> Option<PaymentVerification> {
        let status = match payload.event_type.as_str() {
            "checkout.session.completed" => {
                // A completed session with an outstanding async payment
                // method (e.g. SEPA) is not money in the bank yet.
                if payload.data["payment_status"].as_str() == Some("unpaid") {
                    PaymentStatus::Pending
                } else {
                    PaymentStatus::Success
                }
            }
            "checkout.session.async_payment_succeeded" => PaymentStatus::Success,
            "checkout.session.async_payment_failed" | "checkout.session.expired" => {
                PaymentStatus::Failed
            }
            _ => return None,
        };

        let obj = &payload.data;
        let order_id = obj["metadata"]["order_id"].as_str()?.to_string();
        let currency = Currency::parse(obj["currency"].as_str()?)?;
        let amount = currency.from_minor_units(obj["amount_total"].as_i64()?);
        let payment_reference = obj["payment_intent"]
            .as_str()
            .or_else(|| obj["id"].as_str())?
            .to_string();

        let mut metadata = HashMap::new();
        metadata.insert("event_type".into(), payload.event_type.clone().into());
        if let Some(session_id) = obj["id"].as_str() {
            metadata.insert("session_id".into(), session_id.into());
        }

        Some(PaymentVerification {
            order_id,
            payment_reference,
            status,
            amount,
            currency,
            metadata,
        })
    }

    fn supports_refund(&self) -> bool {
        true
    }

    async fn refund(
        &self,
        payment_intent_id: &str,
        amount: Option<Decimal>,
        currency: Currency,
        reason: Option<&str>,
    ) -> AppResult<RefundOutcome> {
        let minor = match amount {
            Some(amount) => Some(
                currency
                    .to_minor_units(amount)
                    .ok_or_else(|| AppError::validation("refund amount out of range"))?,
            ),
            None => None,
        };
        let mut form: Vec<(String, String)> =
            vec![("payment_intent".into(), payment_intent_id.into())];
        if let Some(minor) = minor {
            form.push(("amount".into(), minor.to_string()));
        }
        if let Some(reason) = reason {
            form.push(("reason".into(), reason.into()));
        }

        let resp = self
            .client
            .post(format!("{}/v1/refunds", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .header(
                "Idempotency-Key",
                refund_idempotency_key(payment_intent_id, minor),
            )
            .form(&form)
            .send()
            .await
            .map_err(|e| transport_error("stripe", e))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| transport_error("stripe", e))?;
        if !status.is_success() {
            if charge_already_refunded(&body) {
                tracing::info!(payment_intent = payment_intent_id, "Charge already refunded");
                return Ok(RefundOutcome {
                    success: true,
                    refund_id: None,
                });
            }
            return Err(response_error("stripe", status, &body.to_string()));
        }

        Ok(RefundOutcome {
            success: matches!(body["status"].as_str(), Some("succeeded") | Some("pending")),
            refund_id: body["id"].as_str().map(String::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn adapter() -> StripeAdapter {
        StripeAdapter::new("sk_test_123".into(), "whsec_test".into())
    }

    fn sign(secret: &str, timestamp: i64, body: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.{body}").as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("t={timestamp},v1={sig}")
    }

    fn completed_event(order_id: &str, amount_total: i64, currency: &str) -> String {
        serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "created": Utc::now().timestamp(),
            "data": { "object": {
                "id": "cs_test_1",
                "payment_intent": "pi_123",
                "payment_status": "paid",
                "amount_total": amount_total,
                "currency": currency,
                "metadata": { "order_id": order_id },
            }},
        })
        .to_string()
    }

    #[tokio::test]
    async fn valid_signature_is_accepted() {
        let adapter = adapter();
        let body = completed_event("123", 4999, "usd");
        let mut headers = HeaderMap::new();
        headers.insert(
            "stripe-signature",
            sign("whsec_test", Utc::now().timestamp(), &body)
                .parse()
                .unwrap(),
        );

        let payload = adapter.verify_webhook(body.as_bytes(), &headers).await;
        assert_eq!(payload.unwrap().event_type, "checkout.session.completed");
    }

    #[tokio::test]
    async fn tampered_payload_is_rejected() {
        let adapter = adapter();
        let body = completed_event("123", 4999, "usd");
        let mut headers = HeaderMap::new();
        headers.insert(
            "stripe-signature",
            sign("whsec_test", Utc::now().timestamp(), &body)
                .parse()
                .unwrap(),
        );

        let tampered = body.replace("4999", "1");
        let err = adapter
            .verify_webhook(tampered.as_bytes(), &headers)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SignatureInvalid);
    }

    #[tokio::test]
    async fn stale_timestamp_is_rejected() {
        let adapter = adapter();
        let body = completed_event("123", 4999, "usd");
        let old = Utc::now().timestamp() - 600;
        let mut headers = HeaderMap::new();
        headers.insert("stripe-signature", sign("whsec_test", old, &body).parse().unwrap());

        let err = adapter
            .verify_webhook(body.as_bytes(), &headers)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SignatureInvalid);
    }

    #[tokio::test]
    async fn missing_signature_header_is_rejected() {
        let adapter = adapter();
        let err = adapter
            .verify_webhook(b"{}", &HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SignatureInvalid);
    }

    #[test]
    fn completed_session_maps_to_success_in_major_units() {
        let adapter = adapter();
        let event: serde_json::Value =
            serde_json::from_str(&completed_event("123", 4999, "usd")).unwrap();
        let payload = WebhookPayload {
            event_id: "evt_1".into(),
            event_type: "checkout.session.completed".into(),
            data: event["data"]["object"].clone(),
            timestamp: Utc::now(),
        };

        let v = adapter.handle_webhook(&payload).unwrap();
        assert_eq!(v.status, PaymentStatus::Success);
        assert_eq!(v.order_id, "123");
        assert_eq!(v.amount, dec!(49.99));
        assert_eq!(v.currency, Currency::Usd);
        assert_eq!(v.payment_reference, "pi_123");
    }

    #[test]
    fn unpaid_completed_session_maps_to_pending() {
        let adapter = adapter();
        let mut data: serde_json::Value =
            serde_json::from_str(&completed_event("123", 4999, "usd")).unwrap();
        data["data"]["object"]["payment_status"] = "unpaid".into();
        let payload = WebhookPayload {
            event_id: "evt_1".into(),
            event_type: "checkout.session.completed".into(),
            data: data["data"]["object"].clone(),
            timestamp: Utc::now(),
        };

        let v = adapter.handle_webhook(&payload).unwrap();
        assert_eq!(v.status, PaymentStatus::Pending);
    }

    #[test]
    fn expired_session_maps_to_failed() {
        let adapter = adapter();
        let event: serde_json::Value =
            serde_json::from_str(&completed_event("123", 4999, "usd")).unwrap();
        let payload = WebhookPayload {
            event_id: "evt_1".into(),
            event_type: "checkout.session.expired".into(),
            data: event["data"]["object"].clone(),
            timestamp: Utc::now(),
        };

        assert_eq!(
            adapter.handle_webhook(&payload).unwrap().status,
            PaymentStatus::Failed
        );
    }

    #[test]
    fn refund_key_is_stable_per_intent_and_amount() {
        assert_eq!(
            refund_idempotency_key("pi_123", Some(4999)),
            refund_idempotency_key("pi_123", Some(4999)),
        );
        assert_eq!(refund_idempotency_key("pi_123", None), "refund-pi_123-full");
        assert_ne!(
            refund_idempotency_key("pi_123", Some(4999)),
            refund_idempotency_key("pi_123", Some(2500)),
        );
        assert_ne!(
            refund_idempotency_key("pi_123", Some(4999)),
            refund_idempotency_key("pi_123", None),
        );
    }

    #[test]
    fn already_refunded_error_body_is_detected() {
        let body = serde_json::json!({
            "error": {
                "code": "charge_already_refunded",
                "message": "Charge ch_1 has already been refunded.",
                "type": "invalid_request_error",
            }
        });
        assert!(charge_already_refunded(&body));

        let other = serde_json::json!({
            "error": { "code": "amount_too_large", "type": "invalid_request_error" }
        });
        assert!(!charge_already_refunded(&other));
        assert!(!charge_already_refunded(&serde_json::json!({"id": "re_1"})));
    }

    #[test]
    fn unknown_event_type_is_ignored() {
        let adapter = adapter();
        let payload = WebhookPayload {
            event_id: "evt_2".into(),
            event_type: "customer.created".into(),
            data: serde_json::json!({}),
            timestamp: Utc::now(),
        };
        assert!(adapter.handle_webhook(&payload).is_none());
    }
}
