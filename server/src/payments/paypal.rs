//! PayPal integration via REST API (no SDK dependency)
//!
//! Webhook authenticity is delegated to PayPal's
//! `verify-webhook-signature` endpoint rather than checked locally, per
//! the provider's documented mechanism.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use rust_decimal::Decimal;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{
    CheckoutSession, CheckoutSessionStatus, Currency, PaymentChannel, PaymentStatus,
    PaymentVerification, RefundOutcome, WebhookPayload,
};
use std::collections::HashMap;
use std::str::FromStr;

use super::{header_str, response_error, transport_error, CheckoutSessionRequest, PaymentAdapter};

pub struct PaypalAdapter {
    client_id: String,
    client_secret: String,
    webhook_id: String,
    api_base: String,
    client: reqwest::Client,
}

impl PaypalAdapter {
    pub fn new(
        client_id: String,
        client_secret: String,
        webhook_id: String,
        api_base: String,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            webhook_id,
            api_base,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Client-credentials OAuth token, fetched per call; PayPal caches
    /// server-side and the call is cheap relative to webhook volume.
    async fn access_token(&self) -> AppResult<String> {
        let resp = self
            .client
            .post(format!("{}/v1/oauth2/token", self.api_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| transport_error("paypal", e))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| transport_error("paypal", e))?;
        if !status.is_success() {
            return Err(response_error("paypal", status, &body.to_string()));
        }

        body["access_token"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| AppError::with_message(ErrorCode::Internal, "paypal token missing"))
    }

    fn parse_amount(value: &serde_json::Value) -> Option<(Decimal, Currency)> {
        let amount = Decimal::from_str(value["value"].as_str()?).ok()?;
        let currency = Currency::parse(value["currency_code"].as_str()?)?;
        Some((amount, currency))
    }
}

#[async_trait]
impl PaymentAdapter for PaypalAdapter {
    fn channel(&self) -> PaymentChannel {
        PaymentChannel::Paypal
    }

    async fn create_checkout_session(
        &self,
        req: &CheckoutSessionRequest,
    ) -> AppResult<CheckoutSession> {
        req.validate()?;

        let token = self.access_token().await?;
        let body = serde_json::json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "custom_id": req.order_id.to_string(),
                "description": req.product_title,
                "amount": {
                    "currency_code": req.currency.as_str(),
                    "value": format!("{:.2}", req.amount),
                },
            }],
            "application_context": {
                "return_url": req.success_url,
                "cancel_url": req.cancel_url,
                "user_action": "PAY_NOW",
            },
        });

        let resp = self
            .client
            .post(format!("{}/v2/checkout/orders", self.api_base))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("paypal", e))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| transport_error("paypal", e))?;
        if !status.is_success() {
            return Err(response_error("paypal", status, &body.to_string()));
        }

        let id = body["id"]
            .as_str()
            .ok_or_else(|| AppError::with_message(ErrorCode::Internal, "paypal order missing id"))?
            .to_string();
        let url = body["links"]
            .as_array()
            .and_then(|links| {
                links
                    .iter()
                    .find(|l| l["rel"].as_str() == Some("approve"))
                    .and_then(|l| l["href"].as_str())
            })
            .ok_or_else(|| {
                AppError::with_message(ErrorCode::Internal, "paypal order missing approve link")
            })?
            .to_string();

        Ok(CheckoutSession {
            id,
            url,
            payment_intent_id: None,
            status: CheckoutSessionStatus::Pending,
        })
    }

    async fn verify_webhook(
        &self,
        raw_payload: &[u8],
        headers: &HeaderMap,
    ) -> AppResult<WebhookPayload> {
        let event: serde_json::Value = serde_json::from_slice(raw_payload)
            .map_err(|_| AppError::validation("webhook body is not valid JSON"))?;

        let verification = serde_json::json!({
            "auth_algo": header_str(headers, "paypal-auth-algo")?,
            "cert_url": header_str(headers, "paypal-cert-url")?,
            "transmission_id": header_str(headers, "paypal-transmission-id")?,
            "transmission_sig": header_str(headers, "paypal-transmission-sig")?,
            "transmission_time": header_str(headers, "paypal-transmission-time")?,
            "webhook_id": self.webhook_id,
            "webhook_event": event,
        });

        let token = self.access_token().await?;
        let resp = self
            .client
            .post(format!(
                "{}/v1/notifications/verify-webhook-signature",
                self.api_base
            ))
            .bearer_auth(&token)
            .json(&verification)
            .send()
            .await
            .map_err(|e| transport_error("paypal", e))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| transport_error("paypal", e))?;
        if !status.is_success() {
            return Err(response_error("paypal", status, &body.to_string()));
        }

        if body["verification_status"].as_str() != Some("SUCCESS") {
            return Err(AppError::new(ErrorCode::SignatureInvalid));
        }

        let event = verification["webhook_event"].clone();
        let event_id = event["id"]
            .as_str()
            .ok_or_else(|| AppError::validation("webhook event missing id"))?
            .to_string();
        let event_type = event["event_type"]
            .as_str()
            .ok_or_else(|| AppError::validation("webhook event missing event_type"))?
            .to_string();
        let timestamp = event["create_time"]
            .as_str()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(WebhookPayload {
            event_id,
            event_type,
            data: event["resource"].clone(),
            timestamp,
        })
    }

    fn handle_webhook(&self, payload: &WebhookPayload) -> Option<PaymentVerification> {
        let status = match payload.event_type.as_str() {
            "PAYMENT.CAPTURE.COMPLETED" => PaymentStatus::Success,
            "PAYMENT.CAPTURE.DENIED" | "PAYMENT.CAPTURE.DECLINED" => PaymentStatus::Failed,
            "PAYMENT.CAPTURE.PENDING" | "CHECKOUT.ORDER.APPROVED" => PaymentStatus::Pending,
            _ => return None,
        };

        let resource = &payload.data;
        let (order_id, amount_field) = if payload.event_type.starts_with("PAYMENT.CAPTURE.") {
            (
                resource["custom_id"].as_str()?.to_string(),
                &resource["amount"],
            )
        } else {
            // CHECKOUT.ORDER.* resources nest the purchase unit
            let unit = resource["purchase_units"].as_array()?.first()?;
            (unit["custom_id"].as_str()?.to_string(), &unit["amount"])
        };

        let (amount, currency) = Self::parse_amount(amount_field)?;
        let payment_reference = resource["id"].as_str()?.to_string();

        let mut metadata = HashMap::new();
        metadata.insert("event_type".into(), payload.event_type.clone().into());

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
        let token = self.access_token().await?;
        let mut body = serde_json::Map::new();
        if let Some(amount) = amount {
            body.insert(
                "amount".into(),
                serde_json::json!({
                    "value": format!("{:.2}", amount),
                    "currency_code": currency.as_str(),
                }),
            );
        }
        if let Some(reason) = reason {
            body.insert("note_to_payer".into(), reason.into());
        }

        let resp = self
            .client
            .post(format!(
                "{}/v2/payments/captures/{payment_intent_id}/refund",
                self.api_base
            ))
            .bearer_auth(&token)
            .json(&serde_json::Value::Object(body))
            .send()
            .await
            .map_err(|e| transport_error("paypal", e))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| transport_error("paypal", e))?;
        if !status.is_success() {
            return Err(response_error("paypal", status, &body.to_string()));
        }

        Ok(RefundOutcome {
            success: matches!(body["status"].as_str(), Some("COMPLETED") | Some("PENDING")),
            refund_id: body["id"].as_str().map(String::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn adapter() -> PaypalAdapter {
        PaypalAdapter::new(
            "client".into(),
            "secret".into(),
            "wh-1".into(),
            "https://api-m.sandbox.paypal.com".into(),
        )
    }

    fn capture_payload(event_type: &str) -> WebhookPayload {
        WebhookPayload {
            event_id: "WH-1".into(),
            event_type: event_type.into(),
            data: serde_json::json!({
                "id": "CAP-9XY",
                "custom_id": "6b8e7f1e-9f46-4f0e-9a58-6a2d6f9f0c01",
                "amount": { "value": "49.99", "currency_code": "USD" },
            }),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn capture_completed_maps_to_success() {
        let v = adapter()
            .handle_webhook(&capture_payload("PAYMENT.CAPTURE.COMPLETED"))
            .unwrap();
        assert_eq!(v.status, PaymentStatus::Success);
        assert_eq!(v.amount, dec!(49.99));
        assert_eq!(v.currency, Currency::Usd);
        assert_eq!(v.payment_reference, "CAP-9XY");
        assert_eq!(v.order_id, "6b8e7f1e-9f46-4f0e-9a58-6a2d6f9f0c01");
    }

    #[test]
    fn capture_denied_maps_to_failed() {
        let v = adapter()
            .handle_webhook(&capture_payload("PAYMENT.CAPTURE.DENIED"))
            .unwrap();
        assert_eq!(v.status, PaymentStatus::Failed);
    }

    #[test]
    fn order_approved_maps_to_pending_from_purchase_unit() {
        let payload = WebhookPayload {
            event_id: "WH-2".into(),
            event_type: "CHECKOUT.ORDER.APPROVED".into(),
            data: serde_json::json!({
                "id": "ORD-5",
                "purchase_units": [{
                    "custom_id": "order-1",
                    "amount": { "value": "10.00", "currency_code": "EUR" },
                }],
            }),
            timestamp: Utc::now(),
        };

        let v = adapter().handle_webhook(&payload).unwrap();
        assert_eq!(v.status, PaymentStatus::Pending);
        assert_eq!(v.amount, dec!(10.00));
        assert_eq!(v.currency, Currency::Eur);
    }

    #[test]
    fn unrelated_event_is_ignored() {
        assert!(adapter()
            .handle_webhook(&capture_payload("BILLING.PLAN.CREATED"))
            .is_none());
    }
}
