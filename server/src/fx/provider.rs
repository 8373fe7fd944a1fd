//! HTTP rate provider
//!
//! Talks to an exchange-rate REST endpoint shaped like
//! `GET {base_url}/{BASE}` → `{"rates": {"EUR": 0.92, ...}}`.

use async_trait::async_trait;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use shared::error::{AppError, AppResult};
use shared::models::Currency;
use std::collections::HashMap;

use super::RateProvider;
use crate::payments::{response_error, transport_error};

pub struct HttpRateProvider {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRateProvider {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    async fn fetch_rates(
        &self,
        base: Currency,
        symbols: &[Currency],
    ) -> AppResult<HashMap<Currency, Decimal>> {
        let resp = self
            .client
            .get(format!("{}/{}", self.base_url, base.as_str()))
            .send()
            .await
            .map_err(|e| transport_error("fx", e))?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.map_err(|e| transport_error("fx", e))?;
        if !status.is_success() {
            return Err(response_error("fx", status, &body.to_string()));
        }

        let rates = body["rates"]
            .as_object()
            .ok_or_else(|| AppError::provider_transient("fx response missing rates"))?;

        let mut out = HashMap::new();
        for &symbol in symbols {
            // Rate providers emit floats; go through the f64 constructor
            // once and stay in Decimal from here on.
            if let Some(rate) = rates
                .get(symbol.as_str())
                .and_then(|v| v.as_f64())
                .and_then(Decimal::from_f64)
            {
                out.insert(symbol, rate);
            }
        }
        Ok(out)
    }
}
