//! Postgres-backed FX rate cache
//!
//! Latest row per `(base, counter)` pair; expired rows are kept so the
//! service can fall back to a stale rate when the provider is down.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::Currency;
use sqlx::PgPool;
use std::collections::HashMap;

use crate::fx::{CachedRate, RateCache};

pub struct PgRateCache {
    pool: PgPool,
}

impl PgRateCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_error(e: sqlx::Error) -> AppError {
    tracing::error!(error = %e, "FX cache query failed");
    AppError::new(ErrorCode::Internal)
}

#[async_trait]
impl RateCache for PgRateCache {
    async fn get(&self, base: Currency, counter: Currency) -> AppResult<Option<CachedRate>> {
        let row: Option<(Decimal, DateTime<Utc>)> = sqlx::query_as(
            "SELECT rate, expires_at FROM fx_rates_cache
             WHERE base_currency = $1 AND counter_currency = $2",
        )
        .bind(base.as_str())
        .bind(counter.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(|(rate, expires_at)| CachedRate { rate, expires_at }))
    }

    async fn get_many(
        &self,
        base: Currency,
        counters: &[Currency],
    ) -> AppResult<HashMap<Currency, CachedRate>> {
        let codes: Vec<&str> = counters.iter().map(Currency::as_str).collect();
        let rows: Vec<(String, Decimal, DateTime<Utc>)> = sqlx::query_as(
            "SELECT counter_currency, rate, expires_at FROM fx_rates_cache
             WHERE base_currency = $1 AND counter_currency = ANY($2)",
        )
        .bind(base.as_str())
        .bind(&codes[..])
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows
            .into_iter()
            .filter_map(|(code, rate, expires_at)| {
                Currency::parse(&code).map(|c| (c, CachedRate { rate, expires_at }))
            })
            .collect())
    }

    async fn put_many(
        &self,
        base: Currency,
        rates: &[(Currency, Decimal)],
        expires_at: DateTime<Utc>,
        provider: &str,
    ) -> AppResult<()> {
        let now = Utc::now();
        // Last-writer-wins by design; the cache is not a correctness boundary.
        for (counter, rate) in rates {
            sqlx::query(
                "INSERT INTO fx_rates_cache
                    (base_currency, counter_currency, rate, provider, fetched_at, expires_at)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (base_currency, counter_currency) DO UPDATE SET
                    rate = $3, provider = $4, fetched_at = $5, expires_at = $6",
            )
            .bind(base.as_str())
            .bind(counter.as_str())
            .bind(rate)
            .bind(provider)
            .bind(now)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        }
        Ok(())
    }
}
