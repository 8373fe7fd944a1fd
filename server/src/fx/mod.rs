//! FX rate cache service
//!
//! A TTL cache in front of a rate provider. The cache is an optimization
//! layer, not a correctness boundary: races are last-writer-wins, and on
//! provider failure the service degrades to a stale rate, then to 1.0.
//!
//! The 1.0 fallback is for display-level conversions only. Anything that
//! prices a real charge goes through the strict variants, which refuse
//! to convert without a real (fresh or stale) rate.

mod provider;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use shared::error::{AppError, AppResult};
use shared::models::{round_money, Currency};
use std::collections::HashMap;
use std::sync::Arc;

pub use provider::HttpRateProvider;

/// Upstream source of conversion rates
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Fetch `base -> symbol` rates for the requested symbols
    async fn fetch_rates(
        &self,
        base: Currency,
        symbols: &[Currency],
    ) -> AppResult<HashMap<Currency, Decimal>>;
}

/// A cached rate; staleness is judged by the service, so expired entries
/// are still returned and usable as a fallback.
#[derive(Debug, Clone)]
pub struct CachedRate {
    pub rate: Decimal,
    pub expires_at: DateTime<Utc>,
}

impl CachedRate {
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Persisted rate cache keyed by `(base, counter)`
#[async_trait]
pub trait RateCache: Send + Sync {
    async fn get(&self, base: Currency, counter: Currency) -> AppResult<Option<CachedRate>>;

    /// Multi-get for a batch of counters against one base
    async fn get_many(
        &self,
        base: Currency,
        counters: &[Currency],
    ) -> AppResult<HashMap<Currency, CachedRate>>;

    /// Upsert a batch of rates with a shared expiry
    async fn put_many(
        &self,
        base: Currency,
        rates: &[(Currency, Decimal)],
        expires_at: DateTime<Utc>,
        provider: &str,
    ) -> AppResult<()>;
}

pub struct FxService {
    provider: Arc<dyn RateProvider>,
    cache: Arc<dyn RateCache>,
    ttl: Duration,
}

impl FxService {
    pub fn new(provider: Arc<dyn RateProvider>, cache: Arc<dyn RateCache>, ttl: Duration) -> Self {
        Self {
            provider,
            cache,
            ttl,
        }
    }

    /// Get one conversion rate. Same-currency requests short-circuit to
    /// 1.0 without touching the cache or the provider.
    pub async fn get_rate(&self, from: Currency, to: Currency) -> AppResult<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }
        let rates = self.get_rates(from, &[to]).await?;
        Ok(rates.get(&to).copied().unwrap_or(Decimal::ONE))
    }

    /// Batched variant: one cache multi-get, one provider fetch for only
    /// the stale/missing counters, one batch write-back.
    pub async fn get_rates(
        &self,
        from: Currency,
        to: &[Currency],
    ) -> AppResult<HashMap<Currency, Decimal>> {
        let now = Utc::now();
        let mut result = HashMap::new();
        let mut wanted = Vec::new();
        for &counter in to {
            if counter == from {
                result.insert(counter, Decimal::ONE);
            } else if !wanted.contains(&counter) {
                wanted.push(counter);
            }
        }
        if wanted.is_empty() {
            return Ok(result);
        }

        let cached = self.cache.get_many(from, &wanted).await?;
        let mut missing = Vec::new();
        for &counter in &wanted {
            match cached.get(&counter) {
                Some(entry) if entry.is_fresh_at(now) => {
                    result.insert(counter, entry.rate);
                }
                _ => missing.push(counter),
            }
        }
        if missing.is_empty() {
            return Ok(result);
        }

        match self.provider.fetch_rates(from, &missing).await {
            Ok(fetched) => {
                let fresh: Vec<(Currency, Decimal)> = missing
                    .iter()
                    .filter_map(|c| fetched.get(c).map(|r| (*c, *r)))
                    .collect();
                if let Err(e) = self
                    .cache
                    .put_many(from, &fresh, now + self.ttl, "provider")
                    .await
                {
                    tracing::warn!(%from, error = %e, "Failed to write back FX cache");
                }
                for (counter, rate) in fresh {
                    result.insert(counter, rate);
                }
                // A provider answer missing a requested symbol degrades
                // the same way a provider failure does.
                for counter in &missing {
                    result.entry(*counter).or_insert_with(|| {
                        tracing::warn!(%from, to = %counter, "Rate missing from provider, defaulting to 1.0");
                        Decimal::ONE
                    });
                }
            }
            Err(e) => {
                tracing::warn!(%from, error = %e, "Rate provider failed, falling back to cache");
                for counter in missing {
                    match cached.get(&counter) {
                        Some(stale) => {
                            result.insert(counter, stale.rate);
                        }
                        None => {
                            tracing::warn!(%from, to = %counter, "No cached rate, defaulting to 1.0");
                            result.insert(counter, Decimal::ONE);
                        }
                    }
                }
            }
        }

        Ok(result)
    }

    /// Convert and round to 2 decimals
    pub async fn convert_amount(
        &self,
        amount: Decimal,
        from: Currency,
        to: Currency,
    ) -> AppResult<Decimal> {
        let rate = self.get_rate(from, to).await?;
        Ok(round_money(amount * rate))
    }

    /// Get one conversion rate, refusing the 1.0 fallback. No fresh rate,
    /// no stale rate, no provider means the conversion cannot be priced;
    /// the caller gets a retryable error instead of a parity guess.
    pub async fn get_rate_strict(&self, from: Currency, to: Currency) -> AppResult<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }
        let now = Utc::now();
        let cached = self.cache.get(from, to).await?;
        if let Some(entry) = &cached {
            if entry.is_fresh_at(now) {
                return Ok(entry.rate);
            }
        }

        match self.provider.fetch_rates(from, &[to]).await {
            Ok(fetched) => {
                if let Some(&rate) = fetched.get(&to) {
                    if let Err(e) = self
                        .cache
                        .put_many(from, &[(to, rate)], now + self.ttl, "provider")
                        .await
                    {
                        tracing::warn!(%from, error = %e, "Failed to write back FX cache");
                    }
                    return Ok(rate);
                }
                tracing::warn!(%from, %to, "Rate missing from provider answer");
            }
            Err(e) => {
                tracing::warn!(%from, %to, error = %e, "Rate provider failed");
            }
        }

        match cached {
            Some(stale) => {
                tracing::warn!(%from, %to, "Pricing with a stale exchange rate");
                Ok(stale.rate)
            }
            None => Err(AppError::provider_transient(format!(
                "no exchange rate available for {from} to {to}"
            ))),
        }
    }

    /// Strict conversion for charge pricing; rounds to 2 decimals
    pub async fn convert_amount_strict(
        &self,
        amount: Decimal,
        from: Currency,
        to: Currency,
    ) -> AppResult<Decimal> {
        let rate = self.get_rate_strict(from, to).await?;
        Ok(round_money(amount * rate))
    }

    /// Pin a rate for ~1 year, locking a quote independent of later drift
    pub async fn freeze_rate(&self, from: Currency, to: Currency, rate: Decimal) -> AppResult<()> {
        self.cache
            .put_many(from, &[(to, rate)], Utc::now() + Duration::days(365), "frozen")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    struct StubProvider {
        rates: HashMap<Currency, Decimal>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl StubProvider {
        fn new(rates: &[(Currency, Decimal)]) -> Self {
            Self {
                rates: rates.iter().copied().collect(),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                rates: HashMap::new(),
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RateProvider for StubProvider {
        async fn fetch_rates(
            &self,
            _base: Currency,
            symbols: &[Currency],
        ) -> AppResult<HashMap<Currency, Decimal>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(shared::error::AppError::provider_transient("stub down"));
            }
            Ok(symbols
                .iter()
                .filter_map(|c| self.rates.get(c).map(|r| (*c, *r)))
                .collect())
        }
    }

    #[derive(Default)]
    struct MemoryCache {
        entries: Mutex<HashMap<(Currency, Currency), CachedRate>>,
    }

    #[async_trait]
    impl RateCache for MemoryCache {
        async fn get(&self, base: Currency, counter: Currency) -> AppResult<Option<CachedRate>> {
            Ok(self.entries.lock().await.get(&(base, counter)).cloned())
        }

        async fn get_many(
            &self,
            base: Currency,
            counters: &[Currency],
        ) -> AppResult<HashMap<Currency, CachedRate>> {
            let entries = self.entries.lock().await;
            Ok(counters
                .iter()
                .filter_map(|c| entries.get(&(base, *c)).map(|e| (*c, e.clone())))
                .collect())
        }

        async fn put_many(
            &self,
            base: Currency,
            rates: &[(Currency, Decimal)],
            expires_at: DateTime<Utc>,
            _provider: &str,
        ) -> AppResult<()> {
            let mut entries = self.entries.lock().await;
            for (counter, rate) in rates {
                entries.insert(
                    (base, *counter),
                    CachedRate {
                        rate: *rate,
                        expires_at,
                    },
                );
            }
            Ok(())
        }
    }

    fn service(provider: Arc<StubProvider>, cache: Arc<MemoryCache>) -> FxService {
        FxService::new(provider, cache, Duration::hours(1))
    }

    #[tokio::test]
    async fn same_currency_makes_no_provider_call() {
        let provider = Arc::new(StubProvider::new(&[]));
        let svc = service(provider.clone(), Arc::new(MemoryCache::default()));

        let rate = svc.get_rate(Currency::Usd, Currency::Usd).await.unwrap();
        assert_eq!(rate, Decimal::ONE);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn second_lookup_within_ttl_hits_cache() {
        let provider = Arc::new(StubProvider::new(&[(Currency::Eur, dec!(0.92))]));
        let svc = service(provider.clone(), Arc::new(MemoryCache::default()));

        let first = svc.get_rate(Currency::Usd, Currency::Eur).await.unwrap();
        let second = svc.get_rate(Currency::Usd, Currency::Eur).await.unwrap();
        assert_eq!(first, dec!(0.92));
        assert_eq!(second, dec!(0.92));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn batch_fetches_only_missing_counters() {
        let provider = Arc::new(StubProvider::new(&[
            (Currency::Eur, dec!(0.92)),
            (Currency::Gbp, dec!(0.79)),
        ]));
        let cache = Arc::new(MemoryCache::default());
        let svc = service(provider.clone(), cache.clone());

        // Warm EUR only
        svc.get_rate(Currency::Usd, Currency::Eur).await.unwrap();
        assert_eq!(provider.call_count(), 1);

        let rates = svc
            .get_rates(Currency::Usd, &[Currency::Eur, Currency::Gbp, Currency::Usd])
            .await
            .unwrap();
        assert_eq!(provider.call_count(), 2);
        assert_eq!(rates[&Currency::Eur], dec!(0.92));
        assert_eq!(rates[&Currency::Gbp], dec!(0.79));
        assert_eq!(rates[&Currency::Usd], Decimal::ONE);
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_stale_rate() {
        let cache = Arc::new(MemoryCache::default());
        // Seed an already-expired entry
        cache
            .put_many(
                Currency::Usd,
                &[(Currency::Eur, dec!(0.90))],
                Utc::now() - Duration::minutes(5),
                "provider",
            )
            .await
            .unwrap();
        let svc = service(Arc::new(StubProvider::failing()), cache);

        let rate = svc.get_rate(Currency::Usd, Currency::Eur).await.unwrap();
        assert_eq!(rate, dec!(0.90));
    }

    #[tokio::test]
    async fn provider_failure_without_cache_defaults_to_one() {
        let svc = service(
            Arc::new(StubProvider::failing()),
            Arc::new(MemoryCache::default()),
        );
        let rate = svc.get_rate(Currency::Usd, Currency::Eur).await.unwrap();
        assert_eq!(rate, Decimal::ONE);
    }

    #[tokio::test]
    async fn strict_rate_errors_when_no_rate_exists() {
        let svc = service(
            Arc::new(StubProvider::failing()),
            Arc::new(MemoryCache::default()),
        );
        let err = svc
            .get_rate_strict(Currency::Usd, Currency::Eur)
            .await
            .unwrap_err();
        assert_eq!(err.code, shared::error::ErrorCode::ProviderTransient);
    }

    #[tokio::test]
    async fn strict_rate_accepts_a_stale_cache_entry() {
        let cache = Arc::new(MemoryCache::default());
        cache
            .put_many(
                Currency::Usd,
                &[(Currency::Eur, dec!(0.90))],
                Utc::now() - Duration::minutes(5),
                "provider",
            )
            .await
            .unwrap();
        let svc = service(Arc::new(StubProvider::failing()), cache);

        let rate = svc
            .get_rate_strict(Currency::Usd, Currency::Eur)
            .await
            .unwrap();
        assert_eq!(rate, dec!(0.90));
    }

    #[tokio::test]
    async fn strict_conversion_never_prices_at_parity() {
        let svc = service(
            Arc::new(StubProvider::failing()),
            Arc::new(MemoryCache::default()),
        );
        assert!(svc
            .convert_amount_strict(dec!(49.99), Currency::Eur, Currency::Usd)
            .await
            .is_err());
        // The lax path keeps its display-level fallback.
        assert_eq!(
            svc.convert_amount(dec!(49.99), Currency::Eur, Currency::Usd)
                .await
                .unwrap(),
            dec!(49.99)
        );
    }

    #[tokio::test]
    async fn strict_rate_caches_the_provider_answer() {
        let provider = Arc::new(StubProvider::new(&[(Currency::Eur, dec!(0.92))]));
        let svc = service(provider.clone(), Arc::new(MemoryCache::default()));

        let first = svc
            .get_rate_strict(Currency::Usd, Currency::Eur)
            .await
            .unwrap();
        let second = svc
            .get_rate_strict(Currency::Usd, Currency::Eur)
            .await
            .unwrap();
        assert_eq!(first, dec!(0.92));
        assert_eq!(second, dec!(0.92));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn frozen_rate_outlives_the_ttl() {
        let provider = Arc::new(StubProvider::new(&[(Currency::Eur, dec!(0.92))]));
        let cache = Arc::new(MemoryCache::default());
        let svc = service(provider.clone(), cache);

        svc.freeze_rate(Currency::Usd, Currency::Eur, dec!(0.85))
            .await
            .unwrap();
        let rate = svc.get_rate(Currency::Usd, Currency::Eur).await.unwrap();
        assert_eq!(rate, dec!(0.85));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn convert_amount_rounds_to_cents() {
        let provider = Arc::new(StubProvider::new(&[(Currency::Eur, dec!(0.9234))]));
        let svc = service(provider, Arc::new(MemoryCache::default()));

        let converted = svc
            .convert_amount(dec!(49.99), Currency::Usd, Currency::Eur)
            .await
            .unwrap();
        // 49.99 * 0.9234 = 46.160766
        assert_eq!(converted, dec!(46.16));
    }
}
