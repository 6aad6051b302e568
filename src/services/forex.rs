//! Forex rates: cache first, then providers in order, then a built-in table.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::cache::keys::normalize_currencies;
use crate::cache::Cache;
use crate::error::{LiteforexError, ProviderError, Result};
use crate::models::{Conversion, ForexRates, RateTable};
use crate::providers::ForexProvider;

/// Symbols used when a request names none.
pub const DEFAULT_SYMBOLS: [&str; 4] = ["EUR", "GBP", "JPY", "IDR"];

/// Currency list served when no provider can supply one.
const FALLBACK_CURRENCIES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "IDR", "SGD", "MYR", "THB", "PHP", "VND", "KRW", "CNY", "AUD", "CAD", "CHF", "NZD",
    "INR", "BRL", "ZAR", "MXN", "RUB", "HKD", "SEK", "NOK", "DKK", "PLN", "HUF", "CZK", "ILS", "AED", "SAR", "TRY",
    "EGP", "PKR", "BDT", "LKR", "NGN", "UAH", "COP", "CLP", "PEN", "ARS", "KWD", "QAR", "OMR", "BHD", "MAD", "TWD",
    "RON", "BGN", "HRK", "ISK", "JOD", "KES", "TZS", "GHS", "DZD", "TND", "LBP", "MMK", "KHR", "LAK", "MOP", "MNT",
    "UZS", "AZN", "GEL", "BYN", "BAM", "MKD", "ALL", "MDL", "RSD", "XOF", "XAF", "XPF", "XCD", "XDR",
];

/// Last-resort USD rates.
const DEFAULT_USD_RATES: &[(&str, f64)] = &[
    ("EUR", 0.92),
    ("GBP", 0.79),
    ("JPY", 148.50),
    ("IDR", 16200.50),
    ("SGD", 1.35),
    ("MYR", 4.75),
    ("THB", 35.80),
    ("PHP", 56.20),
    ("VND", 24500.00),
    ("KRW", 1330.00),
    ("CNY", 7.25),
    ("AUD", 1.52),
    ("CAD", 1.35),
    ("CHF", 0.88),
    ("NZD", 1.65),
];

pub struct ForexService {
    cache: Arc<Cache>,
    providers: Vec<Arc<dyn ForexProvider>>,
}

impl ForexService {
    pub fn new(cache: Arc<Cache>, providers: Vec<Arc<dyn ForexProvider>>) -> Self {
        Self { cache, providers }
    }

    /// Latest rates for `base`. Never fails: when every provider is down the
    /// built-in table is served, and that table is never cached.
    pub async fn latest(&self, base: &str, symbols: &[String]) -> ForexRates {
        let base = base.trim().to_uppercase();
        let symbols = normalize_currencies(symbols);

        if let Some(hit) = self.cache.get_forex_latest(&base, &symbols).await.flatten() {
            debug!(base = %base, "Serving cached forex rates");
            return hit;
        }

        match self.fetch_latest(&base, &symbols).await {
            Some(rates) => {
                self.cache.set_forex_latest(&base, &symbols, &rates).await;
                rates
            }
            None => {
                warn!(base = %base, "All forex providers failed; serving default rates");
                ForexRates {
                    base: base.clone(),
                    date: today(),
                    rates: default_rates(&base, &symbols),
                }
            }
        }
    }

    /// Fetch fresh rates and overwrite the cache entry. Returns whether a
    /// provider answered.
    pub async fn refresh_latest(&self, base: &str, symbols: &[String]) -> bool {
        let base = base.trim().to_uppercase();
        let symbols = normalize_currencies(symbols);

        match self.fetch_latest(&base, &symbols).await {
            Some(rates) => {
                self.cache.set_forex_latest(&base, &symbols, &rates).await;
                true
            }
            None => false,
        }
    }

    /// Convert `amount` of `from` into `to` at the latest rate.
    pub async fn convert(&self, amount: f64, from: &str, to: &str) -> Result<Conversion> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LiteforexError::InvalidRequest("amount must be positive".into()));
        }
        let from = from.trim().to_uppercase();
        let to = to.trim().to_uppercase();
        if from.is_empty() || to.is_empty() {
            return Err(LiteforexError::InvalidRequest("both currencies are required".into()));
        }

        if from == to {
            return Ok(Conversion {
                amount,
                from,
                to,
                rate: 1.0,
                result: amount,
                date: today(),
            });
        }

        let rates = self.latest(&from, std::slice::from_ref(&to)).await;
        let rate = match rates.rates.get(&to) {
            Some(rate) if *rate > 0.0 => *rate,
            _ => {
                return Err(LiteforexError::InvalidRequest(format!("no rate from {} to {}", from, to)));
            }
        };

        Ok(Conversion {
            amount,
            from,
            to,
            rate,
            result: round4(amount * rate),
            date: rates.date,
        })
    }

    /// Rates for `base` on `date`. Unlike [`latest`](Self::latest) there is no
    /// default table: a failure from every provider is an error.
    pub async fn historical(&self, date: NaiveDate, base: &str, symbols: &[String]) -> Result<ForexRates> {
        let base = base.trim().to_uppercase();
        let symbols = normalize_currencies(symbols);

        if let Some(hit) = self.cache.get_forex_historical(date, &base, &symbols).await.flatten() {
            debug!(base = %base, date = %date, "Serving cached historical forex rates");
            return Ok(hit);
        }

        let mut last_error = None;
        for provider in &self.providers {
            match provider.historical(date, &base, &symbols).await {
                Ok(rates) => {
                    self.cache.set_forex_historical(date, &base, &symbols, &rates).await;
                    return Ok(rates);
                }
                Err(e) => {
                    warn!(provider = provider.name(), date = %date, error = %e, "Historical forex fetch failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ProviderError::Rejected("no forex provider configured".into()))
            .into())
    }

    /// Currency codes the providers support, or a built-in list.
    pub async fn currencies(&self) -> Vec<String> {
        for provider in &self.providers {
            match provider.currencies().await {
                Ok(list) if !list.is_empty() => return list,
                Ok(_) => {}
                Err(e) => warn!(provider = provider.name(), error = %e, "Currency list fetch failed"),
            }
        }
        FALLBACK_CURRENCIES.iter().map(|c| c.to_string()).collect()
    }

    async fn fetch_latest(&self, base: &str, symbols: &[String]) -> Option<ForexRates> {
        for provider in &self.providers {
            match provider.latest(base, symbols).await {
                Ok(rates) => {
                    info!(provider = provider.name(), base = %base, "Fetched fresh forex rates");
                    return Some(rates);
                }
                Err(e) => {
                    warn!(provider = provider.name(), base = %base, error = %e, "Forex provider failed");
                }
            }
        }
        None
    }
}

/// Built-in rates. Only USD has a table; unknown symbols read as 1.0.
fn default_rates(base: &str, symbols: &[String]) -> RateTable {
    if base != "USD" {
        return RateTable::new();
    }
    let lookup = |symbol: &str| {
        DEFAULT_USD_RATES
            .iter()
            .find(|(code, _)| *code == symbol)
            .map(|(_, rate)| *rate)
    };

    if symbols.is_empty() {
        return DEFAULT_USD_RATES.iter().map(|(c, r)| (c.to_string(), *r)).collect();
    }
    symbols
        .iter()
        .map(|s| (s.clone(), lookup(s).unwrap_or(1.0)))
        .collect()
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn today() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheTtls;
    use crate::error::ProviderResult;
    use crate::store::{CounterStore, MemoryStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeForex {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeForex {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ForexProvider for FakeForex {
        fn name(&self) -> &str {
            "fake"
        }

        async fn latest(&self, base: &str, symbols: &[String]) -> ProviderResult<ForexRates> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::Status(503));
            }
            Ok(ForexRates {
                base: base.to_string(),
                date: "2024-01-02".into(),
                rates: symbols.iter().map(|s| (s.clone(), 2.0)).collect(),
            })
        }

        async fn historical(&self, date: NaiveDate, base: &str, symbols: &[String]) -> ProviderResult<ForexRates> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::Rejected("no data".into()));
            }
            Ok(ForexRates {
                base: base.to_string(),
                date: date.format("%Y-%m-%d").to_string(),
                rates: symbols.iter().map(|s| (s.clone(), 3.0)).collect(),
            })
        }

        async fn currencies(&self) -> ProviderResult<Vec<String>> {
            if self.fail {
                return Err(ProviderError::Status(500));
            }
            Ok(vec!["USD".into(), "EUR".into()])
        }
    }

    fn cache_with_store() -> (Arc<Cache>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let cache = Cache::new(Some(store.clone() as Arc<dyn CounterStore>), CacheTtls::default()).unwrap();
        (Arc::new(cache), store)
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_latest_caches_provider_result() {
        let (cache, _store) = cache_with_store();
        let provider = FakeForex::new(false);
        let service = ForexService::new(cache, vec![provider.clone()]);

        let first = service.latest("usd", &symbols(&["EUR", "GBP"])).await;
        let second = service.latest("USD", &symbols(&["GBP", "eur"])).await;

        assert_eq!(first, second);
        assert_eq!(first.rates["EUR"], 2.0);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_latest_falls_through_to_second_provider() {
        let (cache, _store) = cache_with_store();
        let broken = FakeForex::new(true);
        let healthy = FakeForex::new(false);
        let service = ForexService::new(cache, vec![broken.clone(), healthy.clone()]);

        let rates = service.latest("USD", &symbols(&["EUR"])).await;
        assert_eq!(rates.rates["EUR"], 2.0);
        assert_eq!(broken.calls(), 1);
        assert_eq!(healthy.calls(), 1);
    }

    #[tokio::test]
    async fn test_default_rates_are_not_cached() {
        let (cache, store) = cache_with_store();
        let provider = FakeForex::new(true);
        let service = ForexService::new(cache, vec![provider.clone()]);

        let rates = service.latest("USD", &symbols(&["EUR", "XYZ"])).await;
        assert_eq!(rates.rates["EUR"], 0.92);
        assert_eq!(rates.rates["XYZ"], 1.0);
        assert!(store.is_empty());

        service.latest("USD", &symbols(&["EUR", "XYZ"])).await;
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_default_rates_for_non_usd_base_are_empty() {
        let (cache, _store) = cache_with_store();
        let service = ForexService::new(cache, vec![FakeForex::new(true)]);

        let rates = service.latest("EUR", &symbols(&["USD"])).await;
        assert!(rates.rates.is_empty());
    }

    #[tokio::test]
    async fn test_latest_without_store_still_serves() {
        let cache = Arc::new(Cache::new(None, CacheTtls::default()).unwrap());
        let provider = FakeForex::new(false);
        let service = ForexService::new(cache, vec![provider.clone()]);

        service.latest("USD", &symbols(&["EUR"])).await;
        service.latest("USD", &symbols(&["EUR"])).await;
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_convert() {
        let (cache, _store) = cache_with_store();
        let service = ForexService::new(cache, vec![FakeForex::new(false)]);

        let conversion = service.convert(10.123456, "usd", "eur").await.unwrap();
        assert_eq!(conversion.from, "USD");
        assert_eq!(conversion.to, "EUR");
        assert_eq!(conversion.rate, 2.0);
        assert_eq!(conversion.result, 20.2469);
    }

    #[tokio::test]
    async fn test_convert_same_currency() {
        let (cache, _store) = cache_with_store();
        let provider = FakeForex::new(false);
        let service = ForexService::new(cache, vec![provider.clone()]);

        let conversion = service.convert(5.0, "JPY", "jpy").await.unwrap();
        assert_eq!(conversion.rate, 1.0);
        assert_eq!(conversion.result, 5.0);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_convert_rejects_non_positive_amount() {
        let (cache, _store) = cache_with_store();
        let service = ForexService::new(cache, vec![FakeForex::new(false)]);

        assert!(matches!(
            service.convert(0.0, "USD", "EUR").await,
            Err(LiteforexError::InvalidRequest(_))
        ));
        assert!(service.convert(-1.0, "USD", "EUR").await.is_err());
    }

    #[tokio::test]
    async fn test_convert_missing_rate_is_error() {
        let (cache, _store) = cache_with_store();
        let service = ForexService::new(cache, vec![FakeForex::new(true)]);

        // Default table has no EUR base, so there is no rate to use.
        assert!(service.convert(1.0, "EUR", "USD").await.is_err());
    }

    #[tokio::test]
    async fn test_historical_caches_and_errors() {
        let (cache, _store) = cache_with_store();
        let provider = FakeForex::new(false);
        let service = ForexService::new(cache.clone(), vec![provider.clone()]);
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let rates = service.historical(date, "USD", &symbols(&["EUR"])).await.unwrap();
        assert_eq!(rates.date, "2024-01-01");
        service.historical(date, "USD", &symbols(&["EUR"])).await.unwrap();
        assert_eq!(provider.calls(), 1);

        let failing = ForexService::new(cache, vec![FakeForex::new(true)]);
        let other = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        assert!(matches!(
            failing.historical(other, "USD", &symbols(&["EUR"])).await,
            Err(LiteforexError::Provider(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_overwrites_cache() {
        let (cache, _store) = cache_with_store();
        let provider = FakeForex::new(false);
        let service = ForexService::new(cache, vec![provider.clone()]);

        service.latest("USD", &symbols(&["EUR"])).await;
        assert!(service.refresh_latest("USD", &symbols(&["EUR"])).await);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_currencies_fallback() {
        let (cache, _store) = cache_with_store();
        let service = ForexService::new(cache.clone(), vec![FakeForex::new(false)]);
        assert_eq!(service.currencies().await, vec!["USD", "EUR"]);

        let failing = ForexService::new(cache, vec![FakeForex::new(true)]);
        let list = failing.currencies().await;
        assert!(list.contains(&"IDR".to_string()));
        assert_eq!(list.len(), FALLBACK_CURRENCIES.len());
    }
}
