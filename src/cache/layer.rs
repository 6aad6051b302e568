//! Cache layer over the counter store.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::category::{CacheCategory, CacheTtls};
use super::keys;
use crate::error::{Result, StoreResult};
use crate::models::{CoinQuotes, ForexRates};
use crate::store::{Availability, CounterStore};

/// Read-through cache for provider responses.
///
/// Every store failure is absorbed here: lookups turn into
/// [`Availability::Unavailable`] and callers fetch from the provider as if
/// they had missed. Without a store the cache is a permanent pass-through.
pub struct Cache {
    store: Option<Arc<dyn CounterStore>>,
    ttls: CacheTtls,
}

impl Cache {
    pub fn new(store: Option<Arc<dyn CounterStore>>, ttls: CacheTtls) -> Result<Self> {
        ttls.validate()?;
        if store.is_none() {
            warn!("Cache has no counter store; running as pass-through");
        }
        Ok(Self { store, ttls })
    }

    /// Whether a store was configured at all.
    pub fn is_connected(&self) -> bool {
        self.store.is_some()
    }

    pub fn ttl(&self, category: CacheCategory) -> Duration {
        self.ttls.ttl(category)
    }

    pub async fn ping(&self) -> Availability<()> {
        self.call("ping", "-", |store| async move { store.ping().await }).await
    }

    /// Fetch and decode `key`. A payload that no longer decodes reads as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Availability<Option<T>> {
        let raw = self.call("get", key, |store| async move { store.get(key).await }).await;
        raw.map(|raw| {
            let raw = raw?;
            match serde_json::from_str(&raw) {
                Ok(value) => {
                    trace!(key = %key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                    None
                }
            }
        })
    }

    /// Serialize and store `value`, expiring after `ttl`.
    ///
    /// Yields `false` if the value could not be serialized or `ttl` is zero.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> Availability<bool> {
        if ttl.is_zero() {
            warn!(key = %key, "Refusing to cache without a TTL");
            return Availability::Available(false);
        }
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize cache entry");
                return Availability::Available(false);
            }
        };

        let payload = payload.as_str();
        self.call("set", key, |store| async move { store.set(key, payload, Some(ttl)).await })
            .await
            .map(|()| {
                debug!(key = %key, ttl_secs = ttl.as_secs(), "Cached entry");
                true
            })
    }

    pub async fn exists(&self, key: &str) -> Availability<bool> {
        self.call("exists", key, |store| async move { store.exists(key).await }).await
    }

    pub async fn delete(&self, key: &str) -> Availability<bool> {
        let keys = [key.to_string()];
        let keys = &keys[..];
        self.call("delete", key, |store| async move { store.delete(keys).await })
            .await
            .map(|removed| removed > 0)
    }

    /// Administrative clear of one category, or of every cache category.
    ///
    /// Yields the number of entries removed. Rate-limit counters are never touched.
    pub async fn clear(&self, category: Option<CacheCategory>) -> Availability<u64> {
        let categories: Vec<CacheCategory> = match category {
            Some(category) => vec![category],
            None => CacheCategory::ALL.to_vec(),
        };

        let mut removed = 0;
        for category in categories {
            let pattern = format!("{}:*", category.prefix());
            let pattern = pattern.as_str();
            let outcome = self
                .call("clear", pattern, |store| async move {
                    let keys = store.keys(pattern).await?;
                    store.delete(&keys).await
                })
                .await;
            match outcome {
                Availability::Available(n) => removed += n,
                Availability::Unavailable => return Availability::Unavailable,
            }
        }

        info!(category = ?category.map(|c| c.prefix()), removed, "Cleared cache");
        Availability::Available(removed)
    }

    pub async fn get_forex_latest(&self, base: &str, symbols: &[String]) -> Availability<Option<ForexRates>> {
        self.get(&keys::forex_latest(base, symbols)).await
    }

    pub async fn set_forex_latest(&self, base: &str, symbols: &[String], rates: &ForexRates) -> Availability<bool> {
        let ttl = self.ttl(CacheCategory::ForexLatest);
        self.set(&keys::forex_latest(base, symbols), rates, ttl).await
    }

    pub async fn get_forex_historical(
        &self,
        date: NaiveDate,
        base: &str,
        symbols: &[String],
    ) -> Availability<Option<ForexRates>> {
        self.get(&keys::forex_historical(date, base, symbols)).await
    }

    pub async fn set_forex_historical(
        &self,
        date: NaiveDate,
        base: &str,
        symbols: &[String],
        rates: &ForexRates,
    ) -> Availability<bool> {
        let ttl = self.ttl(CacheCategory::ForexHistorical);
        self.set(&keys::forex_historical(date, base, symbols), rates, ttl).await
    }

    pub async fn get_crypto_latest(&self, ids: &[String]) -> Availability<Option<CoinQuotes>> {
        self.get(&keys::crypto_latest(ids)).await
    }

    pub async fn set_crypto_latest(&self, ids: &[String], quotes: &CoinQuotes) -> Availability<bool> {
        let ttl = self.ttl(CacheCategory::CryptoLatest);
        self.set(&keys::crypto_latest(ids), quotes, ttl).await
    }

    pub async fn get_crypto_historical(&self, date: NaiveDate, ids: &[String]) -> Availability<Option<CoinQuotes>> {
        self.get(&keys::crypto_historical(date, ids)).await
    }

    pub async fn set_crypto_historical(&self, date: NaiveDate, ids: &[String], quotes: &CoinQuotes) -> Availability<bool> {
        let ttl = self.ttl(CacheCategory::CryptoHistorical);
        self.set(&keys::crypto_historical(date, ids), quotes, ttl).await
    }

    pub async fn get_crypto_marketcap(&self, ids: &[String]) -> Availability<Option<CoinQuotes>> {
        self.get(&keys::crypto_marketcap(ids)).await
    }

    pub async fn set_crypto_marketcap(&self, ids: &[String], quotes: &CoinQuotes) -> Availability<bool> {
        let ttl = self.ttl(CacheCategory::CryptoMarketCap);
        self.set(&keys::crypto_marketcap(ids), quotes, ttl).await
    }

    /// Run one store call, mapping any failure to `Unavailable`.
    async fn call<'a, T, F, Fut>(&'a self, op: &'static str, key: &str, f: F) -> Availability<T>
    where
        F: FnOnce(&'a dyn CounterStore) -> Fut,
        Fut: std::future::Future<Output = StoreResult<T>> + 'a,
    {
        let Some(store) = &self.store else {
            return Availability::Unavailable;
        };
        match f(store.as_ref()).await {
            Ok(value) => Availability::Available(value),
            Err(e) => {
                warn!(op, key = %key, error = %e, "Cache store unavailable");
                Availability::Unavailable
            }
        }
    }
}
