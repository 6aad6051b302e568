//! Upstream price providers.
//!
//! The services only see the traits below; each returns normalized data or
//! a [`ProviderError`](crate::error::ProviderError).

mod coingecko;
mod exchangerate;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::models::{CoinQuote, CoinQuotes, ForexRates};

pub use coingecko::CoinGeckoProvider;
pub use exchangerate::ExchangeRateHostProvider;

/// Source of currency exchange rates.
#[async_trait]
pub trait ForexProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn latest(&self, base: &str, symbols: &[String]) -> ProviderResult<ForexRates>;

    async fn historical(&self, date: NaiveDate, base: &str, symbols: &[String]) -> ProviderResult<ForexRates>;

    async fn currencies(&self) -> ProviderResult<Vec<String>>;
}

/// Source of cryptocurrency prices. Ids are provider coin ids (`bitcoin`).
#[async_trait]
pub trait CryptoProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn prices(&self, ids: &[String]) -> ProviderResult<CoinQuotes>;

    async fn market_caps(&self, ids: &[String]) -> ProviderResult<CoinQuotes>;

    /// Quote for one coin on `date`, or `None` if the provider has no data.
    async fn history(&self, id: &str, date: NaiveDate) -> ProviderResult<Option<CoinQuote>>;

    async fn coins(&self) -> ProviderResult<Vec<String>>;
}

/// Upstream endpoints and client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_exchangerate_url")]
    pub exchangerate_url: String,

    #[serde(default = "default_coingecko_url")]
    pub coingecko_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_exchangerate_url() -> String {
    "https://api.exchangerate.host".to_string()
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            exchangerate_url: default_exchangerate_url(),
            coingecko_url: default_coingecko_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ProviderConfig {
    /// Build the shared HTTP client.
    pub fn http_client(&self) -> ProviderResult<reqwest::Client> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.request_timeout_secs))
            .user_agent(concat!("liteforex/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(client)
    }
}

/// GET `url` and decode the JSON body, treating non-2xx as an error.
async fn fetch_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    query: &[(&str, String)],
) -> ProviderResult<T> {
    debug!(url = %url, "Fetching from upstream provider");
    let response = client.get(url).query(query).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status(status.as_u16()));
    }
    Ok(response.json().await?)
}

/// Canned providers for tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Every rate is 1.5; bases listed in `failing` return 502.
    #[derive(Default)]
    pub struct StaticForex {
        pub failing: Vec<String>,
    }

    impl StaticForex {
        pub fn failing_on(bases: &[&str]) -> Self {
            Self {
                failing: bases.iter().map(|b| b.to_string()).collect(),
            }
        }

        fn table(&self, base: &str, symbols: &[String], date: String) -> ProviderResult<ForexRates> {
            if self.failing.iter().any(|b| b == base) {
                return Err(ProviderError::Status(502));
            }
            Ok(ForexRates {
                base: base.to_string(),
                date,
                rates: symbols.iter().map(|s| (s.clone(), 1.5)).collect(),
            })
        }
    }

    #[async_trait]
    impl ForexProvider for StaticForex {
        fn name(&self) -> &str {
            "static"
        }

        async fn latest(&self, base: &str, symbols: &[String]) -> ProviderResult<ForexRates> {
            self.table(base, symbols, "2024-01-02".into())
        }

        async fn historical(&self, date: NaiveDate, base: &str, symbols: &[String]) -> ProviderResult<ForexRates> {
            self.table(base, symbols, date.format("%Y-%m-%d").to_string())
        }

        async fn currencies(&self) -> ProviderResult<Vec<String>> {
            Ok(vec!["EUR".into(), "USD".into()])
        }
    }

    /// Every coin is priced at 1.0.
    pub struct StaticCrypto;

    #[async_trait]
    impl CryptoProvider for StaticCrypto {
        fn name(&self) -> &str {
            "static"
        }

        async fn prices(&self, ids: &[String]) -> ProviderResult<CoinQuotes> {
            Ok(ids
                .iter()
                .map(|id| (id.to_ascii_uppercase(), CoinQuote::price_only(1.0)))
                .collect())
        }

        async fn market_caps(&self, ids: &[String]) -> ProviderResult<CoinQuotes> {
            self.prices(ids).await
        }

        async fn history(&self, _id: &str, _date: NaiveDate) -> ProviderResult<Option<CoinQuote>> {
            Ok(Some(CoinQuote::price_only(0.5)))
        }

        async fn coins(&self) -> ProviderResult<Vec<String>> {
            Ok(vec!["bitcoin".into(), "ethereum".into()])
        }
    }
}
