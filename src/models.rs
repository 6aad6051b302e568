//! Normalized price data shared by providers, the cache and the HTTP layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Currency code to rate against some base.
pub type RateTable = BTreeMap<String, f64>;

/// Exchange rates for one base currency on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForexRates {
    pub base: String,
    /// `YYYY-MM-DD`
    pub date: String,
    pub rates: RateTable,
}

/// Result of converting an amount between two currencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub amount: f64,
    pub from: String,
    pub to: String,
    pub rate: f64,
    pub result: f64,
    pub date: String,
}

/// Price snapshot for one coin, quoted in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinQuote {
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_24h: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_24h: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circulating_supply: Option<f64>,
}

impl CoinQuote {
    pub fn price_only(price: f64) -> Self {
        Self {
            price,
            change_24h: None,
            market_cap: None,
            volume_24h: None,
            circulating_supply: None,
        }
    }
}

/// Quotes keyed by upper-cased coin id.
pub type CoinQuotes = BTreeMap<String, CoinQuote>;
