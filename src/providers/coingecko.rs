//! CoinGecko crypto provider.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use super::{fetch_json, CryptoProvider};
use crate::error::{ProviderError, ProviderResult};
use crate::models::{CoinQuote, CoinQuotes};

/// Number of ids returned by [`CoinGeckoProvider::coins`].
const COIN_LIST_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
struct SimplePrice {
    usd: Option<f64>,
    usd_24h_change: Option<f64>,
    usd_market_cap: Option<f64>,
    usd_24h_vol: Option<f64>,
    circulating_supply: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MarketEntry {
    id: String,
    current_price: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    market_cap: Option<f64>,
    total_volume: Option<f64>,
    circulating_supply: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    market_data: Option<HistoryMarketData>,
}

#[derive(Debug, Deserialize)]
struct HistoryMarketData {
    #[serde(default)]
    current_price: BTreeMap<String, f64>,
    #[serde(default)]
    market_cap: BTreeMap<String, f64>,
    #[serde(default)]
    total_volume: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct CoinListEntry {
    id: String,
}

pub struct CoinGeckoProvider {
    client: reqwest::Client,
    base_url: String,
}

impl CoinGeckoProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

fn from_simple(body: BTreeMap<String, SimplePrice>) -> ProviderResult<CoinQuotes> {
    let quotes: CoinQuotes = body
        .into_iter()
        .filter_map(|(id, p)| {
            let price = p.usd?;
            Some((
                id.to_uppercase(),
                CoinQuote {
                    price,
                    change_24h: p.usd_24h_change,
                    market_cap: p.usd_market_cap,
                    volume_24h: p.usd_24h_vol,
                    circulating_supply: p.circulating_supply,
                },
            ))
        })
        .collect();

    if quotes.is_empty() {
        return Err(ProviderError::Rejected("coingecko returned no prices".into()));
    }
    Ok(quotes)
}

fn from_markets(body: Vec<MarketEntry>) -> ProviderResult<CoinQuotes> {
    let quotes: CoinQuotes = body
        .into_iter()
        .filter_map(|m| {
            let price = m.current_price?;
            Some((
                m.id.to_uppercase(),
                CoinQuote {
                    price,
                    change_24h: m.price_change_percentage_24h,
                    market_cap: m.market_cap,
                    volume_24h: m.total_volume,
                    circulating_supply: m.circulating_supply,
                },
            ))
        })
        .collect();

    if quotes.is_empty() {
        return Err(ProviderError::Rejected("coingecko returned no market data".into()));
    }
    Ok(quotes)
}

fn from_history(body: HistoryResponse) -> Option<CoinQuote> {
    let data = body.market_data?;
    let price = *data.current_price.get("usd")?;
    Some(CoinQuote {
        price,
        change_24h: None,
        market_cap: data.market_cap.get("usd").copied(),
        volume_24h: data.total_volume.get("usd").copied(),
        circulating_supply: None,
    })
}

#[async_trait]
impl CryptoProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn prices(&self, ids: &[String]) -> ProviderResult<CoinQuotes> {
        let url = format!("{}/simple/price", self.base_url);
        let query = [
            ("ids", ids.join(",")),
            ("vs_currencies", "usd".to_string()),
            ("include_24hr_change", "true".to_string()),
            ("include_market_cap", "true".to_string()),
            ("include_24hr_vol", "true".to_string()),
            ("include_circulating_supply", "true".to_string()),
        ];
        let body: BTreeMap<String, SimplePrice> = fetch_json(&self.client, &url, &query).await?;
        from_simple(body)
    }

    async fn market_caps(&self, ids: &[String]) -> ProviderResult<CoinQuotes> {
        let url = format!("{}/coins/markets", self.base_url);
        let query = [
            ("vs_currency", "usd".to_string()),
            ("ids", ids.join(",")),
            ("order", "market_cap_desc".to_string()),
            ("per_page", "100".to_string()),
            ("page", "1".to_string()),
            ("sparkline", "false".to_string()),
        ];
        let body: Vec<MarketEntry> = fetch_json(&self.client, &url, &query).await?;
        from_markets(body)
    }

    async fn history(&self, id: &str, date: NaiveDate) -> ProviderResult<Option<CoinQuote>> {
        let url = format!("{}/coins/{}/history", self.base_url, id);
        let query = [("date", date.format("%d-%m-%Y").to_string())];
        let body: HistoryResponse = fetch_json(&self.client, &url, &query).await?;
        Ok(from_history(body))
    }

    async fn coins(&self) -> ProviderResult<Vec<String>> {
        let url = format!("{}/coins/list", self.base_url);
        let body: Vec<CoinListEntry> = fetch_json(&self.client, &url, &[]).await?;
        Ok(body.into_iter().take(COIN_LIST_LIMIT).map(|c| c.id).collect())
    }
}
