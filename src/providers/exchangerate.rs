//! exchangerate.host forex provider.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use super::{fetch_json, ForexProvider};
use crate::error::{ProviderError, ProviderResult};
use crate::models::{ForexRates, RateTable};

#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[serde(default)]
    success: Option<bool>,
    base: Option<String>,
    date: Option<String>,
    #[serde(default)]
    rates: RateTable,
}

#[derive(Debug, Deserialize)]
struct SymbolsResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    symbols: BTreeMap<String, serde_json::Value>,
}

pub struct ExchangeRateHostProvider {
    client: reqwest::Client,
    base_url: String,
}

impl ExchangeRateHostProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn rates(&self, path: &str, base: &str, symbols: &[String], fallback_date: String) -> ProviderResult<ForexRates> {
        let url = format!("{}/{}", self.base_url, path);
        let mut query = vec![("base", base.to_string())];
        if !symbols.is_empty() {
            query.push(("symbols", symbols.join(",")));
        }

        let response: RatesResponse = fetch_json(&self.client, &url, &query).await?;
        into_rates(response, base, fallback_date)
    }
}

fn into_rates(response: RatesResponse, base: &str, fallback_date: String) -> ProviderResult<ForexRates> {
    if response.success == Some(false) {
        return Err(ProviderError::Rejected("exchangerate.host reported failure".into()));
    }
    if response.rates.is_empty() {
        return Err(ProviderError::Rejected("exchangerate.host returned no rates".into()));
    }
    Ok(ForexRates {
        base: response.base.unwrap_or_else(|| base.to_string()),
        date: response.date.unwrap_or(fallback_date),
        rates: response.rates,
    })
}

#[async_trait]
impl ForexProvider for ExchangeRateHostProvider {
    fn name(&self) -> &str {
        "exchangerate.host"
    }

    async fn latest(&self, base: &str, symbols: &[String]) -> ProviderResult<ForexRates> {
        let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        self.rates("latest", base, symbols, today).await
    }

    async fn historical(&self, date: NaiveDate, base: &str, symbols: &[String]) -> ProviderResult<ForexRates> {
        let day = date.format("%Y-%m-%d").to_string();
        let mut rates = self.rates(&day, base, symbols, day.clone()).await?;
        rates.date = day;
        Ok(rates)
    }

    async fn currencies(&self) -> ProviderResult<Vec<String>> {
        let url = format!("{}/symbols", self.base_url);
        let response: SymbolsResponse = fetch_json(&self.client, &url, &[]).await?;
        if response.success == Some(false) || response.symbols.is_empty() {
            return Err(ProviderError::Rejected("exchangerate.host returned no symbols".into()));
        }
        Ok(response.symbols.into_keys().collect())
    }
}
