//! Crypto prices keyed by ticker symbol.
//!
//! Requests name tickers (`BTC`); providers speak coin ids (`bitcoin`). The
//! cache stores provider-shaped quotes under the normalized id list and each
//! response is projected back onto the tickers the caller asked for.

use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::keys::{normalize_coin_ids, normalize_currencies};
use crate::cache::Cache;
use crate::models::{CoinQuote, CoinQuotes};
use crate::providers::CryptoProvider;

/// Tickers for latest and market cap requests that name none.
pub const DEFAULT_SYMBOLS: [&str; 5] = ["BTC", "ETH", "SOL", "ADA", "BNB"];

/// Tickers for historical requests that name none.
pub const DEFAULT_HISTORICAL_SYMBOLS: [&str; 3] = ["BTC", "ETH", "SOL"];

const SYMBOL_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("ADA", "cardano"),
    ("BNB", "binancecoin"),
    ("DOT", "polkadot"),
    ("DOGE", "dogecoin"),
    ("AVAX", "avalanche-2"),
    ("MATIC", "polygon"),
    ("LINK", "chainlink"),
    ("UNI", "uniswap"),
    ("LTC", "litecoin"),
    ("BCH", "bitcoin-cash"),
    ("XRP", "ripple"),
    ("XLM", "stellar"),
    ("ATOM", "cosmos"),
    ("ALGO", "algorand"),
    ("VET", "vechain"),
    ("TRX", "tron"),
    ("FIL", "filecoin"),
];

/// Coin ids served when no provider can supply a list.
const FALLBACK_COINS: &[&str] = &[
    "bitcoin", "ethereum", "binancecoin", "cardano", "solana", "polkadot", "dogecoin", "avalanche-2", "polygon",
    "chainlink", "litecoin", "ripple", "usd-coin", "tether", "binance-usd", "shiba-inu", "tron", "dai", "cosmos",
    "uniswap", "ethereum-classic", "monero", "algorand", "stellar", "internet-computer", "aptos", "arbitrum",
    "optimism", "vechain", "filecoin", "aave", "the-graph", "maker", "tezos", "elrond-erd-2", "fantom", "neo",
    "zcash", "dash", "waves", "iota", "kusama", "pancakeswap-token", "gala", "frax", "curve-dao-token",
    "rocket-pool", "mina-protocol", "thorchain", "1inch", "convex-finance", "enjincoin", "chiliz",
    "basic-attention-token",
];

/// Last-resort quotes: (ticker, price, change_24h, market_cap, volume_24h, circulating_supply).
const DEFAULT_QUOTES: &[(&str, f64, f64, f64, f64, f64)] = &[
    ("BTC", 42000.50, 2.5, 820e9, 25e9, 19.5e6),
    ("ETH", 2500.75, -1.2, 300e9, 15e9, 120e6),
    ("SOL", 98.25, 5.8, 45e9, 2e9, 458e6),
    ("ADA", 0.48, -0.5, 17e9, 800e6, 35.5e9),
    ("BNB", 320.50, 1.8, 48e9, 1.2e9, 150e6),
];

/// Provider coin id for a ticker. Unknown tickers are assumed to be ids already.
pub fn symbol_to_id(symbol: &str) -> String {
    let upper = symbol.trim().to_ascii_uppercase();
    SYMBOL_IDS
        .iter()
        .find(|(s, _)| *s == upper)
        .map(|(_, id)| id.to_string())
        .unwrap_or_else(|| symbol.trim().to_ascii_lowercase())
}

/// A request's tickers paired with their provider ids.
struct Request {
    pairs: Vec<(String, String)>,
    ids: Vec<String>,
}

impl Request {
    fn new(symbols: &[String], defaults: &[&str]) -> Self {
        let mut tickers = normalize_currencies(symbols);
        if tickers.is_empty() {
            tickers = defaults.iter().map(|s| s.to_string()).collect();
        }
        let pairs: Vec<(String, String)> = tickers
            .into_iter()
            .map(|t| {
                let id = symbol_to_id(&t);
                (t, id)
            })
            .collect();
        let ids = normalize_coin_ids(&pairs.iter().map(|(_, id)| id.as_str()).collect::<Vec<_>>());
        Self { pairs, ids }
    }

    fn tickers(&self) -> Vec<String> {
        self.pairs.iter().map(|(t, _)| t.clone()).collect()
    }

    /// Re-key provider quotes (upper-cased ids) by requested ticker.
    fn project(&self, quotes: &CoinQuotes) -> CoinQuotes {
        self.pairs
            .iter()
            .filter_map(|(ticker, id)| {
                quotes
                    .get(&id.to_ascii_uppercase())
                    .map(|q| (ticker.clone(), q.clone()))
            })
            .collect()
    }
}

pub struct CryptoService {
    cache: Arc<Cache>,
    providers: Vec<Arc<dyn CryptoProvider>>,
}

impl CryptoService {
    pub fn new(cache: Arc<Cache>, providers: Vec<Arc<dyn CryptoProvider>>) -> Self {
        Self { cache, providers }
    }

    /// Latest quotes per ticker, falling back to built-in quotes.
    pub async fn latest(&self, symbols: &[String]) -> CoinQuotes {
        let request = Request::new(symbols, &DEFAULT_SYMBOLS);

        if let Some(hit) = self.cache.get_crypto_latest(&request.ids).await.flatten() {
            debug!(ids = ?request.ids, "Serving cached crypto prices");
            return request.project(&hit);
        }

        match self.fetch_prices(&request.ids).await {
            Some(quotes) => {
                self.cache.set_crypto_latest(&request.ids, &quotes).await;
                request.project(&quotes)
            }
            None => {
                warn!(ids = ?request.ids, "All crypto providers failed; serving default prices");
                default_quotes(&request.tickers())
            }
        }
    }

    /// Fetch fresh prices and overwrite the cache entry.
    pub async fn refresh_latest(&self, symbols: &[String]) -> bool {
        let request = Request::new(symbols, &DEFAULT_SYMBOLS);
        match self.fetch_prices(&request.ids).await {
            Some(quotes) => {
                self.cache.set_crypto_latest(&request.ids, &quotes).await;
                true
            }
            None => false,
        }
    }

    /// Quotes on `date`. Coins are fetched concurrently; coins without data
    /// are left out.
    pub async fn historical(&self, date: NaiveDate, symbols: &[String]) -> CoinQuotes {
        let request = Request::new(symbols, &DEFAULT_HISTORICAL_SYMBOLS);

        if let Some(hit) = self.cache.get_crypto_historical(date, &request.ids).await.flatten() {
            debug!(date = %date, "Serving cached historical crypto prices");
            return request.project(&hit);
        }

        for provider in &self.providers {
            let fetches = request.ids.iter().map(|id| async move {
                match provider.history(id, date).await {
                    Ok(quote) => quote.map(|q| (id.to_ascii_uppercase(), q)),
                    Err(e) => {
                        warn!(provider = provider.name(), id = %id, date = %date, error = %e, "Historical crypto fetch failed");
                        None
                    }
                }
            });
            let quotes: CoinQuotes = join_all(fetches).await.into_iter().flatten().collect();

            if !quotes.is_empty() {
                self.cache.set_crypto_historical(date, &request.ids, &quotes).await;
                return request.project(&quotes);
            }
        }

        warn!(date = %date, "No historical crypto data; serving default prices");
        default_quotes(&request.tickers())
    }

    /// Market data (price, cap, volume, supply) per ticker.
    pub async fn market_caps(&self, symbols: &[String]) -> CoinQuotes {
        let request = Request::new(symbols, &DEFAULT_SYMBOLS);

        if let Some(hit) = self.cache.get_crypto_marketcap(&request.ids).await.flatten() {
            debug!(ids = ?request.ids, "Serving cached market cap data");
            return request.project(&hit);
        }

        for provider in &self.providers {
            match provider.market_caps(&request.ids).await {
                Ok(quotes) => {
                    self.cache.set_crypto_marketcap(&request.ids, &quotes).await;
                    return request.project(&quotes);
                }
                Err(e) => warn!(provider = provider.name(), error = %e, "Market cap fetch failed"),
            }
        }

        default_quotes(&request.tickers())
    }

    /// Supported coin ids, or a built-in list.
    pub async fn coins(&self) -> Vec<String> {
        for provider in &self.providers {
            match provider.coins().await {
                Ok(list) if !list.is_empty() => return list,
                Ok(_) => {}
                Err(e) => warn!(provider = provider.name(), error = %e, "Coin list fetch failed"),
            }
        }
        FALLBACK_COINS.iter().map(|c| c.to_string()).collect()
    }

    async fn fetch_prices(&self, ids: &[String]) -> Option<CoinQuotes> {
        for provider in &self.providers {
            match provider.prices(ids).await {
                Ok(quotes) => {
                    info!(provider = provider.name(), count = quotes.len(), "Fetched fresh crypto prices");
                    return Some(quotes);
                }
                Err(e) => warn!(provider = provider.name(), error = %e, "Crypto provider failed"),
            }
        }
        None
    }
}

/// Built-in quotes per ticker; unknown tickers get a flat 1.0 price.
fn default_quotes(tickers: &[String]) -> CoinQuotes {
    tickers
        .iter()
        .map(|ticker| {
            let quote = DEFAULT_QUOTES
                .iter()
                .find(|(t, ..)| *t == ticker.as_str())
                .map(|&(_, price, change, cap, volume, supply)| CoinQuote {
                    price,
                    change_24h: Some(change),
                    market_cap: Some(cap),
                    volume_24h: Some(volume),
                    circulating_supply: Some(supply),
                })
                .unwrap_or(CoinQuote {
                    price: 1.0,
                    change_24h: Some(0.0),
                    market_cap: Some(0.0),
                    volume_24h: Some(0.0),
                    circulating_supply: Some(0.0),
                });
            (ticker.clone(), quote)
        })
        .collect()
}
