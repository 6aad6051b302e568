//! Data categories and their time-to-live.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LiteforexError, Result};

const DAY: u64 = 24 * 3600;

/// A kind of provider response kept in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheCategory {
    ForexLatest,
    ForexHistorical,
    CryptoLatest,
    CryptoHistorical,
    CryptoMarketCap,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 5] = [
        CacheCategory::ForexLatest,
        CacheCategory::ForexHistorical,
        CacheCategory::CryptoLatest,
        CacheCategory::CryptoHistorical,
        CacheCategory::CryptoMarketCap,
    ];

    /// Key prefix, also the category's public name.
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheCategory::ForexLatest => "forex:latest",
            CacheCategory::ForexHistorical => "forex:historical",
            CacheCategory::CryptoLatest => "crypto:latest",
            CacheCategory::CryptoHistorical => "crypto:historical",
            CacheCategory::CryptoMarketCap => "crypto:marketcap",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.prefix() == prefix)
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// TTL in seconds per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTtls {
    #[serde(default = "default_forex_latest_ttl")]
    pub forex_latest_ttl: u64,
    #[serde(default = "default_forex_historical_ttl")]
    pub forex_historical_ttl: u64,
    #[serde(default = "default_crypto_latest_ttl")]
    pub crypto_latest_ttl: u64,
    #[serde(default = "default_crypto_historical_ttl")]
    pub crypto_historical_ttl: u64,
    #[serde(default = "default_crypto_marketcap_ttl")]
    pub crypto_marketcap_ttl: u64,
}

fn default_forex_latest_ttl() -> u64 {
    DAY
}

fn default_forex_historical_ttl() -> u64 {
    7 * DAY
}

fn default_crypto_latest_ttl() -> u64 {
    300
}

fn default_crypto_historical_ttl() -> u64 {
    30 * DAY
}

fn default_crypto_marketcap_ttl() -> u64 {
    300
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            forex_latest_ttl: default_forex_latest_ttl(),
            forex_historical_ttl: default_forex_historical_ttl(),
            crypto_latest_ttl: default_crypto_latest_ttl(),
            crypto_historical_ttl: default_crypto_historical_ttl(),
            crypto_marketcap_ttl: default_crypto_marketcap_ttl(),
        }
    }
}

impl CacheTtls {
    pub fn ttl(&self, category: CacheCategory) -> Duration {
        let secs = match category {
            CacheCategory::ForexLatest => self.forex_latest_ttl,
            CacheCategory::ForexHistorical => self.forex_historical_ttl,
            CacheCategory::CryptoLatest => self.crypto_latest_ttl,
            CacheCategory::CryptoHistorical => self.crypto_historical_ttl,
            CacheCategory::CryptoMarketCap => self.crypto_marketcap_ttl,
        };
        Duration::from_secs(secs)
    }

    /// Every category must expire; a zero TTL is a configuration mistake.
    pub fn validate(&self) -> Result<()> {
        for category in CacheCategory::ALL {
            if self.ttl(category).is_zero() {
                return Err(LiteforexError::Config(format!(
                    "cache TTL for {} must be greater than zero",
                    category
                )));
            }
        }
        Ok(())
    }
}
