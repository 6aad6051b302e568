//! Background cache warming.
//!
//! One interval task per data family re-fetches the configured lists so that
//! common requests are served from cache. The first tick fires immediately.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::error::{LiteforexError, Result};
use crate::services::{CryptoService, ForexService};

/// Cache warming configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_forex_interval")]
    pub forex_interval_secs: u64,

    #[serde(default = "default_crypto_interval")]
    pub crypto_interval_secs: u64,

    /// Base currencies refreshed each forex tick
    #[serde(default = "default_forex_bases")]
    pub forex_bases: Vec<String>,

    /// Target currencies requested for every base
    #[serde(default = "default_forex_symbols")]
    pub forex_symbols: Vec<String>,

    /// Tickers refreshed each crypto tick
    #[serde(default = "default_crypto_symbols")]
    pub crypto_symbols: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_forex_interval() -> u64 {
    86400
}

fn default_crypto_interval() -> u64 {
    300
}

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn default_forex_bases() -> Vec<String> {
    strings(&["USD", "EUR", "GBP", "JPY"])
}

fn default_forex_symbols() -> Vec<String> {
    strings(&["EUR", "GBP", "JPY", "IDR", "SGD", "MYR", "THB"])
}

fn default_crypto_symbols() -> Vec<String> {
    strings(&["BTC", "ETH", "SOL", "ADA", "BNB", "DOT", "DOGE", "AVAX", "MATIC", "LINK"])
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            forex_interval_secs: default_forex_interval(),
            crypto_interval_secs: default_crypto_interval(),
            forex_bases: default_forex_bases(),
            forex_symbols: default_forex_symbols(),
            crypto_symbols: default_crypto_symbols(),
        }
    }
}

impl RefreshConfig {
    pub fn validate(&self) -> Result<()> {
        if self.enabled && (self.forex_interval_secs == 0 || self.crypto_interval_secs == 0) {
            return Err(LiteforexError::Config("refresh intervals must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Handles to the running warmers. Dropping this does not stop them; call
/// [`RefreshTasks::shutdown`].
#[derive(Debug, Default)]
pub struct RefreshTasks {
    handles: Vec<JoinHandle<()>>,
}

impl RefreshTasks {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Abort every warmer.
    pub fn shutdown(self) {
        for handle in &self.handles {
            handle.abort();
        }
        info!(tasks = self.handles.len(), "Stopped cache refresh tasks");
    }
}

/// Start the warmers. Returns no tasks when refresh is disabled.
pub fn spawn(config: &RefreshConfig, forex: Arc<ForexService>, crypto: Arc<CryptoService>) -> RefreshTasks {
    if !config.enabled {
        info!("Cache refresh disabled");
        return RefreshTasks::default();
    }

    let forex_task = {
        let bases = config.forex_bases.clone();
        let symbols = config.forex_symbols.clone();
        let period = Duration::from_secs(config.forex_interval_secs);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                refresh_forex(&forex, &bases, &symbols).await;
            }
        })
    };

    let crypto_task = {
        let symbols = config.crypto_symbols.clone();
        let period = Duration::from_secs(config.crypto_interval_secs);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                refresh_crypto(&crypto, &symbols).await;
            }
        })
    };

    info!(
        forex_interval_secs = config.forex_interval_secs,
        crypto_interval_secs = config.crypto_interval_secs,
        "Cache refresh tasks started"
    );
    RefreshTasks {
        handles: vec![forex_task, crypto_task],
    }
}

/// One forex pass. Returns how many bases were refreshed.
pub async fn refresh_forex(forex: &ForexService, bases: &[String], symbols: &[String]) -> usize {
    let mut refreshed = 0;
    for base in bases {
        if forex.refresh_latest(base, symbols).await {
            refreshed += 1;
        } else {
            warn!(base = %base, "Forex refresh failed");
        }
    }
    info!(refreshed, total = bases.len(), "Forex cache refreshed");
    refreshed
}

/// One crypto pass.
pub async fn refresh_crypto(crypto: &CryptoService, symbols: &[String]) -> bool {
    let ok = crypto.refresh_latest(symbols).await;
    if ok {
        info!(coins = symbols.len(), "Crypto cache refreshed");
    } else {
        warn!("Crypto refresh failed");
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, CacheTtls};
    use crate::providers::testing::{StaticCrypto, StaticForex};
    use crate::store::{CounterStore, MemoryStore};

    fn services() -> (Arc<ForexService>, Arc<CryptoService>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(Cache::new(Some(store.clone() as Arc<dyn CounterStore>), CacheTtls::default()).unwrap());
        let forex = Arc::new(ForexService::new(cache.clone(), vec![Arc::new(StaticForex::failing_on(&["JPY"]))]));
        let crypto = Arc::new(CryptoService::new(cache, vec![Arc::new(StaticCrypto)]));
        (forex, crypto, store)
    }

    #[tokio::test]
    async fn test_refresh_forex_counts_successes() {
        let (forex, _crypto, store) = services();
        let config = RefreshConfig::default();

        let refreshed = refresh_forex(&forex, &config.forex_bases, &config.forex_symbols).await;
        assert_eq!(refreshed, 3);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_refresh_crypto_warms_cache() {
        let (_forex, crypto, store) = services();
        assert!(refresh_crypto(&crypto, &RefreshConfig::default().crypto_symbols).await);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_spawn_disabled() {
        let (forex, crypto, _store) = services();
        let config = RefreshConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(spawn(&config, forex, crypto).is_empty());
    }

    #[tokio::test]
    async fn test_spawn_and_shutdown() {
        let (forex, crypto, _store) = services();
        let tasks = spawn(&RefreshConfig::default(), forex, crypto);
        assert_eq!(tasks.len(), 2);
        tasks.shutdown();
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = RefreshConfig {
            crypto_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
