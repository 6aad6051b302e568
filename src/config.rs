//! Configuration management for LiteForex.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! `LITEFOREX__`-prefixed environment variables (`LITEFOREX__STORE__URL`).

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheTtls;
use crate::error::{LiteforexError, Result};
use crate::providers::ProviderConfig;
use crate::ratelimit::WindowLimits;
use crate::refresh::RefreshConfig;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "LITEFOREX";

/// Main configuration for the LiteForex service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiteforexConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Counter store connection
    #[serde(default)]
    pub store: StoreConfig,

    /// Per-window request quotas
    #[serde(default)]
    pub rate_limiting: WindowLimits,

    /// Cache TTLs per category
    #[serde(default)]
    pub cache: CacheTtls,

    /// Upstream data providers
    #[serde(default)]
    pub providers: ProviderConfig,

    /// Background cache warming
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Default log filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Allow any origin
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Mount the `/admin` routes
    #[serde(default = "default_true")]
    pub admin_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors_enabled: true,
            admin_enabled: true,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_true() -> bool {
    true
}

/// Which counter store backs the cache and the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    /// Process-local; counters are not shared between instances.
    Memory,
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection URL
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Budget for establishing the initial connection
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Upper bound on any single store call
    #[serde(default = "default_op_timeout")]
    pub op_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: default_store_url(),
            connect_timeout_ms: default_connect_timeout(),
            op_timeout_ms: default_op_timeout(),
        }
    }
}

impl StoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

fn default_store_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_connect_timeout() -> u64 {
    2000
}

fn default_op_timeout() -> u64 {
    500
}

impl LiteforexConfig {
    /// Parse configuration from a YAML document.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: LiteforexConfig =
            serde_yaml::from_str(contents).map_err(|e| LiteforexError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Layer defaults, an optional YAML file and environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Yaml));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: LiteforexConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| LiteforexError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.validate()?;
        self.cache.validate()?;

        if self.store.op_timeout_ms == 0 || self.store.connect_timeout_ms == 0 {
            return Err(LiteforexError::Config("store timeouts must be greater than zero".into()));
        }
        if self.store.backend == StoreBackend::Redis && self.store.url.trim().is_empty() {
            return Err(LiteforexError::Config("store.url is required for the redis backend".into()));
        }
        if self.providers.request_timeout_secs == 0 {
            return Err(LiteforexError::Config("providers.request_timeout_secs must be greater than zero".into()));
        }
        self.refresh.validate()?;
        Ok(())
    }
}
