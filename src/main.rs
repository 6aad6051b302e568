use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use liteforex::cache::Cache;
use liteforex::config::{LiteforexConfig, StoreBackend, StoreConfig};
use liteforex::http::{self, AppState, HttpServer};
use liteforex::providers::{CoinGeckoProvider, CryptoProvider, ExchangeRateHostProvider, ForexProvider};
use liteforex::ratelimit::RateLimiter;
use liteforex::refresh;
use liteforex::services::{CryptoService, ForexService};
use liteforex::store::{CounterStore, MemoryStore, RedisStore};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Currency and crypto rates API.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = LiteforexConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind;
    }

    init_tracing(&config.log_level, cli.log_format);

    info!("Starting LiteForex rates service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(bind_addr = %config.server.bind_addr, store = ?config.store.backend, "Configuration loaded");

    let store = connect_store(&config.store).await;

    let cache = Arc::new(Cache::new(store.clone(), config.cache)?);
    let limiter = Arc::new(RateLimiter::new(store, config.rate_limiting)?);
    info!(limits = ?config.rate_limiting, "Rate limiter initialized");

    let client = config.providers.http_client()?;
    let forex_providers: Vec<Arc<dyn ForexProvider>> = vec![Arc::new(ExchangeRateHostProvider::new(
        client.clone(),
        config.providers.exchangerate_url.clone(),
    ))];
    let crypto_providers: Vec<Arc<dyn CryptoProvider>> = vec![Arc::new(CoinGeckoProvider::new(
        client,
        config.providers.coingecko_url.clone(),
    ))];

    let forex = Arc::new(ForexService::new(cache.clone(), forex_providers));
    let crypto = Arc::new(CryptoService::new(cache.clone(), crypto_providers));
    let refresh_tasks = refresh::spawn(&config.refresh, forex.clone(), crypto.clone());

    let state = AppState {
        cache,
        limiter,
        forex,
        crypto,
    };
    let server = HttpServer::new(config.server.bind_addr, http::router(state, &config.server));

    info!("Starting HTTP server on {}", config.server.bind_addr);

    // Run the server with graceful shutdown on Ctrl+C
    let served = server.serve_with_shutdown(shutdown_signal()).await;
    refresh_tasks.shutdown();
    served?;

    info!("LiteForex rates service stopped");
    Ok(())
}

fn init_tracing(default_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match format {
        LogFormat::Text => builder.with_thread_ids(true).init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Open the configured counter store. Returns `None` when Redis cannot be
/// reached; the cache and rate limiter then run degraded for the process
/// lifetime.
async fn connect_store(config: &StoreConfig) -> Option<Arc<dyn CounterStore>> {
    match config.backend {
        StoreBackend::Memory => {
            warn!("Using in-process counter store; limits are not shared between instances");
            Some(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Redis => {
            match RedisStore::connect(&config.url, config.connect_timeout(), config.op_timeout()).await {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    error!(error = %e, "Counter store unreachable; cache and rate limiting disabled");
                    None
                }
            }
        }
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
