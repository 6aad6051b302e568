//! HTTP surface: public rate endpoints, admin endpoints and middleware.
//!
//! Public routes sit behind the rate limiter. Admin routes do not, so an
//! operator can always inspect and reset a client's counters.

mod error;
mod handlers;
mod middleware;
mod server;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::cache::Cache;
use crate::config::ServerConfig;
use crate::ratelimit::RateLimiter;
use crate::services::{CryptoService, ForexService};

pub use error::{ApiError, ApiResult};
pub use middleware::{client_identity, PROCESS_TIME_HEADER};
pub use server::{serve_listener, HttpServer};

/// Shared handles for every handler.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<Cache>,
    pub limiter: Arc<RateLimiter>,
    pub forex: Arc<ForexService>,
    pub crypto: Arc<CryptoService>,
}

/// Build the application router.
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    let public = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/forex/latest", get(handlers::forex_latest))
        .route("/forex/convert", get(handlers::forex_convert))
        .route("/forex/historical", get(handlers::forex_historical))
        .route("/forex/list", get(handlers::forex_list))
        .route("/crypto/latest", get(handlers::crypto_latest))
        .route("/crypto/historical", get(handlers::crypto_historical))
        .route("/crypto/marketcap", get(handlers::crypto_marketcap))
        .route("/crypto/list", get(handlers::crypto_list))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), middleware::rate_limit));

    let mut app = public;
    if config.admin_enabled {
        app = app.nest("/admin", admin_routes());
    }

    let mut app = app
        .fallback(|| async { ApiError::NotFound("route not found".into()) })
        .layer(axum::middleware::from_fn(middleware::process_time))
        .with_state(state);

    if config.cors_enabled {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/ratelimit/usage", get(handlers::ratelimit_usage))
        .route("/ratelimit/clients/{client}", get(handlers::ratelimit_client))
        .route("/ratelimit/reset", post(handlers::ratelimit_reset))
        .route("/ratelimit/stats", get(handlers::ratelimit_stats))
        .route("/cache/clear", post(handlers::cache_clear))
}
