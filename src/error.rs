//! Error types for the LiteForex service.

use std::time::Duration;

use thiserror::Error;

/// Main error type for LiteForex operations.
#[derive(Error, Debug)]
pub enum LiteforexError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Counter store errors that escaped a degraded path
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Upstream provider errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Caller supplied an unusable request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for LiteForex operations.
pub type Result<T> = std::result::Result<T, LiteforexError>;

/// Failures talking to the counter store.
///
/// These never cross the cache or rate limiter boundary; both components
/// turn them into [`crate::store::Availability::Unavailable`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("stored value is not a counter: {0}")]
    Corrupt(String),

    /// The in-process store was switched off to simulate an outage.
    #[error("store is offline")]
    Offline,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures fetching from an upstream data provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("upstream rejected the request: {0}")]
    Rejected(String),
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
