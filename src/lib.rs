//! LiteForex - Currency and Crypto Rates API
//!
//! This crate serves forex and crypto prices fetched from upstream providers.
//! Responses are cached in a shared key-value store with per-category expiry,
//! and every client is held to per-minute, per-hour and per-day quotas counted
//! in the same store. Both layers keep serving when the store is unreachable:
//! the cache passes through and the rate limiter admits everything.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod providers;
pub mod ratelimit;
pub mod refresh;
pub mod services;
pub mod store;
