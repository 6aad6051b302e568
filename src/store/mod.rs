//! Shared key-value store with per-key expiry.
//!
//! The cache layer and the rate limiter both sit on a [`CounterStore`]. In
//! production that is Redis; [`MemoryStore`] provides the same semantics
//! in-process for development and tests.

mod memory;
mod pattern;
mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;

pub use self::memory::MemoryStore;
pub use self::pattern::{escape_glob, glob_match};
pub use self::redis::RedisStore;

/// One counter taking part in an all-or-nothing admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSlot {
    pub key: String,
    pub limit: u64,
    pub ttl: Duration,
}

/// Operations consumed from the counter store.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write `value`, applying `ttl` atomically with the write when given.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// Delete every listed key, returning how many existed.
    async fn delete(&self, keys: &[String]) -> StoreResult<u64>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Increment `key` and (re)apply `ttl` as one atomic unit.
    async fn incr(&self, key: &str, ttl: Duration) -> StoreResult<u64>;

    /// Keys matching a glob pattern with `KEYS` semantics.
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Atomically check every slot against its limit and, only if all are
    /// below it, increment all of them and refresh their expiry.
    ///
    /// Returns `None` when admitted, or the index of the first slot whose
    /// count had already reached its limit. A blocked call mutates nothing.
    async fn admit(&self, slots: &[CounterSlot]) -> StoreResult<Option<usize>>;
}

/// Outcome of a call that went through a degraded-mode boundary.
///
/// `Unavailable` means the store could not be reached (or was never
/// configured) and the caller should take its fallback path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability<T> {
    Available(T),
    Unavailable,
}

impl<T> Availability<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available(_))
    }

    pub fn unwrap_or(self, default: T) -> T {
        match self {
            Availability::Available(v) => v,
            Availability::Unavailable => default,
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Availability::Available(v) => Some(v),
            Availability::Unavailable => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Availability<U> {
        match self {
            Availability::Available(v) => Availability::Available(f(v)),
            Availability::Unavailable => Availability::Unavailable,
        }
    }
}

impl<T> Availability<Option<T>> {
    /// Collapse a lookup so that an unreachable store reads as a miss.
    pub fn flatten(self) -> Option<T> {
        self.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_helpers() {
        let hit: Availability<Option<u32>> = Availability::Available(Some(3));
        assert!(hit.is_available());
        assert_eq!(hit.clone().flatten(), Some(3));
        assert_eq!(hit.map(|v| v.is_some()), Availability::Available(true));

        let down: Availability<Option<u32>> = Availability::Unavailable;
        assert!(!down.is_available());
        assert_eq!(down.flatten(), None);
        assert!(Availability::<bool>::Unavailable.unwrap_or(true));
    }
}
