//! Core rate limiter implementation.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::key::CounterKey;
use super::window::WindowKind;
use crate::clock::{Clock, SystemClock};
use crate::error::{LiteforexError, Result, StoreError};
use crate::store::{Availability, CounterSlot, CounterStore};

/// Default per-minute quota.
const DEFAULT_PER_MINUTE: u64 = 60;
/// Default per-hour quota.
const DEFAULT_PER_HOUR: u64 = 1000;
/// Default per-day quota.
const DEFAULT_PER_DAY: u64 = 10000;

/// Request quotas, one per window kind, shared by every client and endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimits {
    #[serde(default = "default_per_minute")]
    pub per_minute: u64,
    #[serde(default = "default_per_hour")]
    pub per_hour: u64,
    #[serde(default = "default_per_day")]
    pub per_day: u64,
}

fn default_per_minute() -> u64 {
    DEFAULT_PER_MINUTE
}

fn default_per_hour() -> u64 {
    DEFAULT_PER_HOUR
}

fn default_per_day() -> u64 {
    DEFAULT_PER_DAY
}

impl Default for WindowLimits {
    fn default() -> Self {
        Self {
            per_minute: DEFAULT_PER_MINUTE,
            per_hour: DEFAULT_PER_HOUR,
            per_day: DEFAULT_PER_DAY,
        }
    }
}

impl WindowLimits {
    /// The configured ceiling for `window`.
    pub fn limit(&self, window: WindowKind) -> u64 {
        match window {
            WindowKind::Minute => self.per_minute,
            WindowKind::Hour => self.per_hour,
            WindowKind::Day => self.per_day,
        }
    }

    /// Reject quotas that could never admit a request.
    pub fn validate(&self) -> Result<()> {
        for window in WindowKind::ALL {
            if self.limit(window) == 0 {
                return Err(LiteforexError::Config(format!(
                    "rate limit for the {} window must be greater than zero",
                    window
                )));
            }
        }
        Ok(())
    }
}

/// Decision for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// All three windows had headroom; every counter was incremented.
    Allowed,
    /// The named window is full. No counter was touched.
    Denied {
        window: WindowKind,
        reset_time: u64,
        /// Seconds until `reset_time`.
        retry_after: u64,
    },
    /// The store could not be consulted, so the request is let through.
    FailOpen,
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Admission::Denied { .. })
    }
}

/// Snapshot of one window's counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowUsage {
    pub current: u64,
    pub limit: u64,
    pub remaining: u64,
    /// Epoch second at which this window's counter expires.
    pub reset_time: u64,
}

pub type UsageInfo = BTreeMap<WindowKind, WindowUsage>;

/// Point-in-time totals over every active counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub total_requests: u64,
    pub active_clients: usize,
    pub rate_limit_keys: usize,
    pub timestamp: String,
}

/// Active counter totals for one client, by endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientUsage {
    pub client: String,
    pub endpoints: BTreeMap<String, u64>,
    pub total_requests: u64,
}

/// Multi-window fixed-counter rate limiter backed by a shared [`CounterStore`].
///
/// Holds no in-process state beyond configuration; all coordination between
/// concurrent requests happens inside the store. When the store is missing
/// or failing, admission fails open.
pub struct RateLimiter {
    store: Option<Arc<dyn CounterStore>>,
    limits: WindowLimits,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter. `None` for the store means permanently degraded.
    pub fn new(store: Option<Arc<dyn CounterStore>>, limits: WindowLimits) -> Result<Self> {
        Self::with_clock(store, limits, Arc::new(SystemClock))
    }

    /// Create a rate limiter reading time from `clock`.
    pub fn with_clock(
        store: Option<Arc<dyn CounterStore>>,
        limits: WindowLimits,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        limits.validate()?;
        if store.is_none() {
            warn!("Rate limiter has no counter store; every request will be admitted");
        }
        Ok(Self { store, limits, clock })
    }

    pub fn limits(&self) -> WindowLimits {
        self.limits
    }

    /// Decide whether a request from `client` to `endpoint` may proceed.
    pub async fn check(&self, client: &str, endpoint: &str) -> Admission {
        let Some(store) = &self.store else {
            return Admission::FailOpen;
        };

        let now = self.clock.now();
        let slots: Vec<CounterSlot> = WindowKind::ALL
            .iter()
            .map(|&window| CounterSlot {
                key: CounterKey::new(client, endpoint, window, now).to_store_key(),
                limit: self.limits.limit(window),
                ttl: window.duration(),
            })
            .collect();

        match store.admit(&slots).await {
            Ok(None) => {
                trace!(client = %client, endpoint = %endpoint, "Request admitted");
                Admission::Allowed
            }
            Ok(Some(index)) => {
                let window = WindowKind::ALL[index];
                debug!(
                    client = %client,
                    endpoint = %endpoint,
                    window = %window,
                    limit = self.limits.limit(window),
                    "Rate limit exceeded"
                );
                let reset_time = window.reset_time(now);
                Admission::Denied {
                    window,
                    reset_time,
                    retry_after: reset_time.saturating_sub(now),
                }
            }
            Err(e) => {
                warn!(client = %client, endpoint = %endpoint, error = %e, "Rate limiter failing open");
                Admission::FailOpen
            }
        }
    }

    /// `true` unless some window's quota is already spent.
    pub async fn is_allowed(&self, client: &str, endpoint: &str) -> bool {
        self.check(client, endpoint).await.is_allowed()
    }

    /// Read the three current counters without touching them.
    pub async fn get_usage_info(&self, client: &str, endpoint: &str) -> Availability<UsageInfo> {
        let Some(store) = &self.store else {
            return Availability::Unavailable;
        };

        let now = self.clock.now();
        let mut usage = UsageInfo::new();
        for window in WindowKind::ALL {
            let key = CounterKey::new(client, endpoint, window, now).to_store_key();
            let current = match read_count(store.as_ref(), &key).await {
                Ok(count) => count.unwrap_or(0),
                Err(e) => {
                    warn!(client = %client, endpoint = %endpoint, error = %e, "Failed to read usage");
                    return Availability::Unavailable;
                }
            };
            let limit = self.limits.limit(window);
            usage.insert(
                window,
                WindowUsage {
                    current,
                    limit,
                    remaining: limit.saturating_sub(current),
                    reset_time: window.reset_time(now),
                },
            );
        }
        Availability::Available(usage)
    }

    /// Delete every counter of `client`, or only those for `endpoint`.
    /// An endpoint of `*` means every endpoint.
    ///
    /// Yields `true` if anything was deleted.
    pub async fn reset_limits(&self, client: &str, endpoint: Option<&str>) -> Availability<bool> {
        let Some(store) = &self.store else {
            return Availability::Unavailable;
        };
        let endpoint = endpoint.filter(|e| *e != "*");

        let pattern = CounterKey::client_pattern(client, endpoint);
        let result = async {
            let keys = store.keys(&pattern).await?;
            store.delete(&keys).await
        }
        .await;

        match result {
            Ok(removed) => {
                if removed > 0 {
                    info!(
                        client = %client,
                        endpoint = endpoint.unwrap_or("*"),
                        removed,
                        "Reset rate limits"
                    );
                }
                Availability::Available(removed > 0)
            }
            Err(e) => {
                warn!(client = %client, error = %e, "Failed to reset rate limits");
                Availability::Unavailable
            }
        }
    }

    /// Aggregate every active counter. Counters may expire mid-scan, so the
    /// figures are only a best-effort snapshot.
    pub async fn get_global_stats(&self) -> Availability<GlobalStats> {
        let Some(store) = &self.store else {
            return Availability::Unavailable;
        };

        let result = async {
            let keys = store.keys(&CounterKey::all_pattern()).await?;
            let mut total_requests = 0;
            let mut clients = HashSet::new();
            for key in &keys {
                if let Some(count) = read_count(store.as_ref(), key).await? {
                    total_requests += count;
                    if let Some(parsed) = CounterKey::parse(key) {
                        clients.insert(parsed.client);
                    }
                }
            }
            Ok::<_, StoreError>(GlobalStats {
                total_requests,
                active_clients: clients.len(),
                rate_limit_keys: keys.len(),
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            })
        }
        .await;

        match result {
            Ok(stats) => Availability::Available(stats),
            Err(e) => {
                warn!(error = %e, "Failed to collect global rate limit stats");
                Availability::Unavailable
            }
        }
    }

    /// Per-endpoint request totals across the active counters of `client`.
    ///
    /// Totals add every live window together, so one request shows up once
    /// per window kind.
    pub async fn get_client_usage(&self, client: &str) -> Availability<ClientUsage> {
        let Some(store) = &self.store else {
            return Availability::Unavailable;
        };

        let result = async {
            let keys = store.keys(&CounterKey::client_pattern(client, None)).await?;
            let mut endpoints = BTreeMap::new();
            for key in &keys {
                let Some(parsed) = CounterKey::parse(key) else {
                    continue;
                };
                if let Some(count) = read_count(store.as_ref(), key).await? {
                    *endpoints.entry(parsed.endpoint).or_insert(0) += count;
                }
            }
            Ok::<_, StoreError>(endpoints)
        }
        .await;

        match result {
            Ok(endpoints) => Availability::Available(ClientUsage {
                client: client.to_string(),
                total_requests: endpoints.values().sum(),
                endpoints,
            }),
            Err(e) => {
                warn!(client = %client, error = %e, "Failed to collect client usage");
                Availability::Unavailable
            }
        }
    }
}

async fn read_count(store: &dyn CounterStore, key: &str) -> std::result::Result<Option<u64>, StoreError> {
    match store.get(key).await? {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| StoreError::Corrupt(key.to_string())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    /// An arbitrary instant 5 seconds into a minute window.
    const T0: u64 = 1_700_000_040 + 5;

    fn limiter_with(limits: WindowLimits) -> (Arc<ManualClock>, Arc<MemoryStore>, RateLimiter) {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let limiter = RateLimiter::with_clock(Some(store.clone()), limits, clock.clone()).unwrap();
        (clock, store, limiter)
    }

    fn limits(per_minute: u64, per_hour: u64, per_day: u64) -> WindowLimits {
        WindowLimits {
            per_minute,
            per_hour,
            per_day,
        }
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let result = RateLimiter::new(None, limits(0, 10, 10));
        assert!(matches!(result, Err(LiteforexError::Config(_))));
    }

    #[tokio::test]
    async fn test_minute_limit_sequence() {
        let (_clock, _store, limiter) = limiter_with(limits(3, 1000, 10000));

        let mut results = Vec::new();
        for _ in 0..5 {
            results.push(limiter.is_allowed("1.2.3.4", "/forex/latest").await);
        }
        assert_eq!(results, vec![true, true, true, false, false]);
    }

    #[tokio::test]
    async fn test_other_endpoint_is_unaffected() {
        let (_clock, _store, limiter) = limiter_with(limits(2, 1000, 10000));

        assert!(limiter.is_allowed("c", "/forex/latest").await);
        assert!(limiter.is_allowed("c", "/forex/latest").await);
        assert!(!limiter.is_allowed("c", "/forex/latest").await);

        assert!(limiter.is_allowed("c", "/crypto/latest").await);
        assert!(limiter.is_allowed("other", "/forex/latest").await);
    }

    #[tokio::test]
    async fn test_new_minute_window_resets_minute_counter() {
        let (clock, _store, limiter) = limiter_with(limits(1, 1000, 10000));

        assert!(limiter.is_allowed("c", "/e").await);
        assert!(!limiter.is_allowed("c", "/e").await);

        // 55 seconds later lands exactly on the next minute boundary.
        clock.advance(55);
        assert!(limiter.is_allowed("c", "/e").await);

        let usage = limiter.get_usage_info("c", "/e").await.ok().unwrap();
        assert_eq!(usage[&WindowKind::Minute].current, 1);
        assert_eq!(usage[&WindowKind::Hour].current, 2);
    }

    #[tokio::test]
    async fn test_denial_reports_window_and_reset() {
        let (_clock, _store, limiter) = limiter_with(limits(10, 1, 10000));

        assert_eq!(limiter.check("c", "/e").await, Admission::Allowed);
        let decision = limiter.check("c", "/e").await;
        assert_eq!(
            decision,
            Admission::Denied {
                window: WindowKind::Hour,
                reset_time: WindowKind::Hour.reset_time(T0),
                retry_after: WindowKind::Hour.reset_time(T0) - T0,
            }
        );
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn test_daily_denial_does_not_increment_any_window() {
        let (_clock, _store, limiter) = limiter_with(limits(10, 100, 2));

        assert!(limiter.is_allowed("c", "/e").await);
        assert!(limiter.is_allowed("c", "/e").await);

        let before = limiter.get_usage_info("c", "/e").await.ok().unwrap();
        assert!(!limiter.is_allowed("c", "/e").await);
        let after = limiter.get_usage_info("c", "/e").await.ok().unwrap();

        assert_eq!(before, after);
        for window in WindowKind::ALL {
            assert_eq!(after[&window].current, 2);
        }
    }

    #[tokio::test]
    async fn test_usage_info_shape_and_idempotence() {
        let (_clock, _store, limiter) = limiter_with(limits(3, 1000, 10000));
        limiter.is_allowed("c", "/e").await;

        let first = limiter.get_usage_info("c", "/e").await.ok().unwrap();
        let second = limiter.get_usage_info("c", "/e").await.ok().unwrap();
        assert_eq!(first, second);

        let minute = first[&WindowKind::Minute];
        assert_eq!(minute.current, 1);
        assert_eq!(minute.limit, 3);
        assert_eq!(minute.remaining, 2);
        assert_eq!(minute.reset_time, WindowKind::Minute.window_start(T0) + 60);
    }

    #[tokio::test]
    async fn test_counters_carry_window_ttl() {
        let (_clock, store, limiter) = limiter_with(WindowLimits::default());
        limiter.is_allowed("c", "/e").await;

        for window in WindowKind::ALL {
            let key = CounterKey::new("c", "/e", window, T0).to_store_key();
            assert_eq!(store.ttl(&key), Some(window.size_secs()));
        }
    }

    #[tokio::test]
    async fn test_fail_open_when_store_unreachable() {
        let (_clock, store, limiter) = limiter_with(limits(1, 1, 1));
        store.set_available(false);

        for _ in 0..5 {
            assert_eq!(limiter.check("c", "/e").await, Admission::FailOpen);
        }
        assert_eq!(limiter.get_usage_info("c", "/e").await, Availability::Unavailable);
        assert_eq!(limiter.reset_limits("c", None).await, Availability::Unavailable);
        assert_eq!(limiter.get_global_stats().await, Availability::Unavailable);
    }

    #[tokio::test]
    async fn test_fail_open_without_store() {
        let limiter = RateLimiter::new(None, limits(1, 1, 1)).unwrap();
        assert!(limiter.is_allowed("c", "/e").await);
        assert!(limiter.is_allowed("c", "/e").await);
    }

    #[tokio::test]
    async fn test_reset_limits_scoped_and_global() {
        let (_clock, _store, limiter) = limiter_with(limits(1, 1000, 10000));
        limiter.is_allowed("c", "/a").await;
        limiter.is_allowed("c", "/b").await;
        limiter.is_allowed("d", "/a").await;

        assert_eq!(limiter.reset_limits("c", Some("/a")).await, Availability::Available(true));
        assert!(limiter.is_allowed("c", "/a").await);
        assert!(!limiter.is_allowed("c", "/b").await);

        assert_eq!(limiter.reset_limits("c", None).await, Availability::Available(true));
        assert_eq!(limiter.reset_limits("c", None).await, Availability::Available(false));
        assert!(limiter.is_allowed("c", "/b").await);
        assert!(!limiter.is_allowed("d", "/a").await);
    }

    #[tokio::test]
    async fn test_reset_limits_wildcard_endpoint() {
        let (_clock, store, limiter) = limiter_with(limits(1, 1000, 10000));
        limiter.is_allowed("c", "/a").await;
        limiter.is_allowed("c", "/b").await;
        limiter.is_allowed("d", "/a").await;

        assert_eq!(limiter.reset_limits("c", Some("*")).await, Availability::Available(true));
        assert!(limiter.is_allowed("c", "/a").await);
        assert!(limiter.is_allowed("c", "/b").await);
        assert!(!limiter.is_allowed("d", "/a").await);
        assert_eq!(store.len(), 9);
    }

    #[tokio::test]
    async fn test_global_stats() {
        let (_clock, _store, limiter) = limiter_with(WindowLimits::default());
        limiter.is_allowed("1.1.1.1", "/a").await;
        limiter.is_allowed("1.1.1.1", "/a").await;
        limiter.is_allowed("2001:db8::1", "/b").await;

        let stats = limiter.get_global_stats().await.ok().unwrap();
        assert_eq!(stats.rate_limit_keys, 6);
        assert_eq!(stats.active_clients, 2);
        // Three windows per admitted request.
        assert_eq!(stats.total_requests, 9);
        assert!(!stats.timestamp.is_empty());
    }

    #[tokio::test]
    async fn test_client_usage_groups_by_endpoint() {
        let (_clock, _store, limiter) = limiter_with(WindowLimits::default());
        limiter.is_allowed("c", "/a").await;
        limiter.is_allowed("c", "/a").await;
        limiter.is_allowed("c", "/b").await;
        limiter.is_allowed("other", "/a").await;

        let usage = limiter.get_client_usage("c").await.ok().unwrap();
        assert_eq!(usage.endpoints["/a"], 6);
        assert_eq!(usage.endpoints["/b"], 3);
        assert_eq!(usage.total_requests, 9);
    }

    #[tokio::test]
    async fn test_concurrent_admissions_respect_limit() {
        let (_clock, _store, limiter) = limiter_with(limits(25, 1000, 10000));
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.is_allowed("c", "/e").await })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 25);
    }
}
