//! In-process counter store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::pattern::glob_match;
use super::{CounterSlot, CounterStore};
use crate::clock::{Clock, SystemClock};
use crate::error::{StoreError, StoreResult};

/// Expired entries are dropped on every this many writes.
const SWEEP_EVERY: u64 = 64;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    /// Unix second at which the entry stops existing.
    expires_at: Option<u64>,
}

impl Entry {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// A [`CounterStore`] held in process memory.
///
/// Expiry is evaluated against the injected [`Clock`], so tests can move time
/// forward without sleeping. All operations run under one lock, which makes
/// `incr` and `admit` trivially atomic. Rate-limit counters are never read
/// again once their window ends, so writes periodically sweep out expired
/// entries.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
            writes: AtomicU64::new(0),
        }
    }

    /// Simulate the store going away (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries.lock().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries held, expired or not.
    pub fn held(&self) -> usize {
        self.entries.lock().len()
    }

    /// Remaining time to live for `key`, if it exists and has one.
    pub fn ttl(&self, key: &str) -> Option<u64> {
        let now = self.clock.now();
        let entries = self.entries.lock();
        let entry = entries.get(key).filter(|e| e.is_live(now))?;
        entry.expires_at.map(|at| at - now)
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Offline)
        }
    }

    fn expiry(&self, now: u64, ttl: Duration) -> u64 {
        now + ttl.as_secs()
    }

    fn live_count(entries: &HashMap<String, Entry>, key: &str, now: u64) -> StoreResult<u64> {
        match entries.get(key).filter(|e| e.is_live(now)) {
            Some(entry) => entry
                .value
                .parse()
                .map_err(|_| StoreError::Corrupt(key.to_string())),
            None => Ok(0),
        }
    }

    fn record_write(&self, entries: &mut HashMap<String, Entry>, now: u64) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_EVERY == 0 {
            entries.retain(|_, e| e.is_live(now));
        }
    }

    fn bump(&self, entries: &mut HashMap<String, Entry>, key: &str, ttl: Duration, now: u64) -> StoreResult<u64> {
        let next = Self::live_count(entries, key, now)? + 1;
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at: Some(self.expiry(now, ttl)),
            },
        );
        Ok(next)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.check_available()
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.check_available()?;
        let now = self.clock.now();
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| self.expiry(now, ttl)),
        };
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), entry);
        self.record_write(&mut entries, now);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let removed = keys
            .iter()
            .filter_map(|k| entries.remove(k))
            .filter(|e| e.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.check_available()?;
        let now = self.clock.now();
        Ok(self
            .entries
            .lock()
            .get(key)
            .is_some_and(|e| e.is_live(now)))
    }

    async fn incr(&self, key: &str, ttl: Duration) -> StoreResult<u64> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let count = self.bump(&mut entries, key, ttl, now)?;
        self.record_write(&mut entries, now);
        Ok(count)
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        entries.retain(|_, e| e.is_live(now));
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn admit(&self, slots: &[CounterSlot]) -> StoreResult<Option<usize>> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        for (index, slot) in slots.iter().enumerate() {
            if Self::live_count(&entries, &slot.key, now)? >= slot.limit {
                return Ok(Some(index));
            }
        }

        for slot in slots {
            self.bump(&mut entries, &slot.key, slot.ttl, now)?;
        }
        self.record_write(&mut entries, now);
        Ok(None)
    }
}
