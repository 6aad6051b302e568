//! Redis-backed counter store.

use std::future::Future;
use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client, RedisResult, Script};
use async_trait::async_trait;
use tracing::{debug, info};

use super::{CounterSlot, CounterStore};
use crate::error::{StoreError, StoreResult};

/// Increment a counter and re-apply its expiry in one server-side step.
const INCR_EXPIRE_SCRIPT: &str = r#"
local current = redis.call('INCR', KEYS[1])
redis.call('EXPIRE', KEYS[1], ARGV[1])
return current
"#;

/// All-or-nothing admission across several counters.
///
/// ARGV holds `limit, ttl` pairs in key order. Returns 0 when every counter
/// was incremented, otherwise the 1-based index of the first full counter.
const ADMIT_SCRIPT: &str = r#"
for i = 1, #KEYS do
  local current = tonumber(redis.call('GET', KEYS[i]) or '0')
  if current >= tonumber(ARGV[2 * i - 1]) then
    return i
  end
end
for i = 1, #KEYS do
  redis.call('INCR', KEYS[i])
  redis.call('EXPIRE', KEYS[i], ARGV[2 * i])
end
return 0
"#;

/// A [`CounterStore`] talking to a single Redis server.
///
/// Every call is bounded by `op_timeout` and attempted exactly once.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    op_timeout: Duration,
    incr_script: Script,
    admit_script: Script,
}

impl RedisStore {
    /// Connect to `url`, failing if the server cannot be reached within
    /// `connect_timeout`.
    pub async fn connect(url: &str, connect_timeout: Duration, op_timeout: Duration) -> StoreResult<Self> {
        let client = Client::open(url)?;
        let conn = match tokio::time::timeout(connect_timeout, client.get_connection_manager()).await {
            Ok(conn) => conn?,
            Err(_) => return Err(StoreError::Timeout(connect_timeout)),
        };

        let store = Self {
            conn,
            op_timeout,
            incr_script: Script::new(INCR_EXPIRE_SCRIPT),
            admit_script: Script::new(ADMIT_SCRIPT),
        };
        store.ping().await?;

        info!(url = %redact(url), "Connected to Redis counter store");
        Ok(store)
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = RedisResult<T>> + Send,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(|e| {
                debug!(op, error = %e, "Redis call failed");
                StoreError::from(e)
            }),
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        }
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        self.bounded("PING", async move {
            let _: String = ::redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded("GET", async move {
            let value: Option<String> = conn.get(key).await?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        self.bounded("SET", async move {
            match ttl {
                Some(ttl) => {
                    let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
                }
                None => {
                    let _: () = conn.set(key, value).await?;
                }
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        self.bounded("DEL", async move {
            let removed: u64 = conn.del(keys).await?;
            Ok(removed)
        })
        .await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        self.bounded("EXISTS", async move {
            let found: bool = conn.exists(key).await?;
            Ok(found)
        })
        .await
    }

    async fn incr(&self, key: &str, ttl: Duration) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let count: i64 = self
            .bounded("INCR", async move {
                self.incr_script
                    .key(key)
                    .arg(ttl.as_secs().max(1))
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;
        u64::try_from(count).map_err(|_| StoreError::Corrupt(key.to_string()))
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        self.bounded("KEYS", async move {
            let keys: Vec<String> = conn.keys(pattern).await?;
            Ok(keys)
        })
        .await
    }

    async fn admit(&self, slots: &[CounterSlot]) -> StoreResult<Option<usize>> {
        if slots.is_empty() {
            return Ok(None);
        }

        let mut invocation = self.admit_script.prepare_invoke();
        for slot in slots {
            invocation.key(&slot.key);
            invocation.arg(slot.limit).arg(slot.ttl.as_secs().max(1));
        }

        let mut conn = self.conn.clone();
        let blocked: i64 = self
            .bounded("ADMIT", async move { invocation.invoke_async(&mut conn).await })
            .await?;

        Ok(match blocked {
            0 => None,
            n if n > 0 && (n as usize) <= slots.len() => Some(n as usize - 1),
            n => return Err(StoreError::Corrupt(format!("admission script returned {}", n))),
        })
    }
}

/// Hide credentials in a connection URL before logging it.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_hides_credentials() {
        assert_eq!(redact("redis://:secret@cache:6379/0"), "redis://***@cache:6379/0");
        assert_eq!(redact("redis://localhost:6379"), "redis://localhost:6379");
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_server_fails() {
        // Port 1 is reserved and nothing should be listening there.
        let result = RedisStore::connect(
            "redis://127.0.0.1:1",
            Duration::from_millis(200),
            Duration::from_millis(200),
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(Client::open("not a url").is_err());
    }

    /// Connects to the server named by `REDIS_URL`; tests return early when
    /// it is unset.
    async fn live_store() -> Option<RedisStore> {
        let url = std::env::var("REDIS_URL").ok()?;
        let store = RedisStore::connect(&url, Duration::from_secs(2), Duration::from_secs(2))
            .await
            .unwrap();
        Some(store)
    }

    fn unique_prefix(name: &str) -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("liteforex-test:{}:{}:{}", name, std::process::id(), nanos)
    }

    #[tokio::test]
    async fn test_live_admit_script_is_all_or_nothing() {
        let Some(store) = live_store().await else {
            return;
        };
        let prefix = unique_prefix("admit");
        let minute = format!("{prefix}:minute");
        let day = format!("{prefix}:day");
        let slots = vec![
            CounterSlot { key: minute.clone(), limit: 5, ttl: Duration::from_secs(60) },
            CounterSlot { key: day.clone(), limit: 2, ttl: Duration::from_secs(86400) },
        ];

        assert_eq!(store.admit(&slots).await.unwrap(), None);
        assert_eq!(store.admit(&slots).await.unwrap(), None);
        assert_eq!(store.admit(&slots).await.unwrap(), Some(1));

        // The denied call incremented neither counter.
        assert_eq!(store.get(&minute).await.unwrap(), Some("2".to_string()));
        assert_eq!(store.get(&day).await.unwrap(), Some("2".to_string()));

        let mut conn = store.conn.clone();
        let minute_ttl: i64 = conn.ttl(&minute).await.unwrap();
        let day_ttl: i64 = conn.ttl(&day).await.unwrap();
        assert!((1..=60).contains(&minute_ttl), "minute ttl {minute_ttl}");
        assert!((61..=86400).contains(&day_ttl), "day ttl {day_ttl}");

        assert_eq!(store.delete(&[minute, day]).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_live_incr_script_sets_expiry() {
        let Some(store) = live_store().await else {
            return;
        };
        let key = unique_prefix("incr");

        assert_eq!(store.incr(&key, Duration::from_secs(30)).await.unwrap(), 1);
        assert_eq!(store.incr(&key, Duration::from_secs(30)).await.unwrap(), 2);

        let mut conn = store.conn.clone();
        let ttl: i64 = conn.ttl(&key).await.unwrap();
        assert!((1..=30).contains(&ttl), "ttl {ttl}");

        let pattern = format!("{key}*");
        assert_eq!(store.keys(&pattern).await.unwrap(), vec![key.clone()]);
        assert_eq!(store.delete(&[key]).await.unwrap(), 1);
    }
}
