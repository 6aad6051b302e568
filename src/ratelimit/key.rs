//! Counter key generation and parsing.

use std::fmt;

use super::window::WindowKind;
use crate::store::escape_glob;

/// Prefix shared by every rate-limit counter in the store.
pub const KEY_PREFIX: &str = "ratelimit";

/// A key that uniquely identifies one window instance of a rate-limit counter.
///
/// Serialized as `ratelimit:<client>:<endpoint>:<window>:<window_start>`.
/// Client and endpoint are escaped so that a `:` inside them (IPv6 clients,
/// for instance) cannot be confused with the separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub client: String,
    pub endpoint: String,
    pub window: WindowKind,
    /// Window start (epoch seconds, floored to the window boundary)
    pub window_start: u64,
}

impl CounterKey {
    /// Build the key for the window instance of `window` containing `now`.
    pub fn new(client: &str, endpoint: &str, window: WindowKind, now: u64) -> Self {
        Self {
            client: client.to_string(),
            endpoint: endpoint.to_string(),
            window,
            window_start: window.window_start(now),
        }
    }

    /// Convert to the string key used in the store.
    pub fn to_store_key(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            KEY_PREFIX,
            encode_segment(&self.client),
            encode_segment(&self.endpoint),
            self.window,
            self.window_start
        )
    }

    /// Parse a store key produced by [`CounterKey::to_store_key`].
    pub fn parse(key: &str) -> Option<Self> {
        let rest = key.strip_prefix(KEY_PREFIX)?.strip_prefix(':')?;

        let mut parts = rest.split(':');
        let client = decode_segment(parts.next()?)?;
        let endpoint = decode_segment(parts.next()?)?;
        let window = parts.next()?.parse().ok()?;
        let window_start = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }

        Some(Self {
            client,
            endpoint,
            window,
            window_start,
        })
    }

    /// Glob matching every counter of `client`, optionally for one endpoint only.
    pub fn client_pattern(client: &str, endpoint: Option<&str>) -> String {
        let client = escape_glob(&encode_segment(client));
        match endpoint {
            Some(endpoint) => format!(
                "{}:{}:{}:*",
                KEY_PREFIX,
                client,
                escape_glob(&encode_segment(endpoint))
            ),
            None => format!("{}:{}:*", KEY_PREFIX, client),
        }
    }

    /// Glob matching every rate-limit counter.
    pub fn all_pattern() -> String {
        format!("{}:*", KEY_PREFIX)
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_store_key())
    }
}

fn encode_segment(raw: &str) -> String {
    raw.replace('%', "%25").replace(':', "%3A")
}

fn decode_segment(encoded: &str) -> Option<String> {
    let mut out = String::with_capacity(encoded.len());
    let mut rest = encoded;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3)?;
        out.push(match code {
            "25" => '%',
            "3A" => ':',
            _ => return None,
        });
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Some(out)
}
