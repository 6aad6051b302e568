//! Request middleware: client identity, rate limiting and timing.

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use super::error::ApiError;
use super::AppState;
use crate::ratelimit::Admission;

/// Header carrying handler latency in seconds.
pub const PROCESS_TIME_HEADER: &str = "x-process-time";

/// Identify the caller: `x-real-ip`, then the first `x-forwarded-for` hop,
/// then the peer address.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header("x-real-ip")
        .map(str::to_string)
        .or_else(|| {
            header("x-forwarded-for")
                .and_then(|v| v.split(',').map(str::trim).find(|ip| !ip.is_empty()))
                .map(str::to_string)
        })
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Admission control in front of every rate-limited route.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_identity(req.headers(), peer);
    let endpoint = req.uri().path().to_string();

    match state.limiter.check(&client, &endpoint).await {
        Admission::Denied { retry_after, window, .. } => {
            debug!(client = %client, endpoint = %endpoint, window = %window, "Rejecting request");
            ApiError::RateLimited { retry_after }.into_response()
        }
        Admission::Allowed | Admission::FailOpen => next.run(req).await,
    }
}

/// Stamp every response with how long the inner stack took.
pub async fn process_time(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = format!("{:.6}", start.elapsed().as_secs_f64());
    if let Ok(value) = HeaderValue::from_str(&elapsed) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_real_ip_wins() {
        let h = headers(&[("x-real-ip", "10.0.0.1"), ("x-forwarded-for", "10.0.0.2")]);
        assert_eq!(client_identity(&h, None), "10.0.0.1");
    }

    #[test]
    fn test_first_forwarded_hop() {
        let h = headers(&[("x-forwarded-for", " , 203.0.113.7, 10.0.0.2")]);
        assert_eq!(client_identity(&h, None), "203.0.113.7");
    }

    #[test]
    fn test_peer_then_unknown() {
        let peer: SocketAddr = "[::1]:5555".parse().unwrap();
        assert_eq!(client_identity(&HeaderMap::new(), Some(peer)), "::1");
        assert_eq!(client_identity(&HeaderMap::new(), None), "unknown");
    }
}
