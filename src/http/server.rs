//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{LiteforexError, Result};

/// HTTP server for the rates API.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Fully layered application router
    router: Router,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, router: Router) -> Self {
        Self { addr, router }
    }

    /// Bind and serve until `signal` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            LiteforexError::Io(e)
        })?;
        serve_listener(listener, self.router, signal).await
    }
}

/// Serve on an already bound listener.
pub async fn serve_listener<F>(listener: TcpListener, router: Router, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, "Starting HTTP server with graceful shutdown");

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            LiteforexError::Io(e)
        })
}
