//! Blocking HTTP transport backed by `reqwest::blocking`.
//!
//! `reqwest::blocking` runs its own internal runtime, so this transport must
//! not be created, used or dropped from inside an async context.

use crate::error::{Result, TransportError};
use crate::http::HttpTransportConfig;
use crate::traits::{BlockingTransport, HttpRequest, HttpResponse};
use reqwest::blocking::Client as BlockingClient;

/// Blocking counterpart of [`HttpTransport`](crate::HttpTransport).
#[derive(Debug, Clone)]
pub struct BlockingHttpTransport {
    client: BlockingClient,
}

impl BlockingHttpTransport {
    /// Create a new blocking transport with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(HttpTransportConfig::default())
    }

    /// Create a new blocking transport with custom configuration
    pub fn with_config(config: HttpTransportConfig) -> Result<Self> {
        let client = BlockingClient::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .tcp_keepalive(config.tcp_keepalive)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;

        Ok(Self { client })
    }
}

impl BlockingTransport for BlockingHttpTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut req = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            req = req.body(body);
        }
        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        let response = req.send()?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes()?;

        tracing::trace!(status = status.as_u16(), body_size = body.len(), "transport response");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
