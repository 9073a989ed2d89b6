//! Async HTTP transport client implementation
//!
//! Implements the [`Transport`] trait on top of a pooled `reqwest::Client`.
//! No retries happen here; the session core owns the retry policy.

use crate::error::{Result, TransportError};
use crate::traits::{HttpRequest, HttpResponse, Transport};
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use std::time::Duration;

/// Async HTTP transport
///
/// Handles:
/// - Connection pooling (cloning shares the pool)
/// - Default and per-request timeouts
/// - Mapping reqwest failures onto [`TransportError`]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: ReqwestClient,
}

impl HttpTransport {
    /// Create a new HTTP transport with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(HttpTransportConfig::default())
    }

    /// Create a new HTTP transport with custom configuration
    pub fn with_config(config: HttpTransportConfig) -> Result<Self> {
        let client = ReqwestClient::builder()
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

    /// Wrap an existing `reqwest::Client`
    pub fn from_client(client: ReqwestClient) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying reqwest client
    pub fn reqwest_client(&self) -> &ReqwestClient {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
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

        let response = req.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        tracing::trace!(status = status.as_u16(), body_size = body.len(), "transport response");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// HTTP transport configuration
#[derive(Clone, Debug)]
pub struct HttpTransportConfig {
    /// Default request timeout
    pub timeout: Duration,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,

    /// How long an idle pooled connection is kept
    pub pool_idle_timeout: Duration,

    /// TCP keep-alive interval
    pub tcp_keepalive: Option<Duration>,

    /// `User-Agent` header sent with every request
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Some(Duration::from_secs(60)),
            user_agent: format!("dialtone-rust/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_transport_creation() {
        let transport = HttpTransport::new();
        assert!(transport.is_ok());
    }

    #[test]
    fn test_http_transport_with_config() {
        let config = HttpTransportConfig {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            pool_max_idle_per_host: 5,
            pool_idle_timeout: Duration::from_secs(10),
            tcp_keepalive: None,
            user_agent: "test-agent/1.0".to_string(),
        };

        let transport = HttpTransport::with_config(config);
        assert!(transport.is_ok());
    }

    #[test]
    fn test_default_config() {
        let config = HttpTransportConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.pool_max_idle_per_host, 10);
        assert!(config.user_agent.starts_with("dialtone-rust/"));
    }
}
