//! Transport traits and the request/response values they exchange.

use crate::error::{Result, TransportError};
use ::http::header::{HeaderMap, HeaderName, HeaderValue};
use ::http::{Method, StatusCode};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// HTTP request specification
///
/// One physical request, fully resolved: absolute URL, final headers, body
/// bytes. Cheap to clone (`Bytes` is reference counted), so a retry loop can
/// resend the same request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,

    /// Absolute request URL, query string included
    pub url: String,

    /// Request headers
    pub headers: HeaderMap,

    /// Request body (optional)
    pub body: Option<Bytes>,

    /// Per-request timeout overriding the transport default
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Create a new HTTP request
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Add a header to the request
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Build`] if the name or value is not a valid header.
    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| TransportError::Build(format!("invalid header name '{}': {}", key, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::Build(format!("invalid header value for '{}': {}", key, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Set the request body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// HTTP response
///
/// Represents an HTTP response received from the server, body fully read.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: StatusCode,

    /// Response headers
    pub headers: HeaderMap,

    /// Response body
    pub body: Bytes,
}

impl HttpResponse {
    /// Create a new HTTP response
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Check if response is successful (2xx)
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get a header value by name (case-insensitive), if it is valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Async transport: moves one request over the wire.
///
/// Implementations must be safe for concurrent use; the connection pool they
/// own is the only resource shared between logical calls.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Send an HTTP request and receive a response
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Blocking transport: moves one request over the wire on the calling thread.
pub trait BlockingTransport: Send + Sync + std::fmt::Debug {
    /// Send an HTTP request and receive a response
    fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::new(Method::GET, "https://example.com/v1/items")
            .with_header("Authorization", "Bearer token123")
            .unwrap()
            .with_header("Accept", "application/json")
            .unwrap()
            .with_timeout(Duration::from_secs(5));

        assert_eq!(request.method, Method::GET);
        assert_eq!(request.headers.len(), 2);
        assert_eq!(request.headers["authorization"], "Bearer token123");
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
        assert!(request.body.is_none());
    }

    #[test]
    fn test_request_rejects_bad_header() {
        let result = HttpRequest::new(Method::GET, "https://example.com").with_header("bad header", "x");
        assert!(matches!(result, Err(TransportError::Build(_))));
    }

    #[test]
    fn test_request_clone_shares_body() {
        let request = HttpRequest::new(Method::POST, "https://example.com").with_body(vec![1u8, 2, 3]);
        let clone = request.clone();
        assert_eq!(clone.body.as_deref(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_response_helpers() {
        let mut headers = HeaderMap::new();
        headers.insert("TrackingID", HeaderValue::from_static("ROUTER_abc"));
        let response = HttpResponse::new(StatusCode::OK, headers, "{}");

        assert!(response.is_success());
        assert_eq!(response.header("trackingid"), Some("ROUTER_abc"));
        assert_eq!(response.header("missing"), None);
    }
}
