//! Centralized structured logging for logical calls
//!
//! Every logical call runs inside a span carrying a fresh `call_id`; attempts,
//! retries and the final outcome are logged through the helpers here so both
//! session flavors emit the same fields.

use std::time::Duration;
use tracing::{Span, debug, info, info_span, warn};
use uuid::Uuid;

use crate::error::ErrorClassification;

/// Open the span for one logical call.
pub fn call_span(method: &str, target: &str) -> Span {
    info_span!(
        "dialtone_call",
        call_id = %Uuid::new_v4(),
        method = %method,
        target = %target,
    )
}

/// Request metadata for structured logging
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Absolute request URL
    pub url: String,
    /// Request body size in bytes (optional)
    pub body_size: Option<usize>,
}

impl RequestMetadata {
    /// Create new request metadata
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            body_size: None,
        }
    }

    /// Set the request body size
    pub fn with_body_size(mut self, size: Option<usize>) -> Self {
        self.body_size = size;
        self
    }

    /// Log an attempt being sent
    pub fn log_attempt(&self, attempt: u32) {
        debug!(
            method = %self.method,
            url = %self.url,
            attempt,
            body_size = self.body_size,
            "Sending HTTP request"
        );
    }

    /// Log a scheduled retry
    pub fn log_retry(
        &self,
        classification: ErrorClassification,
        attempt: u32,
        delay: Duration,
        status: Option<u16>,
        tracking_id: Option<&str>,
    ) {
        warn!(
            method = %self.method,
            url = %self.url,
            %classification,
            attempt,
            delay_ms = delay.as_millis(),
            status,
            tracking_id,
            "Retrying HTTP request"
        );
    }

    /// Log a token refresh triggered by an auth failure
    pub fn log_auth_refresh(&self, attempt: u32, tracking_id: Option<&str>) {
        info!(
            method = %self.method,
            url = %self.url,
            attempt,
            tracking_id,
            "Access token rejected, refreshing"
        );
    }
}

/// Outcome metadata for structured logging
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// HTTP status code, if a response arrived
    pub status: Option<u16>,
    /// Time elapsed for the whole logical call
    pub elapsed: Duration,
    /// Number of retries taken
    pub retries: u32,
    /// Server tracking id
    pub tracking_id: Option<String>,
}

impl ResponseMetadata {
    /// Create new response metadata
    pub fn new(status: Option<u16>, elapsed: Duration) -> Self {
        Self {
            status,
            elapsed,
            retries: 0,
            tracking_id: None,
        }
    }

    /// Set the number of retries
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the tracking id
    pub fn with_tracking_id(mut self, tracking_id: Option<&str>) -> Self {
        self.tracking_id = tracking_id.map(String::from);
        self
    }

    /// Log successful response
    pub fn log_success(&self, request: &RequestMetadata) {
        info!(
            method = %request.method,
            url = %request.url,
            status = self.status,
            elapsed_ms = self.elapsed.as_millis(),
            retries = self.retries,
            tracking_id = self.tracking_id.as_deref(),
            "HTTP request succeeded"
        );
    }

    /// Log failed call
    pub fn log_error(&self, request: &RequestMetadata, error: &str) {
        warn!(
            method = %request.method,
            url = %request.url,
            status = self.status,
            elapsed_ms = self.elapsed.as_millis(),
            error = %error,
            retries = self.retries,
            tracking_id = self.tracking_id.as_deref(),
            "HTTP request failed"
        );
    }
}

/// Log one fetched page of a paginated traversal
pub fn log_page(page: usize, items: usize, has_next: bool) {
    debug!(page, items, has_next, "Fetched page");
}

/// Install a `fmt` subscriber writing to stderr.
///
/// Does nothing if the process already has a global subscriber.
#[cfg(feature = "trace")]
#[cfg_attr(docsrs, doc(cfg(feature = "trace")))]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_metadata_creation() {
        let metadata = RequestMetadata::new("GET", "https://webexapis.com/v1/people");
        assert_eq!(metadata.method, "GET");
        assert_eq!(metadata.url, "https://webexapis.com/v1/people");
        assert_eq!(metadata.body_size, None);
    }

    #[test]
    fn test_request_metadata_with_body_size() {
        let metadata = RequestMetadata::new("POST", "/items").with_body_size(Some(1024));
        assert_eq!(metadata.body_size, Some(1024));
    }

    #[test]
    fn test_response_metadata_builders() {
        let metadata = ResponseMetadata::new(Some(200), Duration::from_millis(500))
            .with_retries(2)
            .with_tracking_id(Some("ROUTER_1"));
        assert_eq!(metadata.status, Some(200));
        assert_eq!(metadata.retries, 2);
        assert_eq!(metadata.tracking_id.as_deref(), Some("ROUTER_1"));
    }

    #[test]
    fn test_logging_does_not_panic_under_subscriber() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let span = call_span("GET", "people");
            let _enter = span.enter();
            let request = RequestMetadata::new("GET", "https://example.com/people");
            request.log_attempt(1);
            request.log_retry(
                ErrorClassification::RetryableTransient,
                1,
                Duration::from_millis(500),
                Some(503),
                None,
            );
            request.log_auth_refresh(2, Some("ROUTER_2"));
            ResponseMetadata::new(Some(200), Duration::from_millis(10)).log_success(&request);
            ResponseMetadata::new(None, Duration::from_millis(10)).log_error(&request, "boom");
            log_page(1, 2, true);
        });
    }
}
