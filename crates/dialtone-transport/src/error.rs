//! Transport error types

use thiserror::Error;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur while moving one request over the wire.
///
/// HTTP error *statuses* are not transport errors: a 500 is a successful
/// transport round-trip and comes back as an [`HttpResponse`](crate::HttpResponse).
#[derive(Error, Debug)]
pub enum TransportError {
    /// The request or the response body did not complete in time
    #[error("Timeout")]
    Timeout,

    /// Connection-level failure: refused, reset, DNS, TLS, or a body that was
    /// cut off mid-transfer
    #[error("Connection error: {0}")]
    Connection(String),

    /// The request could not be built (bad URL, bad header, client construction)
    #[error("Request build error: {0}")]
    Build(String),

    /// Any other transport failure
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Whether the failure happened at the network level (timeout or
    /// connection), as opposed to a local construction problem.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connection(_))
    }

    /// Whether the failure is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() || err.is_request() || err.is_body() {
            Self::Connection(err.to_string())
        } else if err.is_builder() {
            Self::Build(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

impl From<::http::Error> for TransportError {
    fn from(err: ::http::Error) -> Self {
        Self::Build(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_classification() {
        assert!(TransportError::Timeout.is_network());
        assert!(TransportError::Timeout.is_timeout());
        assert!(TransportError::Connection("reset by peer".into()).is_network());
        assert!(!TransportError::Connection("reset by peer".into()).is_timeout());
        assert!(!TransportError::Build("bad url".into()).is_network());
        assert!(!TransportError::Other("?".into()).is_network());
    }

    #[test]
    fn test_display() {
        assert_eq!(TransportError::Timeout.to_string(), "Timeout");
        assert_eq!(
            TransportError::Connection("refused".into()).to_string(),
            "Connection error: refused"
        );
    }
}
