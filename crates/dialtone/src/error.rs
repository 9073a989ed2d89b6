//! Error types for the dialtone session core
//!
//! Every failure a caller can observe is one of the [`Error`] variants below.
//! Individual failed attempts are never surfaced: by the time an error leaves
//! the session it has been classified, retried where the policy allows, and
//! stamped with the number of attempts it took.

use dialtone_transport::{HttpResponse, TransportError};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for operations that can fail with a dialtone error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the session core.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-level failure (connect, reset, timeout) that outlived the retry budget.
    #[error("Network error after {attempts} attempt(s): {message}")]
    TransientNetwork {
        /// Description of the last transport failure
        message: String,
        /// Whether the last failure was a timeout
        timed_out: bool,
        /// Requests issued for the logical call
        attempts: u32,
    },

    /// 5xx that outlived the retry budget, or an unexpected non-success status.
    #[error("Server error: {0}")]
    Server(ApiError),

    /// 429 that outlived the rate-limit budget, or whose `Retry-After` was too long.
    #[error("Rate limit exceeded: {error}")]
    RateLimited {
        /// The last 429 response
        error: ApiError,
        /// Server-requested delay from the last 429, if any
        retry_after: Option<Duration>,
    },

    /// Credentials were rejected and one refresh did not help.
    #[error("Authentication expired: {0}")]
    AuthExpired(ApiError),

    /// 4xx other than 401/429; never retried.
    #[error("Client error: {0}")]
    Client(ApiError),

    /// A 2xx body (or a page item) could not be decoded.
    #[error("Failed to decode response: {message}")]
    Decode {
        /// Decoder message
        message: String,
        /// Status of the response being decoded
        status: Option<u16>,
        /// Tracking id of the response being decoded
        tracking_id: Option<String>,
    },

    /// A page after the first one failed; items already yielded stay valid.
    #[error("Pagination broken at page {page} after {items_yielded} item(s): {source}")]
    PaginationBroken {
        /// 1-based index of the page that failed
        page: usize,
        /// Items handed to the consumer before the failure
        items_yielded: usize,
        /// Why the page could not be fetched
        #[source]
        source: Box<Error>,
    },

    /// The credential provider failed to supply or refresh a token.
    #[error("Credential provider failed: {0}")]
    Credentials(#[source] anyhow::Error),

    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid HTTP header name.
    #[error("Invalid HTTP header name: {0}")]
    InvalidHeaderName(String),

    /// Invalid HTTP header value.
    #[error("Invalid HTTP header value: {0}")]
    InvalidHeaderValue(String),

    /// HTTP client configuration or request construction error.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Request body serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing required configuration.
    #[error("Missing required configuration: {0}")]
    MissingConfig(String),
}

/// How a single response or transport failure is treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClassification {
    /// Network failure or 5xx; retried with exponential backoff.
    RetryableTransient,
    /// 429; retried after `Retry-After` or the backoff schedule.
    RetryableRateLimited,
    /// 4xx other than 401/429; surfaced immediately.
    ClientError,
    /// Unexpected status outside 2xx/4xx/5xx; surfaced immediately.
    ServerFatal,
    /// 401 or an expired-token error code; one refresh, one retry.
    AuthExpired,
}

impl ErrorClassification {
    /// Classify a non-success status. `code` is the machine-readable error
    /// code from the body, checked against `auth_expired_codes` for 4xx.
    pub fn from_status(status: u16, code: Option<&str>, auth_expired_codes: &[String]) -> Self {
        match status {
            401 => Self::AuthExpired,
            429 => Self::RetryableRateLimited,
            400..=499 => {
                if code.is_some_and(|c| auth_expired_codes.iter().any(|known| known == c)) {
                    Self::AuthExpired
                } else {
                    Self::ClientError
                }
            }
            500..=599 => Self::RetryableTransient,
            _ => Self::ServerFatal,
        }
    }

    /// Classify a transport failure.
    pub fn from_transport(err: &TransportError) -> Self {
        if err.is_network() {
            Self::RetryableTransient
        } else {
            Self::ClientError
        }
    }

    /// Whether the policy may retry this classification at all.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RetryableTransient | Self::RetryableRateLimited | Self::AuthExpired
        )
    }
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RetryableTransient => "retryable_transient",
            Self::RetryableRateLimited => "retryable_rate_limited",
            Self::ClientError => "client_error",
            Self::ServerFatal => "server_fatal",
            Self::AuthExpired => "auth_expired",
        };
        f.write_str(name)
    }
}

/// Details of a non-success HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code
    pub status: u16,
    /// Machine-readable error code from the body, if present
    pub code: Option<String>,
    /// Human-readable message (body text when the body is not JSON)
    pub message: String,
    /// Server tracking id, from the header or the body
    pub tracking_id: Option<String>,
    /// Requests issued for the logical call
    pub attempts: u32,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}", self.status)?;
        if let Some(code) = &self.code {
            write!(f, " ({})", code)?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(tracking_id) = &self.tracking_id {
            write!(f, " [trackingId: {}]", tracking_id)?;
        }
        Ok(())
    }
}

impl ApiError {
    /// Build from a raw response. `tracking_header` names the header that
    /// carries the tracking id; the body's `trackingId` is the fallback.
    pub fn from_response(response: &HttpResponse, tracking_header: &str, attempts: u32) -> Self {
        let status = response.status.as_u16();
        let body = parse_error_body(&response.body);

        let message = body.message.unwrap_or_else(|| {
            let text = String::from_utf8_lossy(&response.body).trim().to_string();
            if text.is_empty() {
                response
                    .status
                    .canonical_reason()
                    .unwrap_or("Unknown status")
                    .to_string()
            } else {
                text
            }
        });

        Self {
            status,
            code: body.code,
            message,
            tracking_id: response
                .header(tracking_header)
                .map(String::from)
                .or(body.tracking_id),
            attempts,
        }
    }
}

impl Error {
    /// Turn a classified non-success response into the error the caller sees.
    pub fn from_api(
        classification: ErrorClassification,
        error: ApiError,
        retry_after: Option<Duration>,
    ) -> Self {
        match classification {
            ErrorClassification::RetryableTransient | ErrorClassification::ServerFatal => {
                Error::Server(error)
            }
            ErrorClassification::RetryableRateLimited => Error::RateLimited { error, retry_after },
            ErrorClassification::AuthExpired => Error::AuthExpired(error),
            ErrorClassification::ClientError => Error::Client(error),
        }
    }

    /// Turn a transport failure into the error the caller sees.
    pub fn from_transport(err: TransportError, attempts: u32) -> Self {
        match err {
            TransportError::Timeout => Error::TransientNetwork {
                message: "request timed out".to_string(),
                timed_out: true,
                attempts,
            },
            TransportError::Connection(message) => Error::TransientNetwork {
                message,
                timed_out: false,
                attempts,
            },
            TransportError::Build(message) | TransportError::Other(message) => {
                Error::HttpClient(message)
            }
        }
    }

    /// Decode error for a response body.
    pub(crate) fn decode(
        err: impl fmt::Display,
        status: Option<u16>,
        tracking_id: Option<String>,
    ) -> Self {
        Error::Decode {
            message: err.to_string(),
            status,
            tracking_id,
        }
    }

    fn api_error(&self) -> Option<&ApiError> {
        match self {
            Error::Server(e) | Error::AuthExpired(e) | Error::Client(e) => Some(e),
            Error::RateLimited { error, .. } => Some(error),
            _ => None,
        }
    }

    /// HTTP status of the response behind this error, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Decode { status, .. } => *status,
            Error::PaginationBroken { source, .. } => source.status(),
            other => other.api_error().map(|e| e.status),
        }
    }

    /// Server tracking id, if the failing response carried one.
    pub fn tracking_id(&self) -> Option<&str> {
        match self {
            Error::Decode { tracking_id, .. } => tracking_id.as_deref(),
            Error::PaginationBroken { source, .. } => source.tracking_id(),
            other => other.api_error().and_then(|e| e.tracking_id.as_deref()),
        }
    }

    /// Number of requests issued for the failing logical call.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Error::TransientNetwork { attempts, .. } => Some(*attempts),
            Error::PaginationBroken { source, .. } => source.attempts(),
            other => other.api_error().map(|e| e.attempts),
        }
    }

    /// Server-requested delay carried by a rate-limit error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Retry classification of the underlying failure, if it came from the wire.
    pub fn classification(&self) -> Option<ErrorClassification> {
        match self {
            Error::TransientNetwork { .. } => Some(ErrorClassification::RetryableTransient),
            Error::Server(e) if (500..=599).contains(&e.status) => {
                Some(ErrorClassification::RetryableTransient)
            }
            Error::Server(_) => Some(ErrorClassification::ServerFatal),
            Error::RateLimited { .. } => Some(ErrorClassification::RetryableRateLimited),
            Error::AuthExpired(_) => Some(ErrorClassification::AuthExpired),
            Error::Client(_) => Some(ErrorClassification::ClientError),
            Error::PaginationBroken { source, .. } => source.classification(),
            _ => None,
        }
    }

    /// Whether the underlying failure is of a kind worth retrying later.
    ///
    /// The session has already spent its own retry budget by the time an error
    /// is returned; this is a hint for callers running their own outer loop.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ErrorClassification::RetryableTransient | ErrorClassification::RetryableRateLimited)
        )
    }
}

/// Parse a `Retry-After` header: delta-seconds or an HTTP-date.
///
/// Dates in the past yield a zero delay.
pub fn parse_retry_after(
    headers: &http::HeaderMap,
    now: chrono::DateTime<chrono::Utc>,
) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = chrono::DateTime::parse_from_rfc2822(value)
        .ok()?
        .with_timezone(&chrono::Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

#[derive(Debug, Default)]
struct ErrorBody {
    message: Option<String>,
    code: Option<String>,
    tracking_id: Option<String>,
}

/// Pull message / code / trackingId out of the error body shapes the API uses:
///
/// ```json
/// {"message": "...", "errorCode": 1234, "trackingId": "...",
///  "errors": [{"description": "...", "errorCode": 1234}]}
/// {"error": {"message": "...", "code": "..."}}
/// ```
fn parse_error_body(body: &[u8]) -> ErrorBody {
    let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) else {
        return ErrorBody::default();
    };

    let first_error = map
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first());
    let nested = map.get("error").filter(|v| v.is_object());

    let message = string_field(map.get("message"))
        .or_else(|| first_error.and_then(|e| string_field(e.get("description"))))
        .or_else(|| nested.and_then(|e| string_field(e.get("message"))))
        .or_else(|| string_field(map.get("error")));

    let code = string_field(map.get("errorCode"))
        .or_else(|| string_field(map.get("code")))
        .or_else(|| first_error.and_then(|e| string_field(e.get("errorCode"))))
        .or_else(|| nested.and_then(|e| string_field(e.get("code"))));

    ErrorBody {
        message,
        code,
        tracking_id: string_field(map.get("trackingId")),
    }
}

// Codes come as strings or numbers depending on the endpoint.
fn string_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
