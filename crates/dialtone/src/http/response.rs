//! Successful response wrapper

use dialtone_transport::HttpResponse;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::error::{Error, Result};

/// A successful (2xx) response with its body already parsed as JSON.
///
/// `204 No Content` and empty bodies carry no document.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Value>,
    tracking_id: Option<String>,
    retries_taken: u32,
    elapsed: Duration,
}

impl ApiResponse {
    /// Parse a raw 2xx response.
    ///
    /// # Errors
    /// Returns [`Error::Decode`] if the body is present but not valid JSON.
    pub(crate) fn from_http(
        response: HttpResponse,
        tracking_header: &str,
        retries_taken: u32,
        elapsed: Duration,
    ) -> Result<Self> {
        let tracking_id = response.header(tracking_header).map(String::from);

        let body = if response.status == StatusCode::NO_CONTENT
            || response.body.iter().all(u8::is_ascii_whitespace)
        {
            None
        } else {
            Some(
                serde_json::from_slice(&response.body).map_err(|e| {
                    Error::decode(e, Some(response.status.as_u16()), tracking_id.clone())
                })?,
            )
        };

        Ok(Self {
            status: response.status,
            headers: response.headers,
            body,
            tracking_id,
            retries_taken,
            elapsed,
        })
    }

    /// HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a header value by name, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Parsed body, or `None` for 204 / empty.
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Take the parsed body.
    pub fn into_body(self) -> Option<Value> {
        self.body
    }

    /// Server tracking id of this response.
    pub fn tracking_id(&self) -> Option<&str> {
        self.tracking_id.as_deref()
    }

    /// Retries spent before this response arrived.
    pub fn retries_taken(&self) -> u32 {
        self.retries_taken
    }

    /// Wall time of the whole logical call, retries and sleeps included.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Decode the body into `T`.
    ///
    /// A missing body decodes as JSON `null`, so `Option<T>` and `()` accept
    /// 204 responses.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.body.clone().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| {
            Error::decode(e, Some(self.status.as_u16()), self.tracking_id.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use serde::Deserialize;

    fn raw(status: u16, body: &str) -> HttpResponse {
        let mut headers = HeaderMap::new();
        headers.insert("trackingid", HeaderValue::from_static("ROUTER_ok"));
        HttpResponse::new(StatusCode::from_u16(status).unwrap(), headers, body.to_string())
    }

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Queue {
        id: String,
        display_name: Option<String>,
    }

    #[test]
    fn test_typed_decode_ignores_unknown_fields() {
        let resp = ApiResponse::from_http(
            raw(200, r#"{"id":"q1","displayName":"Sales","extra":true}"#),
            "trackingid",
            1,
            Duration::from_millis(20),
        )
        .unwrap();

        let queue: Queue = resp.json().unwrap();
        assert_eq!(
            queue,
            Queue {
                id: "q1".into(),
                display_name: Some("Sales".into())
            }
        );
        assert_eq!(resp.tracking_id(), Some("ROUTER_ok"));
        assert_eq!(resp.retries_taken(), 1);
        assert_eq!(resp.elapsed(), Duration::from_millis(20));
    }

    #[test]
    fn test_no_content_has_no_body() {
        let resp = ApiResponse::from_http(raw(204, ""), "trackingid", 0, Duration::ZERO).unwrap();
        assert!(resp.body().is_none());
        let decoded: Option<Queue> = resp.json().unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_invalid_json_is_decode_error() {
        let err = ApiResponse::from_http(raw(200, "<html>"), "trackingid", 0, Duration::ZERO)
            .unwrap_err();
        match err {
            Error::Decode {
                status,
                tracking_id,
                ..
            } => {
                assert_eq!(status, Some(200));
                assert_eq!(tracking_id.as_deref(), Some("ROUTER_ok"));
            }
            other => panic!("Expected Decode, got {other:?}"),
        }
    }

    #[test]
    fn test_shape_mismatch_is_decode_error() {
        let resp = ApiResponse::from_http(raw(200, r#"{"name":"x"}"#), "trackingid", 0, Duration::ZERO)
            .unwrap();
        let err = resp.json::<Queue>().unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
        assert!(!err.is_retryable());
    }
}
