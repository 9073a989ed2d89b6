//! Logical request description

use bytes::Bytes;
use dialtone_transport::HttpRequest;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

/// Request body.
///
/// Bodies are serialized once when the request is built and re-sent unchanged
/// on every retry.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// JSON document, already serialized
    Json(Bytes),
    /// Opaque multipart payload with its full content type (boundary included)
    Multipart {
        /// `multipart/form-data; boundary=...`
        content_type: String,
        /// Encoded form
        data: Bytes,
    },
}

impl Body {
    /// Serialize a value as a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Body::Json(Bytes::from(serde_json::to_vec(value)?)))
    }

    fn content_type(&self) -> &str {
        match self {
            Body::Json(_) => "application/json",
            Body::Multipart { content_type, .. } => content_type,
        }
    }

    fn bytes(&self) -> Bytes {
        match self {
            Body::Json(data) | Body::Multipart { data, .. } => data.clone(),
        }
    }

    /// Body size in bytes.
    pub fn len(&self) -> usize {
        match self {
            Body::Json(data) | Body::Multipart { data, .. } => data.len(),
        }
    }

    /// Whether the body has no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One logical API call: what to send, before auth and retries are applied.
///
/// Immutable once built. The target is either a path resolved against the
/// session's base URL or an absolute `http(s)` URL used as-is.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    target: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<Body>,
    timeout: Option<Duration>,
}

impl Request {
    /// Start building a request.
    pub fn builder(method: Method, target: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            request: Request {
                method,
                target: target.into(),
                query: Vec::new(),
                headers: HeaderMap::new(),
                body: None,
                timeout: None,
            },
        }
    }

    /// A `GET` with no parameters.
    pub fn get(target: impl Into<String>) -> Self {
        Self::builder(Method::GET, target).build()
    }

    /// Get the method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path or absolute URL.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Query parameters in the order they were added.
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Get the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get the body.
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Per-call timeout override.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Same request aimed at `current` (this request's resolved URL) with
    /// every `name` parameter replaced by a single `value`. Parameters that
    /// arrived inside the URL itself are replaced too.
    pub(crate) fn with_query_param(&self, current: &Url, name: &str, value: &str) -> Self {
        let kept: Vec<(String, String)> = current
            .query_pairs()
            .filter(|(key, _)| key != name)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        let mut url = current.clone();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(name, value);
        self.with_url(&url)
    }

    /// Same request aimed at a different absolute URL. The URL is expected to
    /// carry its own query, so the original parameters are dropped.
    pub(crate) fn with_url(&self, url: &Url) -> Self {
        let mut next = self.clone();
        next.target = url.to_string();
        next.query.clear();
        next
    }

    /// Absolute URL for this request.
    ///
    /// Only targets that start with `http://` or `https://` are absolute.
    /// Anything else is a path under `base`, even if it contains a colon
    /// (`devices:activate`).
    pub fn resolve_url(&self, base: &Url) -> Result<Url> {
        let target = self.target.as_str();
        let lower = target.get(..8).unwrap_or(target).to_ascii_lowercase();

        let mut url = if lower.starts_with("http://") || lower.starts_with("https://") {
            Url::parse(target)
                .map_err(|e| Error::InvalidUrl(format!("{}: {}", target, e)))?
        } else if let Some((scheme, _)) = target.split_once("://")
            && !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(Error::InvalidUrl(format!(
                "Invalid URL scheme '{}'. Only 'http' and 'https' are supported.",
                scheme
            )));
        } else {
            // "./" keeps a colon in the first segment from reading as a scheme.
            base.join(&format!("./{}", target.trim_start_matches('/')))
                .map_err(|e| {
                    Error::InvalidUrl(format!(
                        "Failed to construct URL from path '{}': {}",
                        self.target, e
                    ))
                })?
        };

        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Wire-level request: default headers first, then the request's own,
    /// then content type and the bearer token.
    pub(crate) fn to_http(
        &self,
        base: &Url,
        default_headers: &HeaderMap,
        token: &SecretString,
    ) -> Result<HttpRequest> {
        let url = self.resolve_url(base)?;

        let mut headers = default_headers.clone();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        for (key, value) in &self.headers {
            headers.insert(key.clone(), value.clone());
        }

        let mut request = HttpRequest::new(self.method.clone(), url.as_str());

        if let Some(body) = &self.body {
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_str(body.content_type())
                    .map_err(|_| Error::InvalidHeaderValue(body.content_type().to_string()))?,
            );
            request = request.with_body(body.bytes());
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|_| Error::InvalidHeaderValue("authorization: <redacted>".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        request.headers = headers;
        request.timeout = self.timeout;
        Ok(request)
    }
}

/// Builder for [`Request`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Append a query parameter. Repeating a key sends it several times.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.request.query.push((key.into(), value.to_string()));
        self
    }

    /// Append one parameter per value, in order.
    pub fn query_all<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        let key = key.into();
        for value in values {
            self.request.query.push((key.clone(), value.to_string()));
        }
        self
    }

    /// Append several parameters, in order.
    pub fn query_pairs<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        for (key, value) in pairs {
            self.request.query.push((key.into(), value.to_string()));
        }
        self
    }

    /// Set a header.
    ///
    /// # Errors
    /// Returns an error if the header name or value contains invalid characters.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let key_str = key.into();
        let value_str = value.into();

        let key = key_str
            .parse::<HeaderName>()
            .map_err(|_| Error::InvalidHeaderName(key_str.clone()))?;
        let value = value_str
            .parse::<HeaderValue>()
            .map_err(|_| Error::InvalidHeaderValue(value_str.clone()))?;

        self.request.headers.insert(key, value);
        Ok(self)
    }

    /// Serialize `value` as the JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.request.body = Some(Body::json(value)?);
        Ok(self)
    }

    /// Attach a pre-encoded multipart body.
    pub fn multipart(mut self, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.request.body = Some(Body::Multipart {
            content_type: content_type.into(),
            data: data.into(),
        });
        self
    }

    /// Set the body directly.
    pub fn body(mut self, body: Body) -> Self {
        self.request.body = Some(body);
        self
    }

    /// Override the session timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout = Some(timeout);
        self
    }

    /// Finish building.
    pub fn build(self) -> Request {
        self.request
    }
}
