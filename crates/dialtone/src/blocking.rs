//! Blocking session
//!
//! Same contract as [`Session`](crate::Session) on the calling thread:
//! identical classification, retry decisions and pagination semantics, backed
//! by reqwest's blocking client and `std::thread::sleep`.
//!
//! Do not use this from inside an async runtime; reqwest's blocking client
//! panics when driven from a runtime thread.

use dialtone_core::retry::BackoffStrategy;
use dialtone_core::sleep::{BlockingSleeper, ThreadSleeper};
use dialtone_transport::{BlockingHttpTransport, BlockingTransport};
use http::Method;
use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use url::Url;

use crate::config::SessionConfig;
use crate::credentials::{BlockingCredentialProvider, BlockingTokenCache};
use crate::error::{Error, Result};
use crate::http::{ApiResponse, Request};
use crate::observability::call_span;
use crate::retry::{Attempt, RetryDecision};
use crate::session::{SessionShared, resolve_static_token};

/// Blocking HTTP session.
///
/// Cheap to clone; clones share the connection pool and the token cache.
///
/// # Example
///
/// ```rust,no_run
/// use dialtone::BlockingSession;
///
/// # fn example() -> dialtone::Result<()> {
/// let session = BlockingSession::new("access-token")?;
/// let me = session.get("people/me", &[])?;
/// println!("{:?}", me.tracking_id());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct BlockingSession {
    inner: Arc<BlockingSessionInner>,
}

#[derive(Debug)]
struct BlockingSessionInner {
    shared: SessionShared,
    transport: Arc<dyn BlockingTransport>,
    credentials: BlockingTokenCache,
    sleeper: Arc<dyn BlockingSleeper>,
}

impl BlockingSession {
    /// Create a session with a fixed access token and default configuration.
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        Self::builder().access_token(access_token).build()
    }

    /// Create a new session builder.
    pub fn builder() -> BlockingSessionBuilder {
        BlockingSessionBuilder::default()
    }

    /// Create a session from a configuration object.
    pub fn from_config(config: SessionConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// The configuration this session was built with.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.shared.config
    }

    /// Resolved base URL (always ends in `/`).
    pub fn base_url(&self) -> &Url {
        &self.inner.shared.base_url
    }

    /// Forget the cached token; see [`Session::invalidate_token`](crate::Session::invalidate_token).
    pub fn invalidate_token(&self) {
        self.inner.credentials.invalidate();
    }

    /// Execute a request with auth and retries.
    pub fn execute(&self, request: Request) -> Result<ApiResponse> {
        self.execute_ref(&request)
    }

    /// Execute a request and decode the body into `T`.
    pub fn execute_json<T: DeserializeOwned>(&self, request: Request) -> Result<T> {
        self.execute(request)?.json()
    }

    pub(crate) fn execute_ref(&self, request: &Request) -> Result<ApiResponse> {
        let span = call_span(request.method().as_str(), request.target());
        let _enter = span.enter();

        let inner = &self.inner;
        let shared = &inner.shared;
        let classifier = shared.classifier();
        let meta = shared.metadata(request)?;
        let mut state = shared.retry_state();
        let mut token = inner.credentials.token()?;

        loop {
            let http_request = shared.prepare(request, &token)?;
            let attempt = state.begin_attempt();
            meta.log_attempt(attempt);

            let outcome = inner.transport.send(http_request);

            let (classification, error, status, retry_after) =
                match classifier.evaluate(outcome, attempt) {
                    Attempt::Success(response) => return shared.finish(response, &state, &meta),
                    Attempt::Failure {
                        classification,
                        error,
                        status,
                        retry_after,
                    } => (classification, error, status, retry_after),
                };

            match state.decide(classification, retry_after) {
                RetryDecision::RetryAfter(delay) => {
                    meta.log_retry(classification, attempt, delay, status, error.tracking_id());
                    inner.sleeper.sleep(delay);
                }
                RetryDecision::RefreshAndRetry => {
                    meta.log_auth_refresh(attempt, error.tracking_id());
                    token = inner.credentials.refresh(&token)?;
                }
                RetryDecision::GiveUp => {
                    return Err(shared.give_up(error, status, &state, &meta));
                }
            }
        }
    }

    /// `GET path` with query parameters.
    pub fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<ApiResponse> {
        let request = Request::builder(Method::GET, path)
            .query_pairs(query.iter().copied())
            .build();
        self.execute(request)
    }

    /// `POST path` with a JSON body.
    pub fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.execute(Request::builder(Method::POST, path).json(body)?.build())
    }

    /// `PUT path` with a JSON body.
    pub fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.execute(Request::builder(Method::PUT, path).json(body)?.build())
    }

    /// `PATCH path` with a JSON body.
    pub fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.execute(Request::builder(Method::PATCH, path).json(body)?.build())
    }

    /// `DELETE path`.
    pub fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.execute(Request::builder(Method::DELETE, path).build())
    }
}

/// Builder for [`BlockingSession`].
#[derive(Default)]
pub struct BlockingSessionBuilder {
    config: SessionConfig,
    credentials: Option<Arc<dyn BlockingCredentialProvider>>,
    transport: Option<Arc<dyn BlockingTransport>>,
    sleeper: Option<Arc<dyn BlockingSleeper>>,
    backoff: Option<Arc<dyn BackoffStrategy>>,
}

impl std::fmt::Debug for BlockingSessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingSessionBuilder")
            .field("config", &self.config)
            .field("custom_credentials", &self.credentials.is_some())
            .field("custom_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

impl BlockingSessionBuilder {
    /// Replace the whole configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a fixed access token.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config.access_token = Some(SecretString::new(token.into().into_boxed_str()));
        self
    }

    /// Set the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = Some(base_url.into());
        self
    }

    /// Use a credential provider instead of a fixed token.
    pub fn credentials(mut self, provider: Arc<dyn BlockingCredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Send requests through a custom transport.
    pub fn transport(mut self, transport: Arc<dyn BlockingTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sleep between retries through a custom sleeper.
    pub fn sleeper(mut self, sleeper: Arc<dyn BlockingSleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Replace the backoff schedule derived from [`RetryConfig`](crate::RetryConfig).
    pub fn backoff(mut self, backoff: Arc<dyn BackoffStrategy>) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Build the session.
    ///
    /// # Errors
    ///
    /// Same conditions as [`SessionBuilder::build`](crate::SessionBuilder::build).
    pub fn build(self) -> Result<BlockingSession> {
        let Self {
            config,
            credentials,
            transport,
            sleeper,
            backoff,
        } = self;

        let provider: Arc<dyn BlockingCredentialProvider> = match credentials {
            Some(provider) => provider,
            None => Arc::new(resolve_static_token(&config)?),
        };

        let transport: Arc<dyn BlockingTransport> = match transport {
            Some(transport) => transport,
            None => Arc::new(
                BlockingHttpTransport::with_config(config.transport_config())
                    .map_err(|e| Error::HttpClient(e.to_string()))?,
            ),
        };

        let sleeper: Arc<dyn BlockingSleeper> = match sleeper {
            Some(sleeper) => sleeper,
            None => Arc::new(ThreadSleeper),
        };

        let shared = SessionShared::new(config, backoff)?;

        Ok(BlockingSession {
            inner: Arc::new(BlockingSessionInner {
                shared,
                transport,
                credentials: BlockingTokenCache::new(provider),
                sleeper,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialtone_core::sleep::RecordingSleeper;
    use dialtone_transport::{HttpRequest, HttpResponse, TransportError};
    use http::{HeaderMap, HeaderValue, StatusCode};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<std::result::Result<HttpResponse, TransportError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<std::result::Result<HttpResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl BlockingTransport for ScriptedTransport {
        fn send(&self, _request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Other("script exhausted".into())))
        }
    }

    fn status(code: u16) -> std::result::Result<HttpResponse, TransportError> {
        Ok(HttpResponse::new(
            StatusCode::from_u16(code).unwrap(),
            HeaderMap::new(),
            "{}",
        ))
    }

    fn session(transport: Arc<ScriptedTransport>, sleeper: Arc<RecordingSleeper>) -> BlockingSession {
        BlockingSession::builder()
            .access_token("tok")
            .base_url("https://api.example.com/v1")
            .transport(transport)
            .sleeper(sleeper)
            .build()
            .unwrap()
    }

    #[test]
    fn test_exhausts_transient_budget() {
        let transport = ScriptedTransport::new(vec![status(500), status(502), status(503), status(200)]);
        let sleeper = Arc::new(RecordingSleeper::new());
        let session = session(transport.clone(), sleeper.clone());

        let err = session.get("people", &[]).unwrap_err();

        match &err {
            Error::Server(api) => {
                assert_eq!(api.status, 503);
                assert_eq!(api.attempts, 3);
            }
            other => panic!("Expected Server, got {other:?}"),
        }
        assert_eq!(transport.calls(), 3);
        assert_eq!(sleeper.recorded().len(), 2);
    }

    #[test]
    fn test_retry_after_is_honored() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("3"));
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::new(StatusCode::TOO_MANY_REQUESTS, headers, "")),
            status(200),
        ]);
        let sleeper = Arc::new(RecordingSleeper::new());
        let session = session(transport.clone(), sleeper.clone());

        let response = session.get("people", &[]).unwrap();

        assert_eq!(response.retries_taken(), 1);
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(3)]);
    }

    #[test]
    fn test_timeout_surfaces_as_transient_network() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
        ]);
        let session = session(transport.clone(), Arc::new(RecordingSleeper::new()));

        let err = session.delete("people/1").unwrap_err();
        assert!(matches!(
            err,
            Error::TransientNetwork {
                timed_out: true,
                attempts: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_execute_json_decodes() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::new(
            StatusCode::OK,
            HeaderMap::new(),
            r#"{"id":"p1"}"#,
        ))]);
        let session = session(transport, Arc::new(RecordingSleeper::new()));

        let value: serde_json::Value = session.execute_json(Request::get("people/p1")).unwrap();
        assert_eq!(value["id"], "p1");
    }
}
