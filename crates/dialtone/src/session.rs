//! Async session: authenticated requests with bounded retries
//!
//! ```rust,no_run
//! use dialtone::Session;
//!
//! # async fn example() -> dialtone::Result<()> {
//! let session = Session::new("access-token")?;
//! let person = session.get("people/me", &[]).await?;
//! println!("{:?}", person.body());
//! # Ok(())
//! # }
//! ```

use dialtone_core::retry::BackoffStrategy;
use dialtone_core::sleep::{Sleeper, TokioSleeper};
use dialtone_transport::{HttpRequest, HttpResponse, HttpTransport, Transport};
use http::Method;
use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::Instrument;
use url::Url;

use crate::config::SessionConfig;
use crate::credentials::{CredentialProvider, StaticToken, TokenCache};
use crate::error::{Error, Result};
use crate::http::{ApiResponse, Body, Request};
use crate::observability::{RequestMetadata, ResponseMetadata, call_span};
use crate::retry::{Attempt, Classifier, RetryDecision, RetryState};

/// Configuration and policy shared by both session flavors.
#[derive(Debug)]
pub(crate) struct SessionShared {
    pub(crate) config: SessionConfig,
    pub(crate) base_url: Url,
    pub(crate) backoff: Arc<dyn BackoffStrategy>,
}

impl SessionShared {
    pub(crate) fn new(
        config: SessionConfig,
        backoff: Option<Arc<dyn BackoffStrategy>>,
    ) -> Result<Self> {
        let base_url = config.resolved_base_url()?;
        let backoff: Arc<dyn BackoffStrategy> = match backoff {
            Some(backoff) => backoff,
            None => Arc::new(config.retry.backoff()),
        };
        Ok(Self {
            config,
            base_url,
            backoff,
        })
    }

    pub(crate) fn retry_state(&self) -> RetryState<'_> {
        RetryState::new(&self.config.retry, self.backoff.as_ref())
    }

    pub(crate) fn classifier(&self) -> Classifier<'_> {
        Classifier {
            tracking_header: &self.config.tracking_id_header,
            auth_expired_codes: &self.config.auth_expired_codes,
        }
    }

    pub(crate) fn metadata(&self, request: &Request) -> Result<RequestMetadata> {
        let url = request.resolve_url(&self.base_url)?;
        Ok(RequestMetadata::new(request.method().as_str(), url.as_str())
            .with_body_size(request.body().map(Body::len)))
    }

    pub(crate) fn prepare(&self, request: &Request, token: &SecretString) -> Result<HttpRequest> {
        request.to_http(&self.base_url, &self.config.default_headers, token)
    }

    /// Turn the 2xx that ended a call into an [`ApiResponse`], logging the outcome.
    pub(crate) fn finish(
        &self,
        response: HttpResponse,
        state: &RetryState<'_>,
        meta: &RequestMetadata,
    ) -> Result<ApiResponse> {
        let status = response.status.as_u16();
        let outcome = ResponseMetadata::new(Some(status), state.elapsed())
            .with_retries(state.retries_taken())
            .with_tracking_id(response.header(&self.config.tracking_id_header));

        match ApiResponse::from_http(
            response,
            &self.config.tracking_id_header,
            state.retries_taken(),
            state.elapsed(),
        ) {
            Ok(api_response) => {
                outcome.log_success(meta);
                Ok(api_response)
            }
            Err(err) => {
                outcome.log_error(meta, &err.to_string());
                Err(err)
            }
        }
    }

    pub(crate) fn give_up(
        &self,
        error: Error,
        status: Option<u16>,
        state: &RetryState<'_>,
        meta: &RequestMetadata,
    ) -> Error {
        ResponseMetadata::new(status, state.elapsed())
            .with_retries(state.retries_taken())
            .with_tracking_id(error.tracking_id())
            .log_error(meta, &error.to_string());
        error
    }
}

/// Async HTTP session.
///
/// Cheap to clone; clones share the connection pool and the token cache.
///
/// # Example
///
/// ```rust,no_run
/// use dialtone::{PageConfig, Request, Session};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Person { id: String }
///
/// # async fn example() -> dialtone::Result<()> {
/// let session = Session::builder()
///     .access_token("access-token")
///     .build()?;
///
/// let people = session
///     .follow_pagination::<Person>(Request::get("people"), PageConfig::new("items"))
///     .await?
///     .collect_all()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    shared: SessionShared,
    transport: Arc<dyn Transport>,
    credentials: TokenCache,
    sleeper: Arc<dyn Sleeper>,
}

impl Session {
    /// Create a session with a fixed access token and default configuration.
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        Self::builder().access_token(access_token).build()
    }

    /// Create a new session builder for advanced configuration.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
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

    /// Forget the cached token so the next call asks the provider's
    /// `current_token` again. Use after rotating a token out of band.
    pub fn invalidate_token(&self) {
        self.inner.credentials.invalidate();
    }

    /// Execute a request with auth and retries.
    ///
    /// # Errors
    ///
    /// Returns the classified error of the last attempt once the retry policy
    /// gives up; see [`Error`].
    pub async fn execute(&self, request: Request) -> Result<ApiResponse> {
        self.execute_ref(&request).await
    }

    /// Execute a request and decode the body into `T`.
    pub async fn execute_json<T: DeserializeOwned>(&self, request: Request) -> Result<T> {
        self.execute(request).await?.json()
    }

    pub(crate) async fn execute_ref(&self, request: &Request) -> Result<ApiResponse> {
        let span = call_span(request.method().as_str(), request.target());
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: &Request) -> Result<ApiResponse> {
        let inner = &self.inner;
        let shared = &inner.shared;
        let classifier = shared.classifier();
        let meta = shared.metadata(request)?;
        let mut state = shared.retry_state();
        let mut token = inner.credentials.token().await?;

        loop {
            let http_request = shared.prepare(request, &token)?;
            let attempt = state.begin_attempt();
            meta.log_attempt(attempt);

            let outcome = inner.transport.send(http_request).await;

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
                    inner.sleeper.sleep(delay).await;
                }
                RetryDecision::RefreshAndRetry => {
                    meta.log_auth_refresh(attempt, error.tracking_id());
                    token = inner.credentials.refresh(&token).await?;
                }
                RetryDecision::GiveUp => {
                    return Err(shared.give_up(error, status, &state, &meta));
                }
            }
        }
    }

    /// `GET path` with query parameters. Repeat a key to send several values.
    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<ApiResponse> {
        let request = Request::builder(Method::GET, path)
            .query_pairs(query.iter().copied())
            .build();
        self.execute(request).await
    }

    /// `POST path` with a JSON body.
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        let request = Request::builder(Method::POST, path).json(body)?.build();
        self.execute(request).await
    }

    /// `PUT path` with a JSON body.
    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        let request = Request::builder(Method::PUT, path).json(body)?.build();
        self.execute(request).await
    }

    /// `PATCH path` with a JSON body.
    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        let request = Request::builder(Method::PATCH, path).json(body)?.build();
        self.execute(request).await
    }

    /// `DELETE path`.
    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.execute(Request::builder(Method::DELETE, path).build())
            .await
    }
}

/// Builder for [`Session`].
#[derive(Default)]
pub struct SessionBuilder {
    config: SessionConfig,
    credentials: Option<Arc<dyn CredentialProvider>>,
    transport: Option<Arc<dyn Transport>>,
    sleeper: Option<Arc<dyn Sleeper>>,
    backoff: Option<Arc<dyn BackoffStrategy>>,
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("config", &self.config)
            .field("custom_credentials", &self.credentials.is_some())
            .field("custom_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

impl SessionBuilder {
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
    pub fn credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Send requests through a custom transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sleep between retries through a custom sleeper.
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
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
    /// Returns an error if:
    /// - The base URL is invalid
    /// - Neither a credential provider nor an access token is available
    /// - The HTTP client cannot be built
    pub fn build(self) -> Result<Session> {
        let Self {
            config,
            credentials,
            transport,
            sleeper,
            backoff,
        } = self;

        let provider: Arc<dyn CredentialProvider> = match credentials {
            Some(provider) => provider,
            None => Arc::new(resolve_static_token(&config)?),
        };

        let transport: Arc<dyn Transport> = match transport {
            Some(transport) => transport,
            None => Arc::new(
                HttpTransport::with_config(config.transport_config())
                    .map_err(|e| Error::HttpClient(e.to_string()))?,
            ),
        };

        let shared = SessionShared::new(config, backoff)?;

        Ok(Session {
            inner: Arc::new(SessionInner {
                shared,
                transport,
                credentials: TokenCache::new(provider),
                sleeper: match sleeper {
                    Some(sleeper) => sleeper,
                    None => Arc::new(TokioSleeper),
                },
            }),
        })
    }
}

/// Static token from the config, falling back to `DIALTONE_ACCESS_TOKEN`.
pub(crate) fn resolve_static_token(config: &SessionConfig) -> Result<StaticToken> {
    if let Some(token) = &config.access_token {
        return Ok(StaticToken::from_secret(token));
    }

    #[cfg(feature = "env")]
    {
        if let Ok(token) = std::env::var("DIALTONE_ACCESS_TOKEN")
            && !token.trim().is_empty()
        {
            return Ok(StaticToken::new(token));
        }

        Err(Error::MissingConfig(
            "No access token or credential provider. Set DIALTONE_ACCESS_TOKEN or provide credentials explicitly.".to_string(),
        ))
    }

    #[cfg(not(feature = "env"))]
    Err(Error::MissingConfig(
        "No access token or credential provider".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dialtone_core::sleep::RecordingSleeper;
    use dialtone_transport::TransportError;
    use http::{HeaderMap, StatusCode};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned outcomes and records the requests it saw.
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<std::result::Result<HttpResponse, TransportError>>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<std::result::Result<HttpResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                seen: Mutex::default(),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            request: HttpRequest,
        ) -> std::result::Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
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
            if code == 204 { "" } else { "{}" },
        ))
    }

    fn session(transport: Arc<ScriptedTransport>, sleeper: Arc<RecordingSleeper>) -> Session {
        Session::builder()
            .access_token("tok")
            .base_url("https://api.example.com/v1")
            .transport(transport)
            .sleeper(sleeper)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Connection("reset".into())),
            status(503),
            status(200),
        ]);
        let sleeper = Arc::new(RecordingSleeper::new());
        let session = session(transport.clone(), sleeper.clone());

        let response = session.get("people", &[]).await.unwrap();

        assert_eq!(response.retries_taken(), 2);
        assert_eq!(transport.calls(), 3);
        assert_eq!(sleeper.recorded().len(), 2);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let transport = ScriptedTransport::new(vec![status(404)]);
        let sleeper = Arc::new(RecordingSleeper::new());
        let session = session(transport.clone(), sleeper.clone());

        let err = session.delete("people/1").await.unwrap_err();

        assert!(matches!(err, Error::Client(ref e) if e.status == 404));
        assert_eq!(err.attempts(), Some(1));
        assert_eq!(transport.calls(), 1);
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_unfollowed_redirect_is_server_fatal() {
        let transport = ScriptedTransport::new(vec![status(302)]);
        let session = session(transport.clone(), Arc::new(RecordingSleeper::new()));

        let err = session.get("people", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Server(ref e) if e.status == 302));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_content_response() {
        let transport = ScriptedTransport::new(vec![status(204)]);
        let session = session(transport, Arc::new(RecordingSleeper::new()));

        let response = session.delete("people/1").await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.body().is_none());
    }

    #[tokio::test]
    async fn test_request_carries_bearer_token_and_json_body() {
        let transport = ScriptedTransport::new(vec![status(200)]);
        let session = session(transport.clone(), Arc::new(RecordingSleeper::new()));

        session
            .post("items", &serde_json::json!({"name": "q"}))
            .await
            .unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].url, "https://api.example.com/v1/items");
        assert_eq!(seen[0].headers["authorization"], "Bearer tok");
        assert_eq!(seen[0].headers["content-type"], "application/json");
    }

    #[test]
    fn test_build_without_credentials_fails() {
        temp_env::with_var_unset("DIALTONE_ACCESS_TOKEN", || {
            let result = Session::builder().build();
            assert!(matches!(result, Err(Error::MissingConfig(_))));
        });
    }

    #[test]
    fn test_build_rejects_bad_base_url() {
        let result = Session::builder()
            .access_token("tok")
            .base_url("ftp://example.com")
            .build();
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_session_is_send_sync_clone() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<Session>();
    }

    #[tokio::test]
    async fn test_elapsed_is_reported() {
        let transport = ScriptedTransport::new(vec![status(200)]);
        let session = session(transport, Arc::new(RecordingSleeper::new()));
        let response = session.get("people", &[("max", "1")]).await.unwrap();
        assert!(response.elapsed() < Duration::from_secs(5));
        assert_eq!(response.retries_taken(), 0);
    }
}
