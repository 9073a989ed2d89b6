//! Configuration for the dialtone session

use dialtone_core::retry::ExponentialBackoff;
use dialtone_transport::HttpTransportConfig;
use http::HeaderMap;
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

/// Configuration for a [`Session`](crate::Session) or
/// [`BlockingSession`](crate::BlockingSession).
///
/// Plain data: build it with [`SessionConfigBuilder`], load it with
/// [`SessionConfig::from_env`], or layer two of them with [`SessionConfig::merge`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL that relative request paths are resolved against
    pub base_url: Option<String>,

    /// Bearer token used when no credential provider is supplied
    pub access_token: Option<SecretString>,

    /// Default timeout for a single request
    pub timeout: Duration,

    /// Timeout for establishing a connection
    pub connect_timeout: Duration,

    /// Retry policy
    pub retry: RetryConfig,

    /// Custom headers to include with every request
    pub default_headers: HeaderMap,

    /// `User-Agent` header value
    pub user_agent: String,

    /// Response header carrying the server tracking id
    pub tracking_id_header: String,

    /// 4xx body error codes that mean the access token has expired
    pub auth_expired_codes: Vec<String>,

    /// Connection pool configuration
    pub connection_pool: ConnectionPoolConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            access_token: None,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
            default_headers: HeaderMap::new(),
            user_agent: format!("dialtone-rust/{}", crate::VERSION),
            tracking_id_header: crate::DEFAULT_TRACKING_ID_HEADER.to_string(),
            auth_expired_codes: vec!["token_expired".to_string()],
            connection_pool: ConnectionPoolConfig::default(),
        }
    }
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

impl SessionConfig {
    /// Create a new configuration with an access token.
    pub fn with_access_token(token: impl Into<String>) -> Self {
        Self {
            access_token: Some(SecretString::new(token.into().into_boxed_str())),
            ..Default::default()
        }
    }

    /// Create a builder.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    /// Recognized variables:
    /// - `DIALTONE_BASE_URL`
    /// - `DIALTONE_ACCESS_TOKEN`
    /// - `DIALTONE_TIMEOUT` (seconds)
    /// - `DIALTONE_MAX_ATTEMPTS`
    /// - `DIALTONE_MAX_RATE_LIMIT_RETRIES`
    ///
    /// Unparseable numbers are ignored and the default is kept.
    #[cfg(feature = "env")]
    pub fn from_env() -> Result<Self> {
        use std::env;

        let _ = dotenvy::dotenv();

        let mut config = Self::default();

        if let Ok(base_url) = env::var("DIALTONE_BASE_URL") {
            config.base_url = Some(base_url);
        }

        if let Ok(token) = env::var("DIALTONE_ACCESS_TOKEN") {
            config.access_token = Some(SecretString::new(token.into_boxed_str()));
        }

        if let Ok(timeout_str) = env::var("DIALTONE_TIMEOUT")
            && let Ok(timeout_secs) = timeout_str.parse::<u64>()
        {
            config.timeout = Duration::from_secs(timeout_secs);
        }

        if let Ok(attempts_str) = env::var("DIALTONE_MAX_ATTEMPTS")
            && let Ok(max_attempts) = attempts_str.parse::<u32>()
        {
            config.retry.max_attempts = max_attempts.max(1);
        }

        if let Ok(retries_str) = env::var("DIALTONE_MAX_RATE_LIMIT_RETRIES")
            && let Ok(retries) = retries_str.parse::<u32>()
        {
            config.retry.max_rate_limit_retries = retries;
        }

        Ok(config)
    }

    /// Merge this configuration with another, with the other taking precedence
    /// wherever it differs from the defaults.
    pub fn merge(mut self, other: SessionConfig) -> Self {
        let defaults = SessionConfig::default();

        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.access_token.is_some() {
            self.access_token = other.access_token;
        }
        if other.timeout != defaults.timeout {
            self.timeout = other.timeout;
        }
        if other.connect_timeout != defaults.connect_timeout {
            self.connect_timeout = other.connect_timeout;
        }
        if other.retry != defaults.retry {
            self.retry = other.retry;
        }
        for (key, value) in other.default_headers.iter() {
            self.default_headers.insert(key.clone(), value.clone());
        }
        if other.user_agent != defaults.user_agent {
            self.user_agent = other.user_agent;
        }
        if other.tracking_id_header != defaults.tracking_id_header {
            self.tracking_id_header = other.tracking_id_header;
        }
        if other.auth_expired_codes != defaults.auth_expired_codes {
            self.auth_expired_codes = other.auth_expired_codes;
        }
        if other.connection_pool != defaults.connection_pool {
            self.connection_pool = other.connection_pool;
        }

        self
    }

    /// Resolve and validate the base URL.
    ///
    /// The result always ends in `/` so that relative paths join below it
    /// instead of replacing its last segment.
    pub fn resolved_base_url(&self) -> Result<Url> {
        let raw = self.base_url.as_deref().unwrap_or(crate::DEFAULT_BASE_URL);

        if raw.trim().is_empty() {
            return Err(Error::InvalidUrl("Base URL cannot be empty".to_string()));
        }

        let mut url: Url = raw
            .trim()
            .parse()
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", raw, e)))?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(Error::InvalidUrl(format!(
                    "Invalid URL scheme '{}'. Only 'http' and 'https' are supported.",
                    scheme
                )));
            }
        }

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(url)
    }

    /// Transport settings derived from this configuration.
    pub(crate) fn transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            pool_max_idle_per_host: self.connection_pool.max_idle_per_host,
            pool_idle_timeout: self.connection_pool.idle_timeout,
            tcp_keepalive: self.connection_pool.tcp_keepalive,
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Retry policy shared by both session flavors.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts allowed for transient failures (network, 5xx), first one included
    pub max_attempts: u32,

    /// Retries allowed for 429 responses; these do not count against `max_attempts`
    pub max_rate_limit_retries: u32,

    /// Delay before the first transient retry
    pub initial_delay: Duration,

    /// Upper bound on any computed backoff delay
    pub max_delay: Duration,

    /// Backoff growth factor
    pub multiplier: f64,

    /// Jitter as a fraction of the delay (0.1 = ±10%)
    pub jitter: f64,

    /// Longest `Retry-After` that will be honored; anything longer fails the call
    pub max_retry_after: Duration,

    /// Wall-clock budget for the whole logical call, retries included
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_rate_limit_retries: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
            max_retry_after: Duration::from_secs(300),
            max_elapsed: None,
        }
    }
}

impl RetryConfig {
    /// No retries of any kind.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            max_rate_limit_retries: 0,
            ..Default::default()
        }
    }

    /// Backoff schedule described by this policy.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::builder()
            .initial_delay(self.initial_delay)
            .max_delay(self.max_delay)
            .multiplier(self.multiplier)
            .jitter(self.jitter)
            .build()
    }
}

/// Configuration for HTTP connection pooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionPoolConfig {
    /// Maximum number of idle connections per host
    pub max_idle_per_host: usize,

    /// Idle connection timeout
    pub idle_timeout: Duration,

    /// TCP keep-alive interval
    pub tcp_keepalive: Option<Duration>,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 10,
            idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Some(Duration::from_secs(60)),
        }
    }
}

/// Builder for creating SessionConfig with a fluent API.
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = Some(base_url.into());
        self
    }

    /// Set the access token.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config.access_token = Some(SecretString::new(token.into().into_boxed_str()));
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the whole retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the total attempts allowed for transient failures.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.retry.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the rate-limit retry ceiling.
    pub fn max_rate_limit_retries(mut self, retries: u32) -> Self {
        self.config.retry.max_rate_limit_retries = retries;
        self
    }

    /// Set the wall-clock budget for one logical call.
    pub fn max_elapsed(mut self, budget: Duration) -> Self {
        self.config.retry.max_elapsed = Some(budget);
        self
    }

    /// Add a default header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid according to HTTP specifications.
    pub fn default_header(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self> {
        let key_str = key.into();
        let value_str = value.into();

        let key: http::HeaderName = key_str
            .parse()
            .map_err(|_| Error::InvalidHeaderName(key_str.clone()))?;
        let value: http::HeaderValue = value_str
            .parse()
            .map_err(|_| Error::InvalidHeaderValue(value_str.clone()))?;

        self.config.default_headers.insert(key, value);
        Ok(self)
    }

    /// Set the `User-Agent` header value.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the response header that carries the tracking id.
    pub fn tracking_id_header(mut self, name: impl Into<String>) -> Self {
        self.config.tracking_id_header = name.into();
        self
    }

    /// Set the body error codes treated as an expired token.
    pub fn auth_expired_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.auth_expired_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    /// Set connection pool configuration.
    pub fn connection_pool(mut self, config: ConnectionPoolConfig) -> Self {
        self.config.connection_pool = config;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> SessionConfig {
        self.config
    }
}
