//! Bearer-token credentials
//!
//! The session never talks to an identity service itself. It asks a
//! [`CredentialProvider`] for the current token and, when the API says the
//! token has expired, asks it to refresh. Both calls go through a token cache
//! so that concurrent calls hitting a 401 at the same time trigger a single
//! refresh.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::error::{Error, Result};

/// Supplies and refreshes the bearer token (async flavor).
///
/// Implementations typically wrap an OAuth client. Errors are plain
/// [`anyhow::Error`]s; the session reports them as [`Error::Credentials`].
#[async_trait]
pub trait CredentialProvider: Send + Sync + fmt::Debug {
    /// The token to use right now.
    ///
    /// The session reads this once and caches the result. After that the
    /// cached token is used until the API rejects it (then [`refresh`] is
    /// called) or [`TokenCache::invalidate`] is called, so a provider that
    /// rotates tokens on its own schedule must also invalidate the cache.
    ///
    /// [`refresh`]: CredentialProvider::refresh
    async fn current_token(&self) -> anyhow::Result<SecretString>;

    /// Obtain a new token after the current one was rejected.
    async fn refresh(&self) -> anyhow::Result<SecretString>;
}

/// Supplies and refreshes the bearer token (blocking flavor).
pub trait BlockingCredentialProvider: Send + Sync + fmt::Debug {
    /// The token to use right now. Read once and cached, as for
    /// [`CredentialProvider::current_token`].
    fn current_token(&self) -> anyhow::Result<SecretString>;

    /// Obtain a new token after the current one was rejected.
    fn refresh(&self) -> anyhow::Result<SecretString>;
}

/// A fixed token that cannot be refreshed.
///
/// `refresh` hands back the same token, so a rejected static token fails the
/// call with [`Error::AuthExpired`] after one retry.
#[derive(Debug)]
pub struct StaticToken {
    token: SecretString,
}

impl StaticToken {
    /// Wrap a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::new(token.into().into_boxed_str()),
        }
    }

    /// Wrap an already-secret token.
    pub fn from_secret(token: &SecretString) -> Self {
        Self {
            token: clone_secret(token),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn current_token(&self) -> anyhow::Result<SecretString> {
        Ok(clone_secret(&self.token))
    }

    async fn refresh(&self) -> anyhow::Result<SecretString> {
        Ok(clone_secret(&self.token))
    }
}

impl BlockingCredentialProvider for StaticToken {
    fn current_token(&self) -> anyhow::Result<SecretString> {
        Ok(clone_secret(&self.token))
    }

    fn refresh(&self) -> anyhow::Result<SecretString> {
        Ok(clone_secret(&self.token))
    }
}

pub(crate) fn clone_secret(secret: &SecretString) -> SecretString {
    SecretString::new(secret.expose_secret().into())
}

fn same_secret(a: &SecretString, b: &SecretString) -> bool {
    a.expose_secret() == b.expose_secret()
}

/// Caches the current token and collapses concurrent refreshes into one.
#[derive(Debug)]
pub struct TokenCache {
    provider: Arc<dyn CredentialProvider>,
    current: RwLock<Option<SecretString>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl TokenCache {
    /// Create an empty cache in front of `provider`.
    pub fn new(provider: Arc<dyn CredentialProvider>) -> Self {
        Self {
            provider,
            current: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn cached(&self) -> Option<SecretString> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(clone_secret)
    }

    fn store(&self, token: &SecretString) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(clone_secret(token));
    }

    /// Drop the cached token; the next [`token`](Self::token) asks the
    /// provider's `current_token` again.
    pub fn invalidate(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The cached token, asking the provider on first use.
    pub async fn token(&self) -> Result<SecretString> {
        if let Some(token) = self.cached() {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(token) = self.cached() {
            return Ok(token);
        }

        let token = self
            .provider
            .current_token()
            .await
            .map_err(Error::Credentials)?;
        self.store(&token);
        Ok(token)
    }

    /// Replace `stale` with a fresh token.
    ///
    /// If another call already replaced `stale` while this one waited for the
    /// lock, the provider is not asked again and the newer token is returned.
    pub async fn refresh(&self, stale: &SecretString) -> Result<SecretString> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(token) = self.cached()
            && !same_secret(&token, stale)
        {
            tracing::debug!("token already refreshed by a concurrent call");
            return Ok(token);
        }

        tracing::debug!("refreshing access token");
        let token = self.provider.refresh().await.map_err(Error::Credentials)?;
        self.store(&token);
        Ok(token)
    }
}

/// Blocking counterpart of [`TokenCache`].
#[derive(Debug)]
pub struct BlockingTokenCache {
    provider: Arc<dyn BlockingCredentialProvider>,
    current: RwLock<Option<SecretString>>,
    refresh_lock: Mutex<()>,
}

impl BlockingTokenCache {
    /// Create an empty cache in front of `provider`.
    pub fn new(provider: Arc<dyn BlockingCredentialProvider>) -> Self {
        Self {
            provider,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    fn cached(&self) -> Option<SecretString> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(clone_secret)
    }

    fn store(&self, token: &SecretString) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(clone_secret(token));
    }

    /// Drop the cached token; the next [`token`](Self::token) asks the
    /// provider's `current_token` again.
    pub fn invalidate(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The cached token, asking the provider on first use.
    pub fn token(&self) -> Result<SecretString> {
        if let Some(token) = self.cached() {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = self.cached() {
            return Ok(token);
        }

        let token = self.provider.current_token().map_err(Error::Credentials)?;
        self.store(&token);
        Ok(token)
    }

    /// Replace `stale` with a fresh token; see [`TokenCache::refresh`].
    pub fn refresh(&self, stale: &SecretString) -> Result<SecretString> {
        let _guard = self.refresh_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(token) = self.cached()
            && !same_secret(&token, stale)
        {
            tracing::debug!("token already refreshed by a concurrent call");
            return Ok(token);
        }

        tracing::debug!("refreshing access token");
        let token = self.provider.refresh().map_err(Error::Credentials)?;
        self.store(&token);
        Ok(token)
    }
}
