//! Common test utilities and helpers

use async_trait::async_trait;
use dialtone::{CredentialProvider, RetryConfig, SecretString, Session, SessionConfig};
use dialtone_core::sleep::RecordingSleeper;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Load a response fixture
#[allow(dead_code)]
pub fn load_response_fixture(name: &str) -> String {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let path = Path::new(manifest_dir)
        .join("tests")
        .join("fixtures")
        .join("responses")
        .join(format!("{}.json", name));

    std::fs::read_to_string(&path).unwrap_or_else(|e| {
        panic!(
            "Failed to load response fixture '{}' from {:?}: {}",
            name, path, e
        )
    })
}

/// Create a test access token
#[allow(dead_code)]
pub fn test_token() -> String {
    "test-access-token-0123456789".to_string()
}

/// Retry policy with the defaults' limits
#[allow(dead_code)]
pub fn test_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        max_rate_limit_retries: 5,
        ..RetryConfig::default()
    }
}

/// Session against a mock server; sleeps are recorded instead of taken.
#[allow(dead_code)]
pub fn session_for(uri: &str, sleeper: Arc<RecordingSleeper>) -> Session {
    Session::builder()
        .config(
            SessionConfig::builder()
                .base_url(uri)
                .access_token(test_token())
                .retry(test_retry())
                .build(),
        )
        .sleeper(sleeper)
        .build()
        .expect("Failed to build session")
}

/// Credential provider that hands out `stale` until refreshed, then `fresh`,
/// counting refreshes.
#[derive(Debug, Default)]
#[allow(dead_code)]
pub struct CountingProvider {
    refreshes: AtomicUsize,
}

#[allow(dead_code)]
impl CountingProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for CountingProvider {
    async fn current_token(&self) -> anyhow::Result<SecretString> {
        Ok(SecretString::new("stale".into()))
    }

    async fn refresh(&self) -> anyhow::Result<SecretString> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        // Give a concurrent caller the chance to pile up behind this refresh.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        Ok(SecretString::new("fresh".into()))
    }
}

/// Session over `provider` against a mock server.
#[allow(dead_code)]
pub fn session_with_provider(uri: &str, provider: Arc<CountingProvider>) -> Session {
    Session::builder()
        .config(
            SessionConfig::builder()
                .base_url(uri)
                .retry(test_retry())
                .build(),
        )
        .credentials(provider)
        .sleeper(Arc::new(RecordingSleeper::new()))
        .build()
        .expect("Failed to build session")
}
