//! # Dialtone
//!
//! HTTP session core for a cloud telephony REST SDK:
//! - Bearer-token authentication with single-flight token refresh
//! - Bounded retries with exponential backoff and `Retry-After` support
//! - Failure classification (transient, rate limited, auth expired, client, fatal)
//! - Lazy traversal of cursor-linked paginated collections
//! - Async [`Session`] and, behind the `blocking` feature, [`BlockingSession`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dialtone::{PageConfig, Request, Session};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Person {
//!     id: String,
//!     #[serde(rename = "displayName")]
//!     display_name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::new("your-access-token")?;
//!
//!     let me: Person = session.execute_json(Request::get("people/me")).await?;
//!     println!("{}", me.display_name);
//!
//!     let mut people = session
//!         .follow_pagination::<Person>(
//!             Request::builder(dialtone::http::Method::GET, "people").query("max", 100).build(),
//!             PageConfig::new("items"),
//!         )
//!         .await?;
//!     while let Some(person) = people.next().await {
//!         println!("{}", person?.id);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Re-export commonly used types
pub use config::{ConnectionPoolConfig, RetryConfig, SessionConfig, SessionConfigBuilder};
pub use credentials::{
    BlockingCredentialProvider, BlockingTokenCache, CredentialProvider, StaticToken, TokenCache,
};
pub use error::{ApiError, Error, ErrorClassification, Result, parse_retry_after};
pub use http::{ApiResponse, Body, Request, RequestBuilder};
pub use pagination::{CursorLocation, PageConfig, PageState, Pages, parse_link_next};
pub use retry::{RetryDecision, RetryState};
pub use session::{Session, SessionBuilder};

#[cfg(feature = "blocking")]
pub use blocking::{BlockingSession, BlockingSessionBuilder};
#[cfg(feature = "blocking")]
pub use pagination::BlockingPages;

// Module declarations
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod observability;
pub mod pagination;
pub mod retry;
pub mod session;

#[cfg(feature = "blocking")]
#[cfg_attr(docsrs, doc(cfg(feature = "blocking")))]
pub mod blocking;

// Re-export key dependencies for convenience
pub use async_trait::async_trait;
pub use secrecy::SecretString;
pub use serde::{Deserialize, Serialize};
pub use serde_json::Value as JsonValue;

/// Prelude module for common imports
///
/// # Examples
///
/// ```rust
/// use dialtone::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ApiResponse, Error, PageConfig, Pages, Request, Result, Session, SessionConfig,
    };

    #[cfg(feature = "blocking")]
    pub use crate::{BlockingPages, BlockingSession};
}

/// SDK version, automatically updated from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://webexapis.com/v1/";

/// Response header carrying the server-assigned tracking id
pub const DEFAULT_TRACKING_ID_HEADER: &str = "trackingid";


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_BASE_URL, "https://webexapis.com/v1/");
        assert_eq!(DEFAULT_TRACKING_ID_HEADER, "trackingid");
        assert!(::http::HeaderName::from_static(DEFAULT_TRACKING_ID_HEADER) == "trackingid");
    }
}
