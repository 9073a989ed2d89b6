//! Transport abstraction layer for dialtone
//!
//! Provides a trait-based transport abstraction that the session core sends
//! every physical HTTP request through. The session decides *what* to send and
//! whether to retry; a transport only moves one request over the wire.
//!
//! # Architecture
//!
//! - **Transport trait**: async interface, implemented by [`HttpTransport`]
//! - **BlockingTransport trait**: blocking interface, implemented by
//!   `BlockingHttpTransport` (feature `blocking`)
//! - **Error handling**: [`TransportError`] distinguishes timeouts and
//!   connection failures from everything else, so callers can classify them

#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! # Usage
//!
//! ```ignore
//! use dialtone_transport::{HttpRequest, HttpTransport, Transport};
//! use http::Method;
//!
//! let transport = HttpTransport::new()?;
//! let request = HttpRequest::new(Method::GET, "https://webexapis.com/v1/people/me")
//!     .with_header("authorization", "Bearer token")?;
//! let response = transport.send(request).await?;
//! ```

pub mod error;
pub mod http;
pub mod traits;

// Re-export commonly used types
pub use crate::error::{Result, TransportError};
#[cfg(feature = "blocking")]
pub use crate::http::BlockingHttpTransport;
pub use crate::http::{HttpTransport, HttpTransportConfig};
pub use crate::traits::{BlockingTransport, HttpRequest, HttpResponse, Transport};
