//! reqwest-backed transports
//!
//! [`HttpTransport`] wraps the async `reqwest::Client`, [`BlockingHttpTransport`]
//! wraps `reqwest::blocking::Client`. Both own a connection pool configured
//! from the same [`HttpTransportConfig`].

#[cfg(feature = "blocking")]
pub mod blocking;
pub mod client;

#[cfg(feature = "blocking")]
pub use blocking::BlockingHttpTransport;
pub use client::{HttpTransport, HttpTransportConfig};
