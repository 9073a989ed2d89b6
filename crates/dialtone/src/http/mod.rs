//! Request and response types seen by callers
//!
//! A [`Request`] describes one logical call; the session turns it into one or
//! more wire-level requests and hands back an [`ApiResponse`].

pub use request::{Body, Request, RequestBuilder};
pub use response::ApiResponse;

mod request;
mod response;

// Re-export HTTP types from the http crate for convenience
pub use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
