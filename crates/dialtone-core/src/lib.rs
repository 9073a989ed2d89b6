#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Core retry primitives for the dialtone session crates.
//!
//! This crate holds the pieces of the retry machinery that know nothing about
//! HTTP:
//!
//! - **Backoff schedules** via the [`BackoffStrategy`](retry::BackoffStrategy) trait
//!   - Exponential backoff with jitter ([`ExponentialBackoff`](retry::ExponentialBackoff))
//! - **Sleeping** via [`Sleeper`](sleep::Sleeper) (async) and
//!   [`BlockingSleeper`](sleep::BlockingSleeper) (blocking), so that retry
//!   loops can be driven by a fake clock in tests
//!
//! # Examples
//!
//! ```rust
//! use dialtone_core::prelude::*;
//! use std::time::Duration;
//!
//! let backoff = ExponentialBackoff::builder()
//!     .initial_delay(Duration::from_millis(500))
//!     .max_delay(Duration::from_secs(30))
//!     .jitter(0.0)
//!     .build();
//!
//! assert_eq!(backoff.delay_for(0), Duration::from_millis(500));
//! assert_eq!(backoff.delay_for(1), Duration::from_secs(1));
//! ```

pub mod retry;
pub mod sleep;

/// Convenient re-exports of commonly used items.
///
/// ```rust
/// use dialtone_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::retry::{BackoffStrategy, ExponentialBackoff, ExponentialBackoffBuilder};
    pub use crate::sleep::{BlockingSleeper, RecordingSleeper, Sleeper, ThreadSleeper, TokioSleeper};
}
