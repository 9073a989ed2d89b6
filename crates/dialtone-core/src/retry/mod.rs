//! Backoff schedules.
//!
//! A schedule only answers "how long should the caller wait before retry `n`".
//! Whether to retry at all is decided by the caller, which knows how the
//! failure was classified.
//!
//! # Key Types
//!
//! - [`BackoffStrategy`] - Core trait for delay schedules
//! - [`ExponentialBackoff`] - Exponential backoff with jitter

mod exponential;
mod strategy;

pub use exponential::{ExponentialBackoff, ExponentialBackoffBuilder};
pub use strategy::BackoffStrategy;
