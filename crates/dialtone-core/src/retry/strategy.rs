//! The delay schedule trait.

use std::fmt;
use std::time::Duration;

/// A schedule of delays between retry attempts.
///
/// Implementations determine how long to wait before each retry. They do not
/// decide when to give up; attempt ceilings belong to the retry loop that
/// drives the schedule.
///
/// # Examples
///
/// ```rust
/// use dialtone_core::retry::BackoffStrategy;
/// use std::time::Duration;
///
/// #[derive(Debug)]
/// struct Constant(Duration);
///
/// impl BackoffStrategy for Constant {
///     fn delay_for(&self, _retry: u32) -> Duration {
///         self.0
///     }
/// }
///
/// let schedule = Constant(Duration::from_millis(250));
/// assert_eq!(schedule.delay_for(7), Duration::from_millis(250));
/// ```
pub trait BackoffStrategy: Send + Sync + fmt::Debug {
    /// Delay before retry number `retry`.
    ///
    /// `retry` is 0-indexed: `delay_for(0)` is the wait between the first
    /// failed attempt and the second attempt.
    fn delay_for(&self, retry: u32) -> Duration;
}
