//! Exponential backoff with jitter.

use super::strategy::BackoffStrategy;
use std::time::Duration;

/// Exponential backoff schedule with configurable jitter.
///
/// Delays between retries increase exponentially: `initial_delay * multiplier^retry`,
/// capped at `max_delay`. Jitter is added to prevent synchronized retry storms.
///
/// # Mathematical Formula
///
/// For retry `n` (0-indexed after the first failure):
/// ```text
/// base_delay   = min(initial_delay * (multiplier ^ n), max_delay)
/// jitter_range = base_delay * jitter
/// final_delay  = clamp(base_delay + random(-jitter_range, +jitter_range), 0, max_delay)
/// ```
///
/// # Examples
///
/// ```rust
/// use dialtone_core::retry::{BackoffStrategy, ExponentialBackoff};
/// use std::time::Duration;
///
/// // Default configuration (initial=500ms, max=30s, multiplier=2.0, jitter=0.1)
/// let backoff = ExponentialBackoff::default();
/// let first = backoff.delay_for(0);
/// assert!(first >= Duration::from_millis(450) && first <= Duration::from_millis(550));
///
/// // Custom configuration
/// let backoff = ExponentialBackoff::builder()
///     .initial_delay(Duration::from_millis(100))
///     .max_delay(Duration::from_secs(5))
///     .multiplier(3.0)
///     .jitter(0.0)
///     .build();
/// assert_eq!(backoff.delay_for(2), Duration::from_millis(900));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: f64,
}

impl ExponentialBackoff {
    /// Create a new builder for configuring exponential backoff.
    pub fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder::default()
    }

    /// Delay before the first retry.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Upper bound of any single delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Growth factor between consecutive delays.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Jitter fraction in `[0.0, 1.0]`.
    pub fn jitter(&self) -> f64 {
        self.jitter
    }
}

impl Default for ExponentialBackoff {
    /// Defaults:
    /// - `initial_delay`: 500ms
    /// - `max_delay`: 30s
    /// - `multiplier`: 2.0 (doubles each time)
    /// - `jitter`: 0.1 (±10% randomization)
    fn default() -> Self {
        ExponentialBackoffBuilder::default().build()
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn delay_for(&self, retry: u32) -> Duration {
        let max = self.max_delay.as_secs_f64();
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);

        // powi may overflow to infinity; min() folds that back onto the cap.
        let base = (self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent)).min(max);

        let jittered = if self.jitter > 0.0 {
            let jitter_amount = base * self.jitter * (rand::random::<f64>() - 0.5) * 2.0;
            base + jitter_amount
        } else {
            base
        };

        Duration::from_secs_f64(jittered.clamp(0.0, max))
    }
}

/// Builder for configuring [`ExponentialBackoff`].
///
/// # Examples
///
/// ```rust
/// use dialtone_core::retry::ExponentialBackoff;
/// use std::time::Duration;
///
/// let backoff = ExponentialBackoff::builder()
///     .initial_delay(Duration::from_millis(100))
///     .max_delay(Duration::from_secs(30))
///     .multiplier(2.0)
///     .jitter(0.1)
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct ExponentialBackoffBuilder {
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<f64>,
}

impl ExponentialBackoffBuilder {
    /// Set the delay before the first retry.
    ///
    /// Default: 500ms
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set the maximum delay between retries.
    ///
    /// Default: 30s
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set the exponential multiplier. Values below 1.0 are raised to 1.0.
    ///
    /// Default: 2.0
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier.max(1.0));
        self
    }

    /// Set the jitter factor (0.0 to 1.0).
    ///
    /// A jitter of 0.1 means the delay can vary by ±10%.
    ///
    /// Default: 0.1
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter.clamp(0.0, 1.0));
        self
    }

    /// Build the [`ExponentialBackoff`] instance, using defaults for unset parameters.
    pub fn build(self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_delay: self.initial_delay.unwrap_or(Duration::from_millis(500)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(30)),
            multiplier: self.multiplier.unwrap_or(2.0),
            jitter: self.jitter.unwrap_or(0.1),
        }
    }
}
