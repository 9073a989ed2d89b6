//! Sleeping between retries.
//!
//! Retry loops never call `tokio::time::sleep` or `std::thread::sleep`
//! directly. They go through one of these traits so a test can substitute a
//! [`RecordingSleeper`] and assert on the exact delays that were requested.

use async_trait::async_trait;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Suspends the current task for a duration (async flavor).
#[async_trait]
pub trait Sleeper: Send + Sync + fmt::Debug {
    /// Suspend for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Blocks the current thread for a duration (blocking flavor).
pub trait BlockingSleeper: Send + Sync + fmt::Debug {
    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// [`BlockingSleeper`] backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl BlockingSleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A fake clock: records every requested delay and returns immediately.
///
/// Implements both [`Sleeper`] and [`BlockingSleeper`].
///
/// # Examples
///
/// ```rust
/// use dialtone_core::sleep::{BlockingSleeper, RecordingSleeper};
/// use std::time::Duration;
///
/// let sleeper = RecordingSleeper::new();
/// sleeper.sleep(Duration::from_secs(3));
/// assert_eq!(sleeper.recorded(), vec![Duration::from_secs(3)]);
/// assert_eq!(sleeper.total(), Duration::from_secs(3));
/// ```
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, in order.
    pub fn recorded(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sum of all requested delays.
    pub fn total(&self) -> Duration {
        self.recorded().iter().sum()
    }

    fn record(&self, duration: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.record(duration);
    }
}

impl BlockingSleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.record(duration);
    }
}
