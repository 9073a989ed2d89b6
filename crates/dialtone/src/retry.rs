//! Retry bookkeeping for one logical call
//!
//! [`RetryState`] is the single place where the retry policy is decided. The
//! async and blocking sessions both feed it the classification of every
//! failed attempt and do whatever [`RetryDecision`] it returns: sleep, refresh
//! the token, or give up.

use dialtone_core::retry::BackoffStrategy;
use dialtone_transport::{HttpResponse, TransportError};
use std::time::{Duration, Instant};

use crate::config::RetryConfig;
use crate::error::{ApiError, Error, ErrorClassification, parse_retry_after};

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the duration, then resend.
    RetryAfter(Duration),
    /// Refresh the access token, then resend immediately.
    RefreshAndRetry,
    /// Surface the error.
    GiveUp,
}

/// Counters for one logical call. Created when the call starts, dropped when
/// it ends.
#[derive(Debug)]
pub struct RetryState<'a> {
    policy: &'a RetryConfig,
    backoff: &'a dyn BackoffStrategy,
    attempts: u32,
    transient_failures: u32,
    rate_limit_retries: u32,
    auth_refreshed: bool,
    started: Instant,
    last_classification: Option<ErrorClassification>,
}

impl<'a> RetryState<'a> {
    /// Fresh state for a new call.
    pub fn new(policy: &'a RetryConfig, backoff: &'a dyn BackoffStrategy) -> Self {
        Self {
            policy,
            backoff,
            attempts: 0,
            transient_failures: 0,
            rate_limit_retries: 0,
            auth_refreshed: false,
            started: Instant::now(),
            last_classification: None,
        }
    }

    /// Record that a request is about to be sent; returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Requests issued so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Requests issued beyond the first.
    pub fn retries_taken(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    /// Attempts that ended in a network failure or 5xx.
    pub fn transient_failures(&self) -> u32 {
        self.transient_failures
    }

    /// 429 retries spent.
    pub fn rate_limit_retries(&self) -> u32 {
        self.rate_limit_retries
    }

    /// Whether the one token refresh of this call has been used.
    pub fn auth_refreshed(&self) -> bool {
        self.auth_refreshed
    }

    /// Time since the call started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Classification of the most recent failure.
    pub fn last_classification(&self) -> Option<ErrorClassification> {
        self.last_classification
    }

    /// Decide what follows a failed attempt.
    ///
    /// `retry_after` is the server-requested delay of a 429, if it sent one.
    pub fn decide(
        &mut self,
        classification: ErrorClassification,
        retry_after: Option<Duration>,
    ) -> RetryDecision {
        self.last_classification = Some(classification);

        let delay = match classification {
            ErrorClassification::RetryableTransient => {
                self.transient_failures += 1;
                if self.transient_failures >= self.policy.max_attempts {
                    return RetryDecision::GiveUp;
                }
                self.backoff.delay_for(self.transient_failures - 1)
            }
            ErrorClassification::RetryableRateLimited => {
                if self.rate_limit_retries >= self.policy.max_rate_limit_retries {
                    return RetryDecision::GiveUp;
                }
                let delay = match retry_after {
                    Some(requested) if requested > self.policy.max_retry_after => {
                        return RetryDecision::GiveUp;
                    }
                    Some(requested) => requested,
                    None => self.backoff.delay_for(self.rate_limit_retries),
                };
                self.rate_limit_retries += 1;
                delay
            }
            ErrorClassification::AuthExpired => {
                if self.auth_refreshed {
                    return RetryDecision::GiveUp;
                }
                self.auth_refreshed = true;
                return RetryDecision::RefreshAndRetry;
            }
            ErrorClassification::ClientError | ErrorClassification::ServerFatal => {
                return RetryDecision::GiveUp;
            }
        };

        if let Some(budget) = self.policy.max_elapsed
            && self.elapsed() + delay > budget
        {
            return RetryDecision::GiveUp;
        }

        RetryDecision::RetryAfter(delay)
    }
}

/// Result of one wire attempt, already classified.
#[derive(Debug)]
pub(crate) enum Attempt {
    /// 2xx
    Success(HttpResponse),
    /// Anything else, with the error to surface if the call gives up here.
    Failure {
        classification: ErrorClassification,
        error: Error,
        status: Option<u16>,
        retry_after: Option<Duration>,
    },
}

/// Response-interpretation settings taken from the session config.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Classifier<'a> {
    pub tracking_header: &'a str,
    pub auth_expired_codes: &'a [String],
}

impl Classifier<'_> {
    /// Classify the outcome of attempt number `attempts`.
    pub fn evaluate(
        &self,
        outcome: std::result::Result<HttpResponse, TransportError>,
        attempts: u32,
    ) -> Attempt {
        let response = match outcome {
            Ok(response) if response.is_success() => return Attempt::Success(response),
            Ok(response) => response,
            Err(err) => {
                return Attempt::Failure {
                    classification: ErrorClassification::from_transport(&err),
                    error: Error::from_transport(err, attempts),
                    status: None,
                    retry_after: None,
                };
            }
        };

        let status = response.status.as_u16();
        let api_error = ApiError::from_response(&response, self.tracking_header, attempts);
        let classification = ErrorClassification::from_status(
            status,
            api_error.code.as_deref(),
            self.auth_expired_codes,
        );
        let retry_after = if classification == ErrorClassification::RetryableRateLimited {
            parse_retry_after(&response.headers, chrono::Utc::now())
        } else {
            None
        };

        Attempt::Failure {
            classification,
            error: Error::from_api(classification, api_error, retry_after),
            status: Some(status),
            retry_after,
        }
    }
}
