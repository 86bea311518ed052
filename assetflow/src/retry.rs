//! Retry utilities with exponential backoff.
//!
//! [`with_retry`] runs a fallible async operation until it succeeds, fails
//! with an error the [`RetryPolicy`] does not cover, or runs out of attempts.
//! Nothing in here knows about pipeline stages; callers that need to observe
//! individual failures use [`with_retry_notify`].

use crate::errors::{ConfigError, ErrorKind, SubmissionError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Errors that can tell a retry policy what kind of failure they are.
pub trait Classify {
    /// Returns the failure classification.
    fn error_kind(&self) -> ErrorKind;
}

impl Classify for SubmissionError {
    fn error_kind(&self) -> ErrorKind {
        self.kind
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    2000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_retry_on() -> HashSet<ErrorKind> {
    ErrorKind::ALL.into_iter().collect()
}

/// How often and how patiently to retry an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Factor applied to the delay after every retry.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Optional cap on a single delay, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    /// Error kinds that trigger a retry.
    #[serde(default = "default_retry_on")]
    pub retry_on: HashSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: None,
            retry_on: default_retry_on(),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the defaults: 3 attempts, 2s initial delay, x2 backoff,
    /// every error kind retryable.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the initial delay in milliseconds.
    #[must_use]
    pub fn with_initial_delay_ms(mut self, delay: u64) -> Self {
        self.initial_delay_ms = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Caps every individual delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = Some(delay);
        self
    }

    /// Replaces the set of retryable error kinds.
    #[must_use]
    pub fn retry_on(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retry_on = kinds.into_iter().collect();
        self
    }

    /// Stops retrying the given error kind.
    #[must_use]
    pub fn without_retry_on(mut self, kind: ErrorKind) -> Self {
        self.retry_on.remove(&kind);
        self
    }

    /// Default policy that gives up immediately on rejected requests.
    #[must_use]
    pub fn transient_only() -> Self {
        Self::default().without_retry_on(ErrorKind::Rejected)
    }

    /// Number of attempts actually made; never less than one.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// The delay before the second attempt.
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Returns true if failures of this kind should be retried.
    #[must_use]
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retry_on.contains(&kind)
    }

    /// Delay slept before `attempt` (1-based).
    ///
    /// The first attempt runs immediately. Attempt `i >= 2` waits
    /// `initial_delay * backoff_multiplier^(i-2)`, capped by `max_delay_ms`.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.powi(exponent);
        #[allow(clippy::cast_precision_loss)]
        let nanos = self.initial_delay().as_nanos() as f64 * factor;

        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let delay = if nanos.is_finite() && nanos < u64::MAX as f64 {
            Duration::from_nanos(nanos.round() as u64)
        } else {
            Duration::MAX
        };

        match self.max_delay_ms {
            Some(cap) => delay.min(Duration::from_millis(cap)),
            None => delay,
        }
    }

    /// Validates the policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError::Invalid("max_attempts must be >= 1".to_string()));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "backoff_multiplier must be a finite number >= 1, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }
}

/// Details about one failed attempt, handed to the notify callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptFailure {
    /// The attempt that failed (1-based).
    pub attempt: u32,
    /// Attempts allowed by the policy.
    pub max_attempts: u32,
    /// Delay before the next attempt, or `None` when no retry follows.
    pub next_delay: Option<Duration>,
}

impl AttemptFailure {
    /// Returns true if no further attempt will be made.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.next_delay.is_none()
    }
}

/// Why a retried operation gave up.
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Every attempt failed.
    #[error("Operation {operation} failed after {attempts} attempts")]
    Exhausted {
        /// Name of the operation.
        operation: String,
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        last_error: E,
    },

    /// An attempt failed with an error the policy does not retry.
    #[error("Operation {operation} failed on attempt {attempt}: {source}")]
    NotRetryable {
        /// Name of the operation.
        operation: String,
        /// The attempt that failed.
        attempt: u32,
        /// The error.
        #[source]
        source: E,
    },
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns true if the policy ran out of attempts.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// Number of attempts made before giving up.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::NotRetryable { attempt, .. } => *attempt,
        }
    }

    /// The error from the final attempt.
    #[must_use]
    pub fn last_error(&self) -> &E {
        match self {
            Self::Exhausted { last_error, .. } => last_error,
            Self::NotRetryable { source, .. } => source,
        }
    }

    /// Consumes the wrapper and returns the final error.
    #[must_use]
    pub fn into_last_error(self) -> E {
        match self {
            Self::Exhausted { last_error, .. } => last_error,
            Self::NotRetryable { source, .. } => source,
        }
    }
}

/// Executes an operation with retry logic.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Classify + 'static,
{
    with_retry_notify(policy, operation_name, operation, |_: &E, _: &AttemptFailure| {}).await
}

/// Executes an operation with retry logic, calling `notify` after every failed attempt.
///
/// `notify` runs before the backoff sleep, including for the final attempt.
pub async fn with_retry_notify<T, E, F, Fut, N>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
    mut notify: N,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Classify + 'static,
    N: FnMut(&E, &AttemptFailure),
{
    let max_attempts = policy.attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        let retryable = policy.is_retryable(error.error_kind());
        let next_delay =
            (retryable && attempt < max_attempts).then(|| policy.delay_before(attempt + 1));
        notify(
            &error,
            &AttemptFailure {
                attempt,
                max_attempts,
                next_delay,
            },
        );

        match next_delay {
            Some(delay) => {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            None if !retryable => {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    kind = %error.error_kind(),
                    error = %error,
                    "Attempt failed with a non-retryable error"
                );
                return Err(RetryError::NotRetryable {
                    operation: operation_name.to_string(),
                    attempt,
                    source: error,
                });
            }
            None => {
                tracing::error!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %error,
                    "All attempts failed"
                );
                return Err(RetryError::Exhausted {
                    operation: operation_name.to_string(),
                    attempts: attempt,
                    last_error: error,
                });
            }
        }
    }
}
