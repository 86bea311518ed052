//! Error types for the asset pipeline.
//!
//! Three families of failure exist: transient remote failures reported by a
//! task service ([`SubmissionError`]), bounds violations when animation
//! results are missing ([`AnimationStateError`]), and configuration problems
//! ([`ConfigError`]). [`AssetFlowError`] is what pipeline operations return.

use crate::pipeline::StageName;
use crate::services::Capability;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum AssetFlowError {
    /// A stage kept failing until its retry policy ran out of attempts.
    #[error("Operation {stage} failed after {attempts} attempts")]
    RetryExhausted {
        /// The stage that gave up.
        stage: StageName,
        /// Number of attempts made.
        attempts: u32,
        /// The error from the final attempt.
        #[source]
        source: SubmissionError,
    },

    /// A stage failed with an error its retry policy does not cover.
    #[error("{stage} failed: {source}")]
    Submission {
        /// The failing stage.
        stage: StageName,
        /// The remote failure.
        #[source]
        source: SubmissionError,
    },

    /// Animation results were read past the recorded list.
    #[error(transparent)]
    AnimationState(#[from] AnimationStateError),

    /// The service factory has nothing registered for a capability.
    #[error("No task service registered for {capability}")]
    ServiceUnavailable {
        /// The missing capability.
        capability: Capability,
    },

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AssetFlowError {
    /// Returns the stage the error was raised in, if any.
    #[must_use]
    pub fn stage(&self) -> Option<StageName> {
        match self {
            Self::RetryExhausted { stage, .. } | Self::Submission { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Returns the underlying remote failure, if the error came from a task service.
    #[must_use]
    pub fn submission_error(&self) -> Option<&SubmissionError> {
        match self {
            Self::RetryExhausted { source, .. } | Self::Submission { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Classification of a remote failure.
///
/// Retry policies decide what to retry by matching on this kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection-level failure (DNS, reset, TLS).
    Transport,
    /// The call did not finish in time.
    Timeout,
    /// The service asked us to slow down.
    RateLimited,
    /// The service failed internally (5xx and similar).
    Server,
    /// The service refused the request as invalid.
    Rejected,
    /// The service is not reachable or not configured.
    Unavailable,
    /// Anything else.
    Other,
}

impl ErrorKind {
    /// All error kinds, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Transport,
        Self::Timeout,
        Self::RateLimited,
        Self::Server,
        Self::Rejected,
        Self::Unavailable,
        Self::Other,
    ];
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Timeout => write!(f, "timeout"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Server => write!(f, "server"),
            Self::Rejected => write!(f, "rejected"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A failure reported by a task-submission service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SubmissionError {
    /// What kind of failure this is.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
}

impl SubmissionError {
    /// Creates a new submission error.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Creates a rate-limit error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    /// Creates a server error.
    #[must_use]
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, message)
    }

    /// Creates a rejection error.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Rejected, message)
    }

    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }
}

/// Raised when an animation result is requested past the recorded list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Animation '{name}' not found at index {index}. Only {available} animations available.")]
pub struct AnimationStateError {
    /// Name of the animation that was requested.
    pub name: String,
    /// The requested position.
    pub index: usize,
    /// How many animations were recorded.
    pub available: usize,
}

impl AnimationStateError {
    /// Creates a new animation state error.
    #[must_use]
    pub fn new(name: impl Into<String>, index: usize, available: usize) -> Self {
        Self {
            name: name.into(),
            index,
            available,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The config file could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The config file could not be read.
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The tracing subscriber could not be installed.
    #[error("Failed to initialise logging: {0}")]
    Logging(String),
}
