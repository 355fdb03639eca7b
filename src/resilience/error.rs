//! # Error Taxonomy
//!
//! Every failure the resilience layer can produce is a variant of [`Error`].
//! Callers always receive either a successful result or a typed error; there
//! is no silent degradation. Remote-call code signals its own classification
//! through the [`Error::Throttled`], [`Error::Transient`], and
//! [`Error::Fatal`] variants, and the orchestrator decides what to do with
//! each:
//!
//! ```text
//!     Classification → Policy:
//!
//!     RateLimitExceeded ──► never retried (local admission denied)
//!     CircuitOpen ────────► never retried (fail-fast is the point)
//!     Throttled ──────────► retried with exponential backoff + jitter
//!     Transient ──────────► retried with a flat delay
//!     Fatal ──────────────► propagated immediately
//!     MaxRetriesExceeded ─► terminal, wraps the last throttle error
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All failures the resilience layer can produce or classify.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value failed validation at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Local admission control denied the call: the bucket could not supply
    /// capacity within the acquire timeout. Never retried.
    #[error("admission denied for `{endpoint}`: no capacity within {waited:?}")]
    RateLimitExceeded {
        /// Endpoint the call was destined for.
        endpoint: String,
        /// How long the caller waited before giving up.
        waited: Duration,
    },

    /// The circuit breaker judged the remote dependency unhealthy and
    /// rejected the call without invoking it. Never retried.
    #[error("circuit open for `{endpoint}` after {failures} consecutive failures")]
    CircuitOpen {
        /// Endpoint whose breaker is open.
        endpoint: String,
        /// Consecutive failures observed when the call was rejected.
        failures: u32,
    },

    /// The remote service explicitly signaled overload (a 429-equivalent).
    /// Retried with exponential backoff and jitter.
    #[error("remote throttled: {message}")]
    Throttled {
        /// Description of the throttle response.
        message: String,
        /// Retry hint from the remote service, if it sent one.
        retry_after: Option<Duration>,
    },

    /// Any other retryable failure (connection reset, timeout, 5xx).
    /// Retried with a flat delay.
    #[error("transient failure: {message}")]
    Transient {
        /// Description of the failure.
        message: String,
    },

    /// Retry budget exhausted. Wraps the last error observed.
    #[error("`{endpoint}`: retries exhausted after {attempts} attempts")]
    MaxRetriesExceeded {
        /// Endpoint the call was destined for.
        endpoint: String,
        /// Number of attempts actually performed.
        attempts: u32,
        /// The error returned by the final attempt.
        #[source]
        source: Box<Error>,
    },

    /// A non-retryable failure (bad request, auth rejection). Propagated
    /// immediately without consuming retry budget.
    #[error("fatal: {message}")]
    Fatal {
        /// Description of the failure.
        message: String,
    },
}

impl Error {
    /// Shorthand for a [`Error::Throttled`] without a retry hint.
    pub fn throttled(message: impl Into<String>) -> Self {
        Self::Throttled {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Shorthand for a [`Error::Transient`].
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::Fatal`].
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Whether the orchestrator's retry loop may attempt this error again.
    ///
    /// Only remote-signaled throttles and transient failures are retryable;
    /// admission rejections and open circuits would defeat their purpose if
    /// retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled { .. } | Self::Transient { .. })
    }
}
