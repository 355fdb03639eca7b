//! # Circuit Breaker
//!
//! A consecutive-failure counter that fails fast once a remote dependency is
//! judged unhealthy, and self-heals after a cooldown.
//!
//! ```text
//!     failure_count < max_failures          calls pass through
//!                │
//!                ▼  (max_failures consecutive failures)
//!     open: calls rejected with CircuitOpen
//!                │
//!                ▼  (reset_timeout since last failure)
//!     next call probes the remote directly:
//!       success ──► counter resets to 0
//!       failure ──► breaker reopens, cooldown restarts
//! ```
//!
//! There is no stored state enum: "open" is a predicate derived from the
//! failure count and the last-failure timestamp, so the state can never
//! desynchronize from the counters. There is also no half-open probe cap;
//! every call arriving after the cooldown probes the remote directly.

use crate::resilience::config::BreakerConfig;
use crate::resilience::error::{Error, Result};
use std::future::Future;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct BreakerState {
    /// Consecutive failures, reset to 0 on any success.
    failure_count: u32,
    last_failure_at: Option<Instant>,
}

impl BreakerState {
    fn is_open(&self, config: &BreakerConfig) -> bool {
        match self.last_failure_at {
            Some(at) => {
                self.failure_count >= config.max_failures
                    && at.elapsed() < config.reset_timeout
            }
            None => false,
        }
    }
}

/// Failure-counting gate in front of one remote endpoint.
///
/// State updates are serialized by a per-instance lock, so concurrent calls
/// on the same breaker observe a consistent counter.
///
/// # Example
///
/// ```no_run
/// use pacer::{BreakerConfig, CircuitBreaker, Error};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let breaker = CircuitBreaker::new("orders", BreakerConfig::default());
///
/// let result: Result<u32, Error> = breaker
///     .call(|| async { Ok(7) })
///     .await;
/// assert_eq!(result.unwrap(), 7);
/// # }
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    endpoint: String,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a breaker for the named endpoint.
    pub fn new(endpoint: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            config,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// Invokes `op` through the breaker.
    ///
    /// When the breaker is open and the cooldown has not elapsed, returns
    /// [`Error::CircuitOpen`] without invoking `op`. Otherwise the call
    /// proceeds: any `Ok` fully resets the failure counter, any `Err`
    /// increments it and restarts the cooldown clock.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        {
            let state = self.state.lock().await;
            if state.is_open(&self.config) {
                return Err(Error::CircuitOpen {
                    endpoint: self.endpoint.clone(),
                    failures: state.failure_count,
                });
            }
        }

        match op().await {
            Ok(value) => {
                let mut state = self.state.lock().await;
                if state.failure_count >= self.config.max_failures {
                    debug!(endpoint = %self.endpoint, "circuit breaker reset after successful probe");
                }
                state.failure_count = 0;
                state.last_failure_at = None;
                Ok(value)
            }
            Err(error) => {
                let mut state = self.state.lock().await;
                state.failure_count += 1;
                state.last_failure_at = Some(Instant::now());
                if state.failure_count == self.config.max_failures {
                    warn!(
                        endpoint = %self.endpoint,
                        failures = state.failure_count,
                        reset_timeout = ?self.config.reset_timeout,
                        "circuit breaker opened"
                    );
                }
                Err(error)
            }
        }
    }

    /// Whether a call arriving right now would be rejected.
    ///
    /// Derived from the failure count and last-failure timestamp; returns
    /// `false` again once the cooldown has elapsed even though the counter
    /// has not yet been reset by a successful probe.
    pub async fn is_open(&self) -> bool {
        self.state.lock().await.is_open(&self.config)
    }

    /// Current consecutive-failure count.
    pub async fn failure_count(&self) -> u32 {
        self.state.lock().await.failure_count
    }

    /// The endpoint this breaker guards.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
