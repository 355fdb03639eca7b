//! # Call Orchestration
//!
//! [`CallOrchestrator`] is the crate's front door. One `execute` call runs
//! the full resilience pipeline for a single logical remote call:
//!
//! ```text
//!     execute(endpoint, weight, f)
//!          │
//!          ▼
//!     DualBucket::acquire ──── denied ──► RateLimitExceeded (no retry)
//!          │ granted
//!          ▼
//!     ┌─ attempt loop (≤ max_attempts) ─────────────────────────┐
//!     │  CircuitBreaker::call(f)                                │
//!     │     ├─ Ok ────────────► record Success, return report   │
//!     │     ├─ CircuitOpen ───► return immediately (no retry)   │
//!     │     ├─ Throttled ─────► record, backoff+jitter, retry   │
//!     │     ├─ Transient ─────► record, flat delay, retry       │
//!     │     └─ Fatal/other ───► record, return immediately      │
//!     └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Admission is paid once, for the first attempt; retries of the same
//! logical call do not go back through the bucket. Cancellation is the
//! caller dropping the `execute` future: the timers it waits on are
//! cancel-safe and no tokens beyond the initial admission are held.

use crate::resilience::bucket::DualBucket;
use crate::resilience::config::OrchestratorConfig;
use crate::resilience::error::{Error, Result};
use crate::resilience::registry::BreakerRegistry;
use crate::resilience::stats::CallOutcome;
use crate::resilience::utils::{backoff_delay, with_jitter};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error as ThisError;
use tokio::time::Instant;
use tracing::debug;

/// How a single attempt inside the retry loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// The attempt returned `Ok`.
    Success,
    /// The remote signaled overload.
    Throttled,
    /// The attempt failed for another reason.
    Error,
    /// The circuit breaker rejected the attempt before it started.
    CircuitOpen,
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Throttled => "throttled",
            Self::Error => "error",
            Self::CircuitOpen => "circuit_open",
        };
        write!(f, "{s}")
    }
}

/// One entry in a call's attempt history.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    /// Logical endpoint the call was destined for.
    pub endpoint: String,
    /// 1-based attempt number.
    pub attempt: u32,
    /// How the attempt ended.
    pub status: AttemptStatus,
    /// Wall time the attempt took, in milliseconds.
    pub duration_ms: u64,
    /// The bucket's call rate when the attempt finished.
    pub rate_at_time: f64,
}

/// Everything known about how a call was executed.
#[derive(Debug, Clone, Serialize)]
pub struct CallMetadata {
    /// Attempts actually performed.
    pub attempts: u32,
    /// Total wall time from admission to final outcome.
    pub duration: Duration,
    /// Terminal status: `success`, `rate_limited`, `circuit_open`,
    /// `retries_exhausted`, `error`, or `fatal`.
    pub status: String,
    /// Per-attempt records, in order.
    pub history: Vec<AttemptRecord>,
}

/// A successful call's value together with its execution metadata.
#[derive(Debug, Clone)]
pub struct CallReport<T> {
    /// What the remote call returned.
    pub value: T,
    /// How the call got there.
    pub metadata: CallMetadata,
}

/// A failed call: the terminal error plus the same execution metadata a
/// success would carry, so failures are just as observable.
#[derive(Debug, ThisError)]
#[error("{error}")]
pub struct FailedCall {
    /// The terminal error.
    #[source]
    pub error: Error,
    /// Execution metadata up to the failure.
    pub metadata: CallMetadata,
}

type AttemptHook = Arc<dyn Fn(&AttemptRecord) + Send + Sync>;

/// Runs remote calls through admission control, a per-endpoint circuit
/// breaker, and a classified retry loop.
///
/// # Example
///
/// ```no_run
/// use pacer::{CallOrchestrator, Error, OrchestratorConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let orchestrator = CallOrchestrator::new(OrchestratorConfig::default()).unwrap();
///
/// let report = orchestrator
///     .execute("orders", 10, || async {
///         // ... issue the remote call, classify its failure modes ...
///         Ok::<_, Error>("order placed")
///     })
///     .await
///     .unwrap();
/// assert_eq!(report.metadata.attempts, 1);
/// # }
/// ```
pub struct CallOrchestrator {
    bucket: Arc<DualBucket>,
    breakers: BreakerRegistry,
    config: OrchestratorConfig,
    attempt_hook: Option<AttemptHook>,
}

impl fmt::Debug for CallOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOrchestrator")
            .field("bucket", &self.bucket)
            .field("breakers", &self.breakers)
            .field("attempt_hook", &self.attempt_hook.is_some())
            .finish_non_exhaustive()
    }
}

impl CallOrchestrator {
    /// Creates an orchestrator from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when any configuration section fails
    /// validation.
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        config.validate()?;
        let bucket = Arc::new(DualBucket::new(config.bucket.clone())?);
        let breakers = BreakerRegistry::new(config.breaker);
        Ok(Self {
            bucket,
            breakers,
            config,
            attempt_hook: None,
        })
    }

    /// Installs an observer invoked once per finished attempt, as the
    /// attempt is appended to the call's history.
    pub fn with_attempt_hook(
        mut self,
        hook: impl Fn(&AttemptRecord) + Send + Sync + 'static,
    ) -> Self {
        self.attempt_hook = Some(Arc::new(hook));
        self
    }

    /// The shared bucket, for snapshots or out-of-band outcome recording.
    pub fn bucket(&self) -> &Arc<DualBucket> {
        &self.bucket
    }

    /// The per-endpoint breaker registry.
    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Executes one logical remote call with the full resilience pipeline.
    ///
    /// `call` is invoked once per attempt and must classify its own failures
    /// via [`Error::Throttled`], [`Error::Transient`], or [`Error::Fatal`].
    /// `weight_estimate` is debited from the bucket at admission and recorded
    /// as consumed on success; callers that learn the true weight only after
    /// the response can top the statistics up through
    /// [`DualBucket::record_outcome`].
    ///
    /// Admission happens once: denied admission returns
    /// [`Error::RateLimitExceeded`] without ever invoking `call`, and retries
    /// do not re-enter the bucket.
    ///
    /// # Errors
    ///
    /// Returns a [`FailedCall`] carrying the terminal [`Error`] and the
    /// attempt history accumulated so far.
    pub async fn execute<T, F, Fut>(
        &self,
        endpoint: &str,
        weight_estimate: u64,
        mut call: F,
    ) -> std::result::Result<CallReport<T>, FailedCall>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let retry = self.config.retry;
        let mut history = Vec::new();

        let admission = self
            .bucket
            .acquire(endpoint, weight_estimate, self.config.bucket.acquire_timeout)
            .await;
        if !admission.granted {
            return Err(FailedCall {
                error: Error::RateLimitExceeded {
                    endpoint: endpoint.to_string(),
                    waited: admission.waited,
                },
                metadata: CallMetadata {
                    attempts: 0,
                    duration: started.elapsed(),
                    status: "rate_limited".to_string(),
                    history,
                },
            });
        }

        let breaker = self.breakers.get_or_create(endpoint);
        let mut attempt = 1u32;
        loop {
            let attempt_started = Instant::now();
            let result = breaker.call(|| call()).await;
            let elapsed = attempt_started.elapsed();

            match result {
                Ok(value) => {
                    self.bucket
                        .record_outcome(endpoint, CallOutcome::Success, weight_estimate)
                        .await;
                    self.record_attempt(&mut history, endpoint, attempt, AttemptStatus::Success, elapsed)
                        .await;
                    return Ok(CallReport {
                        value,
                        metadata: CallMetadata {
                            attempts: attempt,
                            duration: started.elapsed(),
                            status: "success".to_string(),
                            history,
                        },
                    });
                }
                Err(error @ Error::CircuitOpen { .. }) => {
                    // The remote was never invoked, so no outcome is fed
                    // back into the bucket.
                    self.record_attempt(
                        &mut history,
                        endpoint,
                        attempt,
                        AttemptStatus::CircuitOpen,
                        elapsed,
                    )
                    .await;
                    return Err(FailedCall {
                        error,
                        metadata: CallMetadata {
                            attempts: attempt,
                            duration: started.elapsed(),
                            status: "circuit_open".to_string(),
                            history,
                        },
                    });
                }
                Err(error @ Error::Throttled { .. }) => {
                    self.bucket
                        .record_outcome(endpoint, CallOutcome::Throttled, 0)
                        .await;
                    self.record_attempt(
                        &mut history,
                        endpoint,
                        attempt,
                        AttemptStatus::Throttled,
                        elapsed,
                    )
                    .await;
                    if attempt >= retry.max_attempts {
                        return Err(FailedCall {
                            error: Error::MaxRetriesExceeded {
                                endpoint: endpoint.to_string(),
                                attempts: attempt,
                                source: Box::new(error),
                            },
                            metadata: CallMetadata {
                                attempts: attempt,
                                duration: started.elapsed(),
                                status: "retries_exhausted".to_string(),
                                history,
                            },
                        });
                    }
                    // A retry hint from the remote overrides the schedule.
                    let delay = match error {
                        Error::Throttled {
                            retry_after: Some(hint),
                            ..
                        } => hint,
                        _ => with_jitter(backoff_delay(retry.base_delay, retry.max_delay, attempt)),
                    };
                    tokio::time::sleep(delay).await;
                }
                Err(error @ Error::Transient { .. }) => {
                    self.bucket
                        .record_outcome(endpoint, CallOutcome::Error, 0)
                        .await;
                    self.record_attempt(&mut history, endpoint, attempt, AttemptStatus::Error, elapsed)
                        .await;
                    if attempt >= retry.max_attempts {
                        return Err(FailedCall {
                            error,
                            metadata: CallMetadata {
                                attempts: attempt,
                                duration: started.elapsed(),
                                status: "retries_exhausted".to_string(),
                                history,
                            },
                        });
                    }
                    tokio::time::sleep(retry.base_delay).await;
                }
                Err(error) => {
                    self.bucket
                        .record_outcome(endpoint, CallOutcome::Error, 0)
                        .await;
                    self.record_attempt(&mut history, endpoint, attempt, AttemptStatus::Error, elapsed)
                        .await;
                    return Err(FailedCall {
                        error,
                        metadata: CallMetadata {
                            attempts: attempt,
                            duration: started.elapsed(),
                            status: "fatal".to_string(),
                            history,
                        },
                    });
                }
            }
            attempt += 1;
        }
    }

    async fn record_attempt(
        &self,
        history: &mut Vec<AttemptRecord>,
        endpoint: &str,
        attempt: u32,
        status: AttemptStatus,
        elapsed: Duration,
    ) {
        let record = AttemptRecord {
            endpoint: endpoint.to_string(),
            attempt,
            status,
            duration_ms: elapsed.as_millis() as u64,
            rate_at_time: self.bucket.current_call_rate().await,
        };
        debug!(
            endpoint = %record.endpoint,
            attempt = record.attempt,
            status = %record.status,
            duration_ms = record.duration_ms,
            rate = record.rate_at_time,
            "call attempt finished"
        );
        if let Some(hook) = &self.attempt_hook {
            hook(&record);
        }
        history.push(record);
    }
}
