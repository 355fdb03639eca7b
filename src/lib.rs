//! # Pacer - Adaptive Resilience for Rate-Limited APIs
//!
//! A self-tuning control layer for outbound calls to rate-limited remote
//! services. Think of it as cruise control for your API client: you tell it
//! the remote's quota, and it keeps your call rate right at the edge of what
//! the remote will tolerate — speeding up when everything succeeds, braking
//! hard the moment the remote pushes back.
//!
//! ## Why Adaptive?
//!
//! Published quotas lie. Remote services shed load below their documented
//! limits, tighten quotas during incidents, and throttle per-route. A fixed
//! client-side limit is either too timid (wasting quota) or too aggressive
//! (eating 429s). Pacer treats the remote's responses as the ground truth
//! and continuously retunes itself.
//!
//! ## The Pipeline
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │    Your Application     │
//!                    └──────────┬──────────────┘
//!                               │ execute(endpoint, weight, call)
//!                    ┌──────────▼──────────────┐
//!                    │    CallOrchestrator     │
//!                    │  retry loop + history   │
//!                    └──────────┬──────────────┘
//!                ┌──────────────┴───────────────┐
//!     ┌──────────▼──────────┐       ┌───────────▼──────────┐
//!     │     DualBucket      │       │   BreakerRegistry    │
//!     ├─────────────────────┤       ├──────────────────────┤
//!     │ • calls + weight    │       │ • breaker/endpoint   │
//!     │ • continuous refill │       │ • fail-fast gate     │
//!     │ • adaptive rates    │       │ • timed self-heal    │
//!     └─────────────────────┘       └──────────────────────┘
//! ```
//!
//! ## Features
//!
//! - 📏 **Dual-dimension metering** - Calls *and* weight units, the way
//!   real API quotas are billed
//! - 🔄 **Self-tuning rates** - A rolling success window grows and shrinks
//!   both rates inside hard min/max clamps
//! - 🚨 **Instant throttle reaction** - A remote 429 cuts the rates
//!   immediately, no waiting for the next adjustment
//! - ⛔ **Per-endpoint circuit breakers** - One sick route cannot open the
//!   circuit for its neighbors
//! - 🎲 **Classified retries** - Exponential backoff with jitter for
//!   throttles, flat delay for transient faults, fail-fast for the rest
//! - 📊 **Attempt history** - Every call carries a serializable record of
//!   what it took to complete
//!
//! ## Quick Start
//!
//! ```no_run
//! use pacer::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! // The remote allows 600 calls and 6000 weight units per minute.
//! let orchestrator = OrchestratorBuilder::new()
//!     .per_minute(600.0, 6000.0)
//!     .max_attempts(3)
//!     .build();
//!
//! // Each call declares its endpoint and estimated weight, and classifies
//! // its own failures so the retry loop knows what to do with them.
//! match orchestrator
//!     .execute("orders", 10, || async {
//!         // ... issue the remote call ...
//!         Ok::<_, Error>("order placed")
//!     })
//!     .await
//! {
//!     Ok(report) => println!("{} in {} attempts", report.value, report.metadata.attempts),
//!     Err(failed) => eprintln!("gave up: {} ({})", failed.error, failed.metadata.status),
//! }
//! # }
//! ```
//!
//! ## Using the Layers Directly
//!
//! Each layer stands on its own. A [`DualBucket`] is an adaptive rate
//! limiter without the retry machinery:
//!
//! ```no_run
//! use pacer::{BucketConfig, CallOutcome, DualBucket};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bucket = DualBucket::new(BucketConfig::per_minute(600.0, 6000.0)).unwrap();
//!
//! if bucket.acquire("orders", 10, Duration::from_secs(5)).await.granted {
//!     // ... call the remote ...
//!     bucket.record_outcome("orders", CallOutcome::Success, 10).await;
//! }
//! println!("{}", bucket.snapshot().await);
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! All types are safe to share across tasks and threads:
//! - `CallOrchestrator` - share via [`SharedOrchestrator`]
//! - `DualBucket` - share via [`SharedBucket`]
//!
//! ## Cancellation
//!
//! Dropping an `execute` or `acquire` future abandons the call cleanly. The
//! futures only wait on timers, which are cancel-safe, and tokens are only
//! debited at the instant admission is granted.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    missing_debug_implementations
)]
#![forbid(unsafe_code)]

// Internal module
mod resilience;

// Public re-exports
pub use resilience::{
    Admission, AttemptRecord, AttemptStatus, BreakerConfig, BreakerRegistry, BucketConfig,
    BucketSnapshot, CallMetadata, CallOrchestrator, CallOutcome, CallReport, CircuitBreaker,
    DualBucket, EndpointCounters, EndpointSnapshot, Error, FailedCall, OrchestratorConfig,
    RegistryStats, Result, RetryConfig, ADJUST_DEAD_BAND, ADJUST_GROW, ADJUST_SHRINK_FAST,
    ADJUST_SHRINK_SLOW, THROTTLE_BACKOFF_FACTOR,
};

/// An orchestrator wrapped in `Arc` for convenient sharing across tasks.
///
/// # Example
/// ```no_run
/// use pacer::{OrchestratorBuilder, SharedOrchestrator};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let shared: SharedOrchestrator = Arc::new(OrchestratorBuilder::new().build());
///
/// let handle = Arc::clone(&shared);
/// tokio::spawn(async move {
///     let _ = handle.execute("orders", 1, || async { Ok(()) }).await;
/// });
/// # }
/// ```
pub type SharedOrchestrator = std::sync::Arc<CallOrchestrator>;

/// A bucket wrapped in `Arc`, for sharing an adaptive limiter without the
/// orchestration layer.
pub type SharedBucket = std::sync::Arc<DualBucket>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum supported Rust version.
pub const MSRV: &str = "1.75.0";

/// Prelude module for convenient imports.
///
/// Import everything you need with a single line:
/// ```rust
/// use pacer::prelude::*;
/// ```
pub mod prelude {
    //! Common imports for typical resilience use cases.

    pub use crate::{
        BreakerConfig, BucketConfig, CallOrchestrator, CallOutcome, CallReport, DualBucket, Error,
        FailedCall, OrchestratorBuilder, OrchestratorConfig, RetryConfig, SharedBucket,
        SharedOrchestrator,
    };
}

/// Builder pattern for creating orchestrators with custom configuration.
///
/// The builder provides a fluent API over [`OrchestratorConfig`] for the
/// tunables most deployments touch; anything it does not expose can be set
/// by constructing the config directly.
///
/// # Example
///
/// ```rust
/// use pacer::OrchestratorBuilder;
/// use std::time::Duration;
///
/// let orchestrator = OrchestratorBuilder::new()
///     .per_minute(1200.0, 48_000.0)   // the remote's published quota
///     .max_attempts(5)
///     .max_failures(3)
///     .acquire_timeout(Duration::from_secs(2))
///     .build();
///
/// // Or use try_build() for error handling
/// let result = OrchestratorBuilder::new()
///     .target_success_rate(1.5)  // Invalid!
///     .try_build();
/// assert!(result.is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
}

impl OrchestratorBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sizes the bucket for a per-minute quota of `calls` and `weight`
    /// units, clamped to `[quota / 10, quota]`.
    pub fn per_minute(mut self, calls: f64, weight: f64) -> Self {
        self.config.bucket = BucketConfig::per_minute(calls, weight);
        self
    }

    /// Replaces the entire bucket section.
    pub fn bucket(mut self, bucket: BucketConfig) -> Self {
        self.config.bucket = bucket;
        self
    }

    /// Replaces the entire breaker section.
    pub fn breaker(mut self, breaker: BreakerConfig) -> Self {
        self.config.breaker = breaker;
        self
    }

    /// Replaces the entire retry section.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Total attempts per call, including the first.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    /// Base retry delay: the first throttled backoff step, and the flat
    /// delay between transient retries.
    pub fn base_delay(mut self, delay: std::time::Duration) -> Self {
        self.config.retry.base_delay = delay;
        self
    }

    /// Cap on the exponential throttled-retry delay.
    pub fn max_delay(mut self, delay: std::time::Duration) -> Self {
        self.config.retry.max_delay = delay;
        self
    }

    /// Consecutive failures at which an endpoint's breaker opens.
    pub fn max_failures(mut self, failures: u32) -> Self {
        self.config.breaker.max_failures = failures;
        self
    }

    /// Breaker cooldown before the next call may probe the remote again.
    pub fn reset_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.breaker.reset_timeout = timeout;
        self
    }

    /// How long admission may wait for bucket capacity before giving up.
    pub fn acquire_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.bucket.acquire_timeout = timeout;
        self
    }

    /// Rolling success rate the adjustment loop steers toward.
    pub fn target_success_rate(mut self, rate: f64) -> Self {
        self.config.bucket.target_success_rate = rate;
        self
    }

    /// Burst headroom above the sustained per-second rate.
    pub fn burst_multiplier(mut self, multiplier: f64) -> Self {
        self.config.bucket.burst_multiplier = multiplier;
        self
    }

    /// Builds the orchestrator with the configured settings.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid. Use [`try_build`](Self::try_build)
    /// to handle errors instead.
    pub fn build(self) -> CallOrchestrator {
        match self.try_build() {
            Ok(orchestrator) => orchestrator,
            Err(error) => panic!("invalid orchestrator configuration: {error}"),
        }
    }

    /// Attempts to build the orchestrator, returning the validation error
    /// instead of panicking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when any configuration section fails
    /// validation.
    pub fn try_build(self) -> Result<CallOrchestrator> {
        CallOrchestrator::new(self.config)
    }
}
