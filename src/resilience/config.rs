//! # Configuration
//!
//! Every tunable in the resilience layer lives in an explicit configuration
//! struct with documented defaults, passed by value at construction. There is
//! no runtime reconfiguration beyond the bucket's own adjustment loop.
//!
//! ## The Two-Dimensional Bucket
//!
//! ```text
//!     Rates are expressed per period (default: one minute):
//!
//!     ┌──────────────────────────────────────┐
//!     │ call_rate:   600 calls / 60s         │
//!     │ weight_rate: 6000 units / 60s        │
//!     │ burst_multiplier: 1.5                │
//!     │                                      │
//!     │ call_capacity   = 600/60  * 1.5 = 15 │
//!     │ weight_capacity = 6000/60 * 1.5 = 150│
//!     └──────────────────────────────────────┘
//! ```
//!
//! Both rates float between their min/max clamps as the adjustment loop and
//! throttle reactions retune them; the clamps themselves never move.

use crate::resilience::error::{Error, Result};
use std::time::Duration;

/// Multiplicative cut applied to both rates the moment a remote throttle
/// signal is recorded. An explicit 429-equivalent is stronger evidence than
/// the rolling average, so this bypasses the adjustment interval.
pub const THROTTLE_BACKOFF_FACTOR: f64 = 0.8;

/// Fast shrink factor used when the rolling success rate falls well below
/// target.
pub const ADJUST_SHRINK_FAST: f64 = 0.8;

/// Gentle shrink factor used when the shortfall is small.
pub const ADJUST_SHRINK_SLOW: f64 = 0.9;

/// Growth factor applied when the rolling success rate clears the target.
/// Deliberately smaller than the shrink factors: the loop backs off fast and
/// recovers slowly.
pub const ADJUST_GROW: f64 = 1.05;

/// Half-width of the dead-band around the target success rate. Inside the
/// band the adjustment loop leaves the rate alone, preventing oscillation.
pub const ADJUST_DEAD_BAND: f64 = 0.05;

/// Shortfall below target (beyond the dead-band) at which the loop switches
/// from the gentle to the fast shrink factor.
pub(crate) const SMALL_SHORTFALL: f64 = 0.15;

/// Tunables for the [`DualBucket`](crate::DualBucket).
///
/// # Example
///
/// ```rust
/// use pacer::BucketConfig;
///
/// // A remote API allowing 1200 calls and 48_000 weight units per minute.
/// let config = BucketConfig::per_minute(1200.0, 48_000.0);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct BucketConfig {
    /// Starting call throughput, in calls per [`period`](Self::period).
    pub initial_call_rate: f64,
    /// Hard lower clamp on the call rate. Must be positive: a bucket tuned
    /// all the way down still admits this much.
    pub min_call_rate: f64,
    /// Hard upper clamp on the call rate.
    pub max_call_rate: f64,
    /// Starting weight throughput, in weight units per period.
    pub initial_weight_rate: f64,
    /// Hard lower clamp on the weight rate.
    pub min_weight_rate: f64,
    /// Hard upper clamp on the weight rate.
    pub max_weight_rate: f64,
    /// The period both rates are expressed against. Default: 60 seconds.
    pub period: Duration,
    /// Factor applied to the per-second rate to compute bucket capacity,
    /// allowing short bursts above the sustained rate. Default: 1.5.
    pub burst_multiplier: f64,
    /// Minimum time between runs of the periodic adjustment loop.
    /// Default: 60 seconds.
    pub adjustment_interval: Duration,
    /// Rolling success rate the adjustment loop steers toward.
    /// Default: 0.95.
    pub target_success_rate: f64,
    /// Width of the rolling outcome window used to compute the success rate.
    /// Default: 60 seconds.
    pub stats_window: Duration,
    /// How long one `acquire` call may wait for capacity before giving up.
    /// Default: 10 seconds.
    pub acquire_timeout: Duration,
}

impl Default for BucketConfig {
    /// Defaults sized for a typical per-minute remote API quota:
    /// 600 calls and 6000 weight units per minute, clamped to
    /// [60, 1200] and [600, 12000] respectively.
    fn default() -> Self {
        Self {
            initial_call_rate: 600.0,
            min_call_rate: 60.0,
            max_call_rate: 1200.0,
            initial_weight_rate: 6000.0,
            min_weight_rate: 600.0,
            max_weight_rate: 12_000.0,
            period: Duration::from_secs(60),
            burst_multiplier: 1.5,
            adjustment_interval: Duration::from_secs(60),
            target_success_rate: 0.95,
            stats_window: Duration::from_secs(60),
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

impl BucketConfig {
    /// Convenience constructor for a per-minute quota.
    ///
    /// Starts at the full quota, clamps to `[quota / 10, quota]`, and keeps
    /// every other default.
    pub fn per_minute(calls: f64, weight: f64) -> Self {
        Self {
            initial_call_rate: calls,
            min_call_rate: (calls / 10.0).max(1.0),
            max_call_rate: calls,
            initial_weight_rate: weight,
            min_weight_rate: (weight / 10.0).max(1.0),
            max_weight_rate: weight,
            period: Duration::from_secs(60),
            ..Self::default()
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when a clamp is non-positive or
    /// inverted, an initial rate sits outside its clamps, the period or
    /// window is zero, the burst multiplier is below 1, or the target
    /// success rate is outside `(0, 1)`.
    pub fn validate(&self) -> Result<()> {
        if self.min_call_rate <= 0.0 || self.min_weight_rate <= 0.0 {
            return Err(Error::InvalidConfig("minimum rates must be positive"));
        }
        if self.min_call_rate > self.max_call_rate || self.min_weight_rate > self.max_weight_rate {
            return Err(Error::InvalidConfig("rate clamps are inverted"));
        }
        if self.initial_call_rate < self.min_call_rate
            || self.initial_call_rate > self.max_call_rate
        {
            return Err(Error::InvalidConfig("initial call rate outside clamps"));
        }
        if self.initial_weight_rate < self.min_weight_rate
            || self.initial_weight_rate > self.max_weight_rate
        {
            return Err(Error::InvalidConfig("initial weight rate outside clamps"));
        }
        if self.period.is_zero() {
            return Err(Error::InvalidConfig("period must be non-zero"));
        }
        if self.burst_multiplier < 1.0 {
            return Err(Error::InvalidConfig("burst multiplier must be at least 1"));
        }
        if self.adjustment_interval.is_zero() {
            return Err(Error::InvalidConfig("adjustment interval must be non-zero"));
        }
        if self.target_success_rate <= 0.0 || self.target_success_rate >= 1.0 {
            return Err(Error::InvalidConfig(
                "target success rate must be strictly between 0 and 1",
            ));
        }
        if self.stats_window.is_zero() {
            return Err(Error::InvalidConfig("stats window must be non-zero"));
        }
        Ok(())
    }

    /// Call-dimension capacity for a given rate: per-second rate times the
    /// burst multiplier.
    pub(crate) fn capacity_for(&self, rate: f64) -> f64 {
        rate / self.period.as_secs_f64() * self.burst_multiplier
    }
}

/// Tunables for one [`CircuitBreaker`](crate::CircuitBreaker).
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures at which the breaker opens. Default: 5.
    pub max_failures: u32,
    /// Cooldown after the last failure before the next call is allowed to
    /// probe the remote again. Default: 30 seconds.
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl BreakerConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when `max_failures` is zero or the
    /// reset timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_failures == 0 {
            return Err(Error::InvalidConfig("max_failures must be at least 1"));
        }
        if self.reset_timeout.is_zero() {
            return Err(Error::InvalidConfig("reset timeout must be non-zero"));
        }
        Ok(())
    }
}

/// Tunables for the orchestrator's retry loop.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts per call, including the first. Default: 3.
    pub max_attempts: u32,
    /// Delay for the first throttled retry, and the flat delay used for
    /// transient retries. Default: 500 milliseconds.
    pub base_delay: Duration,
    /// Cap on the exponential throttled-retry delay, before jitter.
    /// Default: 30 seconds.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when `max_attempts` is zero or the
    /// delay bounds are zero or inverted.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig("max_attempts must be at least 1"));
        }
        if self.base_delay.is_zero() {
            return Err(Error::InvalidConfig("base delay must be non-zero"));
        }
        if self.max_delay < self.base_delay {
            return Err(Error::InvalidConfig("max delay must be >= base delay"));
        }
        Ok(())
    }
}

/// Complete configuration for a [`CallOrchestrator`](crate::CallOrchestrator).
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Token-bucket tunables.
    pub bucket: BucketConfig,
    /// Per-endpoint circuit-breaker tunables.
    pub breaker: BreakerConfig,
    /// Retry-loop tunables.
    pub retry: RetryConfig,
}

impl OrchestratorConfig {
    /// Validates every nested section.
    ///
    /// # Errors
    ///
    /// Returns the first [`Error::InvalidConfig`] found in the bucket,
    /// breaker, or retry sections.
    pub fn validate(&self) -> Result<()> {
        self.bucket.validate()?;
        self.breaker.validate()?;
        self.retry.validate()
    }
}
