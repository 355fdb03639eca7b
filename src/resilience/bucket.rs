//! # Adaptive Dual-Dimension Token Bucket
//!
//! The admission-control heart of the crate. A [`DualBucket`] meters two
//! resources at once, because rate-limited remote APIs commonly bill both:
//!
//! ```text
//!     ┌───────────────────────────────────────────────┐
//!     │                  DualBucket                   │
//!     │                                               │
//!     │   calls dimension        weight dimension     │
//!     │   ┌───────────┐          ┌───────────┐        │
//!     │   │ ███████   │          │ █████     │        │
//!     │   │ 12.3 / 15 │          │ 88 / 150  │        │
//!     │   └───────────┘          └───────────┘        │
//!     │         ▲                      ▲              │
//!     │         └── continuous refill ─┘              │
//!     │                                               │
//!     │   acquire(endpoint, weight) needs BOTH:       │
//!     │   1 call token  AND  `weight` weight tokens   │
//!     └───────────────────────────────────────────────┘
//! ```
//!
//! Both dimensions refill continuously from their current rates, and both
//! rates float: outcome feedback shrinks them when the remote pushes back and
//! grows them when a rolling window of outcomes stays healthy. A remote
//! throttle signal is treated as ground truth and cuts the rates immediately,
//! without waiting for the periodic adjustment interval.
//!
//! All mutable state lives behind one async mutex. Every operation is a
//! single short critical section; `acquire` never holds the lock while it
//! sleeps, so a waiting caller cannot starve others.

use crate::resilience::config::{
    BucketConfig, ADJUST_DEAD_BAND, ADJUST_GROW, ADJUST_SHRINK_FAST, ADJUST_SHRINK_SLOW,
    SMALL_SHORTFALL, THROTTLE_BACKOFF_FACTOR,
};
use crate::resilience::error::Result;
use crate::resilience::stats::{BucketSnapshot, CallOutcome, EndpointSnapshot, EndpointStats};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Smallest sleep between admission re-checks, so a caller waiting on a
/// nearly-full bucket does not spin.
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Result of one admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Whether capacity was debited and the caller may proceed.
    pub granted: bool,
    /// How long the caller waited for the decision.
    pub waited: Duration,
}

#[derive(Debug)]
struct BucketState {
    call_rate: f64,
    weight_rate: f64,
    call_tokens: f64,
    weight_tokens: f64,
    call_capacity: f64,
    weight_capacity: f64,
    last_refill: Instant,
    last_adjust: Instant,
    stats: HashMap<String, EndpointStats>,
}

impl BucketState {
    /// Tops up both dimensions from the elapsed time, capped at capacity.
    fn refill(&mut self, config: &BucketConfig, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            let period = config.period.as_secs_f64();
            self.call_tokens =
                (self.call_tokens + elapsed * self.call_rate / period).min(self.call_capacity);
            self.weight_tokens =
                (self.weight_tokens + elapsed * self.weight_rate / period).min(self.weight_capacity);
            self.last_refill = now;
        }
    }

    /// Applies `factor` to both rates, clamps them, and recomputes the
    /// capacities. Token levels above the new capacities are forfeited.
    fn scale_rates(&mut self, config: &BucketConfig, factor: f64) {
        self.call_rate = (self.call_rate * factor)
            .clamp(config.min_call_rate, config.max_call_rate);
        self.weight_rate = (self.weight_rate * factor)
            .clamp(config.min_weight_rate, config.max_weight_rate);
        self.call_capacity = config.capacity_for(self.call_rate);
        self.weight_capacity = config.capacity_for(self.weight_rate);
        self.call_tokens = self.call_tokens.min(self.call_capacity);
        self.weight_tokens = self.weight_tokens.min(self.weight_capacity);
    }

    /// Interval-gated adjustment from the rolling success rate.
    ///
    /// A window with no outcomes defers the run entirely: `last_adjust` is
    /// left alone so the first window with traffic adjusts promptly.
    fn maybe_adjust(&mut self, config: &BucketConfig, now: Instant) {
        if now.duration_since(self.last_adjust) < config.adjustment_interval {
            return;
        }

        let (mut successes, mut total) = (0u64, 0u64);
        for stats in self.stats.values_mut() {
            let (s, t) = stats.window_counts(now, config.stats_window);
            successes += s;
            total += t;
        }
        if total == 0 {
            return;
        }

        let rate = successes as f64 / total as f64;
        let target = config.target_success_rate;
        let factor = if rate < target - ADJUST_DEAD_BAND {
            if target - rate <= SMALL_SHORTFALL {
                ADJUST_SHRINK_SLOW
            } else {
                ADJUST_SHRINK_FAST
            }
        } else if rate > target + ADJUST_DEAD_BAND {
            ADJUST_GROW
        } else {
            1.0
        };

        if factor != 1.0 {
            self.scale_rates(config, factor);
            debug!(
                success_rate = rate,
                factor,
                call_rate = self.call_rate,
                weight_rate = self.weight_rate,
                "adjusted bucket rates from rolling window"
            );
        }
        self.last_adjust = now;
    }
}

/// Token bucket metering calls and weight units against floating rates.
///
/// The bucket starts full, so a freshly constructed instance admits an
/// initial burst up to capacity. Cheap to share: wrap it in an [`Arc`] and
/// clone the handle.
///
/// [`Arc`]: std::sync::Arc
///
/// # Example
///
/// ```no_run
/// use pacer::{BucketConfig, CallOutcome, DualBucket};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let bucket = DualBucket::new(BucketConfig::per_minute(600.0, 6000.0)).unwrap();
///
/// let admission = bucket.acquire("orders", 10, Duration::from_secs(5)).await;
/// if admission.granted {
///     // ... perform the remote call ...
///     bucket.record_outcome("orders", CallOutcome::Success, 10).await;
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct DualBucket {
    config: BucketConfig,
    inner: Mutex<BucketState>,
}

impl DualBucket {
    /// Creates a full bucket at the configured initial rates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) when the
    /// configuration fails validation.
    pub fn new(config: BucketConfig) -> Result<Self> {
        config.validate()?;
        let now = Instant::now();
        let call_capacity = config.capacity_for(config.initial_call_rate);
        let weight_capacity = config.capacity_for(config.initial_weight_rate);
        let inner = Mutex::new(BucketState {
            call_rate: config.initial_call_rate,
            weight_rate: config.initial_weight_rate,
            call_tokens: call_capacity,
            weight_tokens: weight_capacity,
            call_capacity,
            weight_capacity,
            last_refill: now,
            last_adjust: now,
            stats: HashMap::new(),
        });
        Ok(Self { config, inner })
    }

    /// Requests admission for one call consuming `weight` weight units.
    ///
    /// Debits one call token and `weight` weight tokens atomically when both
    /// are available; otherwise sleeps until the refill can cover the
    /// shortfall and re-checks. Gives up without debiting anything when the
    /// required wait would exceed `max_wait`, or immediately when `weight`
    /// exceeds the bucket's current weight capacity and so could never be
    /// satisfied.
    ///
    /// The lock is released before every sleep, so waiting callers do not
    /// block concurrent admissions or outcome recording. Dropping the
    /// returned future while it sleeps abandons the request cleanly; tokens
    /// are only debited at the instant admission is granted.
    pub async fn acquire(&self, endpoint: &str, weight: u64, max_wait: Duration) -> Admission {
        let started = Instant::now();
        loop {
            let wait = {
                let mut state = self.inner.lock().await;
                let now = Instant::now();
                state.refill(&self.config, now);
                state.maybe_adjust(&self.config, now);
                state.stats.entry(endpoint.to_string()).or_default();

                let needed_weight = weight as f64;
                if needed_weight > state.weight_capacity {
                    warn!(
                        endpoint,
                        weight,
                        weight_capacity = state.weight_capacity,
                        "call weight exceeds bucket capacity, rejecting"
                    );
                    return Admission {
                        granted: false,
                        waited: started.elapsed(),
                    };
                }

                if state.call_tokens >= 1.0 && state.weight_tokens >= needed_weight {
                    state.call_tokens -= 1.0;
                    state.weight_tokens -= needed_weight;
                    return Admission {
                        granted: true,
                        waited: started.elapsed(),
                    };
                }

                let period = self.config.period.as_secs_f64();
                let call_wait = (1.0 - state.call_tokens).max(0.0)
                    / (state.call_rate / period);
                let weight_wait = (needed_weight - state.weight_tokens).max(0.0)
                    / (state.weight_rate / period);
                Duration::from_secs_f64(call_wait.max(weight_wait)).max(MIN_WAIT)
            };

            if started.elapsed() + wait > max_wait {
                return Admission {
                    granted: false,
                    waited: started.elapsed(),
                };
            }
            tokio::time::sleep(wait).await;
        }
    }

    /// Feeds the classified outcome of a completed call back into the bucket.
    ///
    /// A [`CallOutcome::Throttled`] is an explicit overload signal from the
    /// remote and triggers an immediate multiplicative rate cut, bypassing
    /// the adjustment interval; the cut also restarts that interval so the
    /// periodic loop does not pile a second reduction on top of it.
    pub async fn record_outcome(&self, endpoint: &str, outcome: CallOutcome, weight_consumed: u64) {
        let mut state = self.inner.lock().await;
        let now = Instant::now();
        state.refill(&self.config, now);
        state
            .stats
            .entry(endpoint.to_string())
            .or_default()
            .record(outcome, weight_consumed, now, self.config.stats_window);

        if outcome == CallOutcome::Throttled {
            state.scale_rates(&self.config, THROTTLE_BACKOFF_FACTOR);
            state.last_adjust = now;
            warn!(
                endpoint,
                call_rate = state.call_rate,
                weight_rate = state.weight_rate,
                "remote throttle signal, rates cut immediately"
            );
        }
    }

    /// Runs the periodic adjustment if the interval has elapsed.
    ///
    /// `acquire` already calls this opportunistically; exposing it lets
    /// callers with long idle gaps between calls drive the loop themselves.
    pub async fn maybe_adjust(&self) {
        let mut state = self.inner.lock().await;
        let now = Instant::now();
        state.refill(&self.config, now);
        state.maybe_adjust(&self.config, now);
    }

    /// Captures a coherent snapshot of levels, rates, and per-endpoint
    /// counters, with a refill applied first so levels are current.
    pub async fn snapshot(&self) -> BucketSnapshot {
        let mut state = self.inner.lock().await;
        state.refill(&self.config, Instant::now());
        let mut endpoints: Vec<EndpointSnapshot> = state
            .stats
            .iter()
            .map(|(endpoint, stats)| EndpointSnapshot {
                endpoint: endpoint.clone(),
                counters: stats.counters(),
            })
            .collect();
        endpoints.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        BucketSnapshot {
            call_tokens: state.call_tokens,
            weight_tokens: state.weight_tokens,
            call_rate: state.call_rate,
            weight_rate: state.weight_rate,
            call_capacity: state.call_capacity,
            weight_capacity: state.weight_capacity,
            endpoints,
        }
    }

    /// Current call rate, read for attempt records.
    pub(crate) async fn current_call_rate(&self) -> f64 {
        self.inner.lock().await.call_rate
    }

    /// The configuration this bucket was built with.
    pub fn config(&self) -> &BucketConfig {
        &self.config
    }
}
