//! # Outcome Statistics & Snapshots
//!
//! Per-endpoint outcome accounting for the adaptive control loop, plus the
//! coherent point-in-time snapshot the bucket exposes for observability.
//!
//! Each endpoint carries monotonically increasing lifetime counters and a
//! bounded rolling window of recent outcomes. The window is what the
//! adjustment loop reads to compute a moving success ratio; entries older
//! than the configured window are evicted lazily whenever the window is
//! touched.
//!
//! ```text
//!     Rolling window (60s):
//!
//!     now-90s   now-45s   now-10s   now
//!        ✓         ✓✗        ✓✓      │
//!        └─evicted─┘└──── counted ───┘
//!
//!     success rate = successes in window / outcomes in window
//! ```

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Classified result of one remote call attempt, as fed back into the
/// bucket's statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// The call completed successfully.
    Success,
    /// The remote service explicitly signaled overload.
    Throttled,
    /// The call failed for any other reason.
    Error,
}

/// Outcome accounting for one logical endpoint.
///
/// Created lazily on first reference and never destroyed; counters are
/// monotonic and reset only by process restart.
#[derive(Debug, Default)]
pub(crate) struct EndpointStats {
    total: u64,
    succeeded: u64,
    throttled: u64,
    errored: u64,
    weight_consumed: u64,
    recent: VecDeque<(Instant, CallOutcome)>,
}

impl EndpointStats {
    /// Records one outcome at `now`, evicting window entries that have aged
    /// out so the deque stays bounded by the call rate times the window.
    pub(crate) fn record(
        &mut self,
        outcome: CallOutcome,
        weight_consumed: u64,
        now: Instant,
        window: Duration,
    ) {
        self.total += 1;
        self.weight_consumed += weight_consumed;
        match outcome {
            CallOutcome::Success => self.succeeded += 1,
            CallOutcome::Throttled => self.throttled += 1,
            CallOutcome::Error => self.errored += 1,
        }
        self.evict(now, window);
        self.recent.push_back((now, outcome));
    }

    /// Outcomes inside the window as `(successes, total)`.
    pub(crate) fn window_counts(&mut self, now: Instant, window: Duration) -> (u64, u64) {
        self.evict(now, window);
        let successes = self
            .recent
            .iter()
            .filter(|(_, outcome)| *outcome == CallOutcome::Success)
            .count() as u64;
        (successes, self.recent.len() as u64)
    }

    fn evict(&mut self, now: Instant, window: Duration) {
        while let Some((at, _)) = self.recent.front() {
            if now.duration_since(*at) > window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }

    pub(crate) fn counters(&self) -> EndpointCounters {
        EndpointCounters {
            total: self.total,
            succeeded: self.succeeded,
            throttled: self.throttled,
            errored: self.errored,
            weight_consumed: self.weight_consumed,
        }
    }
}

/// Lifetime counters for one endpoint, copied out of a snapshot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EndpointCounters {
    /// Total outcomes recorded.
    pub total: u64,
    /// Successful calls.
    pub succeeded: u64,
    /// Remote-signaled throttles.
    pub throttled: u64,
    /// All other failures.
    pub errored: u64,
    /// Weight units consumed by successful calls.
    pub weight_consumed: u64,
}

impl EndpointCounters {
    /// Lifetime fraction of successful outcomes, `1.0` when nothing has been
    /// recorded yet.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }

    /// Lifetime fraction of remote-signaled throttles.
    pub fn throttle_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.throttled as f64 / self.total as f64
        }
    }
}

/// Per-endpoint entry inside a [`BucketSnapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct EndpointSnapshot {
    /// Logical endpoint name.
    pub endpoint: String,
    /// Lifetime counters at snapshot time.
    pub counters: EndpointCounters,
}

/// Coherent point-in-time view of a bucket's state.
///
/// All fields are read inside a single critical section, so levels, rates,
/// and capacities are mutually consistent.
///
/// # Example
///
/// ```no_run
/// use pacer::{BucketConfig, DualBucket};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let bucket = DualBucket::new(BucketConfig::default()).unwrap();
/// let snapshot = bucket.snapshot().await;
/// println!("{}", snapshot.summary());
/// # }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct BucketSnapshot {
    /// Current call-dimension fill level.
    pub call_tokens: f64,
    /// Current weight-dimension fill level.
    pub weight_tokens: f64,
    /// Current allowed call throughput, in calls per period.
    pub call_rate: f64,
    /// Current allowed weight throughput, in weight units per period.
    pub weight_rate: f64,
    /// Upper bound on `call_tokens`.
    pub call_capacity: f64,
    /// Upper bound on `weight_tokens`.
    pub weight_capacity: f64,
    /// Per-endpoint counters, sorted by endpoint name.
    pub endpoints: Vec<EndpointSnapshot>,
}

impl BucketSnapshot {
    /// Fraction of call capacity currently consumed (`0.0` = full bucket).
    pub fn call_utilization(&self) -> f64 {
        if self.call_capacity == 0.0 {
            0.0
        } else {
            1.0 - self.call_tokens / self.call_capacity
        }
    }

    /// Fraction of weight capacity currently consumed.
    pub fn weight_utilization(&self) -> f64 {
        if self.weight_capacity == 0.0 {
            0.0
        } else {
            1.0 - self.weight_tokens / self.weight_capacity
        }
    }

    /// Total outcomes recorded across all endpoints.
    pub fn total_outcomes(&self) -> u64 {
        self.endpoints.iter().map(|e| e.counters.total).sum()
    }

    /// Human-readable report suitable for logging or display.
    pub fn summary(&self) -> String {
        format!(
            "DualBucket Snapshot:\n\
             ├─ Calls:\n\
             │  ├─ Tokens: {:.2}/{:.2}\n\
             │  ├─ Rate: {:.1}/period\n\
             │  └─ Utilization: {:.1}%\n\
             ├─ Weight:\n\
             │  ├─ Tokens: {:.2}/{:.2}\n\
             │  ├─ Rate: {:.1}/period\n\
             │  └─ Utilization: {:.1}%\n\
             └─ Endpoints: {} ({} outcomes recorded)",
            self.call_tokens,
            self.call_capacity,
            self.call_rate,
            self.call_utilization() * 100.0,
            self.weight_tokens,
            self.weight_capacity,
            self.weight_rate,
            self.weight_utilization() * 100.0,
            self.endpoints.len(),
            self.total_outcomes(),
        )
    }
}

impl fmt::Display for BucketSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
