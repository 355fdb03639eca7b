//! # Resilience Pipeline
//!
//! The layered machinery behind [`CallOrchestrator`]:
//!
//! ```text
//!     CallOrchestrator          retry loop, attempt history
//!          │
//!          ├── DualBucket       adaptive two-dimension admission control
//!          │     └── stats      rolling outcome window per endpoint
//!          │
//!          └── BreakerRegistry  one CircuitBreaker per endpoint
//! ```
//!
//! Each layer is usable on its own: a [`DualBucket`] is a standalone adaptive
//! rate limiter, and a [`CircuitBreaker`] a standalone fail-fast gate.

mod breaker;
mod bucket;
mod config;
mod error;
mod orchestrator;
mod registry;
mod stats;
mod utils;

pub use breaker::CircuitBreaker;
pub use bucket::{Admission, DualBucket};
pub use config::{
    BreakerConfig, BucketConfig, OrchestratorConfig, RetryConfig, ADJUST_DEAD_BAND, ADJUST_GROW,
    ADJUST_SHRINK_FAST, ADJUST_SHRINK_SLOW, THROTTLE_BACKOFF_FACTOR,
};
pub use error::{Error, Result};
pub use orchestrator::{
    AttemptRecord, AttemptStatus, CallMetadata, CallOrchestrator, CallReport, FailedCall,
};
pub use registry::{BreakerRegistry, RegistryStats};
pub use stats::{BucketSnapshot, CallOutcome, EndpointCounters, EndpointSnapshot};
