//! Per-endpoint circuit breaker registry.
//!
//! Breakers are isolated per logical endpoint so one failing remote route
//! cannot open the circuit for its healthy neighbors. Entries are created
//! lazily on first use and live for the life of the process; endpoint names
//! form a small, bounded set in practice.

use crate::resilience::breaker::CircuitBreaker;
use crate::resilience::config::BreakerConfig;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Concurrent map of endpoint name to its [`CircuitBreaker`].
///
/// Lookups take a sharded read lock only; a write lock is taken once per
/// endpoint, when its breaker is first created.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>, ahash::RandomState>,
    config: BreakerConfig,
    total_created: AtomicU64,
}

/// Registry-level counters.
#[derive(Debug, Clone, Copy)]
pub struct RegistryStats {
    /// Endpoints currently holding a breaker.
    pub active_endpoints: usize,
    /// Breakers created since construction.
    pub total_created: u64,
}

impl BreakerRegistry {
    /// Creates an empty registry; every breaker it mints shares `config`.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            breakers: DashMap::with_hasher(ahash::RandomState::new()),
            config,
            total_created: AtomicU64::new(0),
        }
    }

    /// Returns the breaker for `endpoint`, creating it on first reference.
    pub fn get_or_create(&self, endpoint: &str) -> Arc<CircuitBreaker> {
        // Fast path: the breaker almost always exists already.
        if let Some(breaker) = self.breakers.get(endpoint) {
            return Arc::clone(breaker.value());
        }

        let entry = self
            .breakers
            .entry(endpoint.to_string())
            .or_insert_with(|| {
                self.total_created.fetch_add(1, Ordering::Relaxed);
                debug!(endpoint, "created circuit breaker");
                Arc::new(CircuitBreaker::new(endpoint, self.config))
            });
        Arc::clone(entry.value())
    }

    /// Names of all endpoints with a breaker, in no particular order.
    pub fn active_endpoints(&self) -> Vec<String> {
        self.breakers.iter().map(|e| e.key().clone()).collect()
    }

    /// Current registry counters.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            active_endpoints: self.breakers.len(),
            total_created: self.total_created.load(Ordering::Relaxed),
        }
    }
}
