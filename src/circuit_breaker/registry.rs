use super::breaker::CircuitBreaker;
use super::types::{CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
use crate::observability::{default_sink, SharedSink};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Owns one circuit breaker per destination.
///
/// Breakers are created lazily on first use and live as long as the
/// registry. Lookup-or-insert for a key is atomic; the entry lock is only
/// held for the insert, never across a call.
#[derive(Clone)]
pub struct BreakerRegistry {
    /// Circuit breakers per destination
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
    /// Policy for newly created breakers
    config: CircuitBreakerConfig,
    /// Transition sink handed to every breaker
    sink: SharedSink,
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("destinations", &self.breakers.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default(), default_sink())
    }
}

impl BreakerRegistry {
    /// Create a new registry
    pub fn new(config: CircuitBreakerConfig, sink: SharedSink) -> Self {
        Self {
            breakers: Arc::new(DashMap::new()),
            config,
            sink,
        }
    }

    /// Get or create the circuit breaker for a destination
    pub fn get_or_create(&self, destination: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(destination) {
            return breaker.clone();
        }

        self.breakers
            .entry(destination.to_string())
            .or_insert_with(|| {
                debug!(destination = destination, "Creating new circuit breaker");
                Arc::new(CircuitBreaker::new(
                    destination,
                    self.config.clone(),
                    self.sink.clone(),
                ))
            })
            .clone()
    }

    /// Get the breaker for a destination if one was created
    pub fn get(&self, destination: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(destination).map(|b| b.clone())
    }

    /// Get the state of the breaker for a destination.
    /// Destinations that were never called report `Closed`.
    pub fn state(&self, destination: &str) -> CircuitState {
        self.get(destination)
            .map(|breaker| breaker.state())
            .unwrap_or(CircuitState::Closed)
    }

    /// Get metrics for a destination
    pub fn metrics(&self, destination: &str) -> Option<CircuitBreakerMetrics> {
        self.get(destination).map(|breaker| breaker.metrics())
    }

    /// Get all destinations with circuit breakers
    pub fn destinations(&self) -> Vec<String> {
        self.breakers.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get metrics and state for all destinations
    pub fn all_metrics(&self) -> Vec<(String, CircuitBreakerMetrics, CircuitState)> {
        // Snapshot the breakers first so no map shard is locked while
        // individual breaker locks are taken.
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|e| e.value().clone()).collect();

        breakers
            .into_iter()
            .map(|breaker| {
                (
                    breaker.name().to_string(),
                    breaker.metrics(),
                    breaker.state(),
                )
            })
            .collect()
    }
}
