use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Circuit is half-open, allowing trial requests
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding used by the state gauge
    pub fn as_gauge(&self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "Closed"),
            CircuitState::Open => write!(f, "Open"),
            CircuitState::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Circuit breaker configuration
///
/// The defaults are the policy applied to every breaker the registry creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Trial requests admitted while half-open. The circuit closes once
    /// this many consecutive trials succeed.
    #[serde(default = "default_max_half_open_requests")]
    pub max_half_open_requests: u32,

    /// Closed-state counts are cleared at the end of each interval (0 = never)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Duration to wait in open state before transitioning to half-open
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
}

fn default_failure_threshold() -> u32 {
    10
}

fn default_max_half_open_requests() -> u32 {
    5
}

fn default_interval_ms() -> u64 {
    60_000
}

fn default_open_timeout_ms() -> u64 {
    10_000
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            max_half_open_requests: default_max_half_open_requests(),
            interval_ms: default_interval_ms(),
            open_timeout_ms: default_open_timeout_ms(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(ClientError::Config(
                "Circuit breaker failure_threshold must be > 0".to_string(),
            ));
        }
        if self.max_half_open_requests == 0 {
            return Err(ClientError::Config(
                "Circuit breaker max_half_open_requests must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Request counts for the current generation of a breaker.
///
/// Cleared on every state change and at the end of each closed interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    pub(crate) fn on_request(&mut self) {
        self.requests += 1;
    }

    /// Give back the slot of an admitted call without recording a result
    pub(crate) fn on_release(&mut self) {
        self.requests = self.requests.saturating_sub(1);
    }

    pub(crate) fn on_success(&mut self) {
        self.total_successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    pub(crate) fn on_failure(&mut self) {
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }

    pub(crate) fn clear(&mut self) {
        *self = Counts::default();
    }
}

/// Circuit breaker metrics, accumulated over the breaker's lifetime
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerMetrics {
    /// Total number of admitted requests
    pub total_requests: u64,
    /// Number of successful requests
    pub successful_requests: u64,
    /// Number of failed requests
    pub failed_requests: u64,
    /// Number of admitted requests settled without a result (cancelled or dropped)
    pub ignored_requests: u64,
    /// Number of requests rejected (circuit open or half-open quota reached)
    pub rejected_requests: u64,
    /// Number of times circuit opened
    pub circuit_opened_count: u64,
    /// Number of times circuit closed
    pub circuit_closed_count: u64,
    /// Number of times circuit half-opened
    pub circuit_half_opened_count: u64,
}

/// Why a breaker refused to run an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Circuit is open and the cool-down has not elapsed
    Open,
    /// Circuit is half-open and all trial slots are taken
    TooManyRequests,
}

impl Rejection {
    /// Convert into the caller-facing error for a destination
    pub fn into_error(self, destination: &str) -> ClientError {
        let destination = destination.to_string();
        match self {
            Rejection::Open => ClientError::CircuitOpen { destination },
            Rejection::TooManyRequests => ClientError::TooManyRequests { destination },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::Open => "open",
            Rejection::TooManyRequests => "too_many_requests",
        }
    }
}

/// How a finished call settles against its breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Healthy exchange with the destination
    Success,
    /// Counts against the destination
    Failure,
    /// Releases the call's slot without touching the counts
    Ignore,
}

/// Result of running an operation through a breaker
#[derive(Debug)]
pub enum BreakerOutcome<T, E> {
    /// Operation ran and succeeded
    Ok(T),
    /// Breaker refused the call, the operation was not invoked
    Rejected(Rejection),
    /// Operation ran and returned an error
    Err(E),
}

impl<T, E> BreakerOutcome<T, E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, BreakerOutcome::Rejected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "Closed");
        assert_eq!(CircuitState::Open.to_string(), "Open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HalfOpen");
    }

    #[test]
    fn test_default_config() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 10);
        assert_eq!(config.max_half_open_requests, 5);
        assert_eq!(config.interval(), Duration::from_secs(60));
        assert_eq!(config.open_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_counts_track_consecutive_runs() {
        let mut counts = Counts::default();
        counts.on_request();
        counts.on_failure();
        counts.on_request();
        counts.on_failure();
        assert_eq!(counts.consecutive_failures, 2);

        counts.on_request();
        counts.on_success();
        assert_eq!(counts.consecutive_failures, 0);
        assert_eq!(counts.consecutive_successes, 1);
        assert_eq!(counts.total_failures, 2);
        assert_eq!(counts.requests, 3);

        counts.on_request();
        counts.on_release();
        assert_eq!(counts.requests, 3);
        assert_eq!(counts.consecutive_successes, 1);

        counts.clear();
        assert_eq!(counts, Counts::default());
    }

    #[test]
    fn test_rejection_into_error() {
        let err = Rejection::Open.into_error("http://svc/a");
        assert!(matches!(err, ClientError::CircuitOpen { .. }));
        let err = Rejection::TooManyRequests.into_error("http://svc/a");
        assert!(matches!(err, ClientError::TooManyRequests { .. }));
    }
}
