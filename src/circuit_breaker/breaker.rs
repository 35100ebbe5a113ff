use super::types::{
    BreakerOutcome, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState, Counts, Rejection,
    Verdict,
};
use crate::metrics;
use crate::observability::{state_change_message, SharedSink};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker for a single destination
pub struct CircuitBreaker {
    /// Configuration
    config: CircuitBreakerConfig,
    /// Current state. Never held across an await.
    state: Mutex<State>,
    /// Destination identifier
    name: String,
    /// Receives a line per state transition
    sink: SharedSink,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct State {
    /// Current circuit state
    circuit_state: CircuitState,
    /// Bumped on every state change and closed-interval rollover
    generation: u64,
    /// Counts for the current generation
    counts: Counts,
    /// End of the closed interval or of the open cool-down
    expiry: Option<Instant>,
    /// Transitions not yet reported to the sink
    pending: Vec<(CircuitState, CircuitState)>,
    /// Metrics
    metrics: CircuitBreakerMetrics,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, sink: SharedSink) -> Self {
        let name = name.into();
        info!(
            destination = %name,
            failure_threshold = config.failure_threshold,
            max_half_open_requests = config.max_half_open_requests,
            open_timeout_ms = config.open_timeout_ms,
            interval_ms = config.interval_ms,
            "Creating circuit breaker"
        );

        let mut state = State {
            circuit_state: CircuitState::Closed,
            generation: 0,
            counts: Counts::default(),
            expiry: None,
            pending: Vec::new(),
            metrics: CircuitBreakerMetrics::default(),
        };
        state.expiry = closed_expiry(&config, Instant::now());

        Self {
            config,
            state: Mutex::new(state),
            name,
            sink,
        }
    }

    /// Destination this breaker guards
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` through the breaker, counting every `Err` as a failure
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> BreakerOutcome<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_classified(operation, |_| Verdict::Failure).await
    }

    /// Run `operation` through the breaker.
    ///
    /// `classify` decides how an error settles: only [`Verdict::Failure`]
    /// counts against the destination, [`Verdict::Success`] records a healthy
    /// exchange and [`Verdict::Ignore`] hands the slot back without a result.
    /// Errors are returned unchanged whatever the verdict. When the breaker
    /// rejects the call, `operation` is not invoked.
    pub async fn execute_classified<F, Fut, T, E, P>(
        &self,
        operation: F,
        classify: P,
    ) -> BreakerOutcome<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnOnce(&E) -> Verdict,
    {
        let generation = match self.before_request() {
            Ok(generation) => generation,
            Err(rejection) => return BreakerOutcome::Rejected(rejection),
        };

        // A call dropped before it finishes gives its slot back
        let mut in_flight = InFlight {
            breaker: self,
            generation,
            settled: false,
        };

        let result = operation().await;
        let verdict = match &result {
            Ok(_) => Verdict::Success,
            Err(e) => classify(e),
        };
        in_flight.settle(verdict);

        match result {
            Ok(value) => BreakerOutcome::Ok(value),
            Err(e) => BreakerOutcome::Err(e),
        }
    }

    /// Get current state, applying any transition that is due
    pub fn state(&self) -> CircuitState {
        let mut state = self.lock();
        let (circuit_state, _) = self.current_state(&mut state, Instant::now());
        self.notify(state);
        circuit_state
    }

    /// Counts for the current generation
    pub fn counts(&self) -> Counts {
        let mut state = self.lock();
        self.current_state(&mut state, Instant::now());
        let counts = state.counts;
        self.notify(state);
        counts
    }

    /// Get metrics
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.lock().metrics.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit or reject a call, returning the generation it was admitted in
    fn before_request(&self) -> Result<u64, Rejection> {
        let mut state = self.lock();
        let now = Instant::now();
        let (circuit_state, generation) = self.current_state(&mut state, now);

        let admitted = match circuit_state {
            CircuitState::Open => {
                debug!(
                    destination = %self.name,
                    time_remaining = ?state.expiry.map(|e| e.saturating_duration_since(now)),
                    "Circuit breaker open, rejecting request"
                );
                Err(Rejection::Open)
            }
            CircuitState::HalfOpen
                if state.counts.requests >= self.config.max_half_open_requests =>
            {
                debug!(
                    destination = %self.name,
                    max = self.config.max_half_open_requests,
                    "Max half-open requests reached, rejecting"
                );
                Err(Rejection::TooManyRequests)
            }
            _ => {
                state.counts.on_request();
                state.metrics.total_requests += 1;
                Ok(generation)
            }
        };

        if let Err(rejection) = admitted {
            state.metrics.rejected_requests += 1;
            metrics::record_circuit_breaker_rejection(&self.name, rejection);
        }

        self.notify(state);
        admitted
    }

    /// Account for the result of a call admitted in `before`
    fn after_request(&self, before: u64, verdict: Verdict) {
        let mut state = self.lock();
        let now = Instant::now();
        let (circuit_state, generation) = self.current_state(&mut state, now);

        if generation != before {
            debug!(
                destination = %self.name,
                admitted_generation = before,
                generation,
                "Ignoring result from a previous generation"
            );
            self.notify(state);
            return;
        }

        match verdict {
            Verdict::Success => self.on_success(&mut state, circuit_state, now),
            Verdict::Failure => self.on_failure(&mut state, circuit_state, now),
            Verdict::Ignore => {
                state.counts.on_release();
                state.metrics.ignored_requests += 1;
                debug!(
                    destination = %self.name,
                    state = %circuit_state,
                    "Call settled without a result, releasing its slot"
                );
            }
        }

        self.notify(state);
    }

    fn on_success(&self, state: &mut State, circuit_state: CircuitState, now: Instant) {
        state.metrics.successful_requests += 1;

        match circuit_state {
            CircuitState::Closed => {
                state.counts.on_success();
            }
            CircuitState::HalfOpen => {
                state.counts.on_success();

                debug!(
                    destination = %self.name,
                    consecutive_successes = state.counts.consecutive_successes,
                    threshold = self.config.max_half_open_requests,
                    "Half-open trial request succeeded"
                );

                if state.counts.consecutive_successes >= self.config.max_half_open_requests {
                    self.set_state(state, CircuitState::Closed, now);
                }
            }
            CircuitState::Open => {
                warn!(destination = %self.name, "Recording success in open state");
            }
        }
    }

    fn on_failure(&self, state: &mut State, circuit_state: CircuitState, now: Instant) {
        state.metrics.failed_requests += 1;

        match circuit_state {
            CircuitState::Closed => {
                state.counts.on_failure();

                debug!(
                    destination = %self.name,
                    consecutive_failures = state.counts.consecutive_failures,
                    threshold = self.config.failure_threshold,
                    "Request failed in closed state"
                );

                if state.counts.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        destination = %self.name,
                        consecutive_failures = state.counts.consecutive_failures,
                        "Failure threshold reached, tripping circuit"
                    );
                    self.set_state(state, CircuitState::Open, now);
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    destination = %self.name,
                    "Half-open trial request failed, reopening circuit"
                );
                self.set_state(state, CircuitState::Open, now);
            }
            CircuitState::Open => {
                debug!(destination = %self.name, "Recording failure in open state");
            }
        }
    }

    /// Resolve the state at `now`, applying lazy transitions
    fn current_state(&self, state: &mut State, now: Instant) -> (CircuitState, u64) {
        match state.circuit_state {
            CircuitState::Closed => {
                if matches!(state.expiry, Some(expiry) if expiry <= now) {
                    debug!(destination = %self.name, "Closed interval elapsed, clearing counts");
                    self.new_generation(state, now);
                }
            }
            CircuitState::Open => {
                if matches!(state.expiry, Some(expiry) if expiry <= now) {
                    self.set_state(state, CircuitState::HalfOpen, now);
                }
            }
            CircuitState::HalfOpen => {}
        }

        (state.circuit_state, state.generation)
    }

    fn set_state(&self, state: &mut State, to: CircuitState, now: Instant) {
        let from = state.circuit_state;
        if from == to {
            return;
        }

        info!(
            destination = %self.name,
            from = %from,
            to = %to,
            "Circuit breaker changing state"
        );

        state.circuit_state = to;
        self.new_generation(state, now);

        match to {
            CircuitState::Open => state.metrics.circuit_opened_count += 1,
            CircuitState::HalfOpen => state.metrics.circuit_half_opened_count += 1,
            CircuitState::Closed => state.metrics.circuit_closed_count += 1,
        }

        state.pending.push((from, to));
    }

    fn new_generation(&self, state: &mut State, now: Instant) {
        state.generation += 1;
        state.counts.clear();
        state.expiry = match state.circuit_state {
            CircuitState::Closed => closed_expiry(&self.config, now),
            CircuitState::Open => Some(now + self.config.open_timeout()),
            CircuitState::HalfOpen => None,
        };
    }

    /// Release the lock, then report queued transitions
    fn notify(&self, mut state: MutexGuard<'_, State>) {
        let pending = std::mem::take(&mut state.pending);
        drop(state);

        for (from, to) in pending {
            metrics::record_circuit_breaker_transition(&self.name, from, to);
            metrics::record_circuit_breaker_state(&self.name, to);
            self.sink.print(&state_change_message(&self.name, from, to));
        }
    }
}

fn closed_expiry(config: &CircuitBreakerConfig, now: Instant) -> Option<Instant> {
    if config.interval_ms == 0 {
        None
    } else {
        Some(now + config.interval())
    }
}

/// Settles an admitted call exactly once, releasing its slot if it is dropped early
struct InFlight<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(&mut self, verdict: Verdict) {
        self.settled = true;
        self.breaker.after_request(self.generation, verdict);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.after_request(self.generation, Verdict::Ignore);
        }
    }
}
