pub mod breaker;
pub mod registry;
pub mod types;

pub use breaker::CircuitBreaker;
pub use registry::BreakerRegistry;
pub use types::{
    BreakerOutcome, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState, Counts, Rejection,
    Verdict,
};
