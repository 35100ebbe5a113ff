//! Outbound HTTP execution with a circuit breaker per destination.
//!
//! [`ClientBreaker`] is the entry point: it looks up (or lazily creates) the
//! breaker for a request's URL and runs the call through it. Every call
//! yields a [`Response`] carrying a body, an optional error and a status
//! code, whether the failure came from the breaker or the transport.

pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod observability;
pub mod proxy;
pub mod transport;

pub use circuit_breaker::{BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::{CallContext, Client, RequestArgs, Response};
pub use config::{ClientConfig, TransportConfig};
pub use error::{ClientError, Result, TransportError};
pub use observability::{init_tracing, LogFormat, StateChangeSink, TracingSink};
pub use proxy::ClientBreaker;
