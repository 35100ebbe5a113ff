use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::circuit_breaker::CircuitState;
use crate::error::{ClientError, Result};

/// Receives a human-readable line for every breaker state transition
pub trait StateChangeSink: Send + Sync {
    fn print(&self, message: &str);
}

impl<F> StateChangeSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn print(&self, message: &str) {
        self(message)
    }
}

/// Sink that forwards transition messages to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl StateChangeSink for TracingSink {
    fn print(&self, message: &str) {
        info!(target: "httpbreaker::circuit_breaker", "{}", message);
    }
}

/// Shared handle to a sink
pub type SharedSink = Arc<dyn StateChangeSink>;

/// Default sink used when the caller does not supply one
pub fn default_sink() -> SharedSink {
    Arc::new(TracingSink)
}

/// Message reported when a breaker changes state
pub fn state_change_message(destination: &str, from: CircuitState, to: CircuitState) -> String {
    format!(
        "circuit breaker {} changed state from {} to {}",
        destination, from, to
    )
}

/// Output format for the fmt subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Initialize tracing/logging
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "httpbreaker=debug".into());

    let installed = match format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .try_init(),
    };

    installed.map_err(|e| ClientError::Config(format!("Failed to install subscriber: {}", e)))?;

    info!(?format, "Tracing initialized");

    Ok(())
}
