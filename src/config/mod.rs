use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,
    /// Policy applied to every newly created circuit breaker
    #[serde(default)]
    pub breaker: CircuitBreakerConfig,
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Maximum number of connections kept per destination host
    #[serde(default = "default_max_conns_per_host")]
    pub max_conns_per_host: usize,

    /// How long an idle keep-alive connection may stay in the pool
    #[serde(default = "default_idle_keep_alive_ms")]
    pub idle_keep_alive_ms: u64,

    /// Total attempts for idempotent methods when the dial fails
    #[serde(default = "default_max_idempotent_call_attempts")]
    pub max_idempotent_call_attempts: u32,

    /// TCP dial timeout
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,

    /// Timeout used when a call does not set its own (none = unbounded)
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,

    /// Initial backoff between idempotent attempts
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// User-Agent header value. No header is sent when unset.
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Number of idle pooled requests kept for reuse
    #[serde(default = "default_request_pool_capacity")]
    pub request_pool_capacity: usize,
}

fn default_max_conns_per_host() -> usize {
    512
}

fn default_idle_keep_alive_ms() -> u64 {
    10_000
}

fn default_max_idempotent_call_attempts() -> u32 {
    5
}

fn default_dial_timeout_ms() -> u64 {
    3_000
}

fn default_retry_backoff_ms() -> u64 {
    10
}

fn default_request_pool_capacity() -> usize {
    256
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_conns_per_host: default_max_conns_per_host(),
            idle_keep_alive_ms: default_idle_keep_alive_ms(),
            max_idempotent_call_attempts: default_max_idempotent_call_attempts(),
            dial_timeout_ms: default_dial_timeout_ms(),
            default_timeout_ms: None,
            retry_backoff_ms: default_retry_backoff_ms(),
            user_agent: None,
            request_pool_capacity: default_request_pool_capacity(),
        }
    }
}

impl TransportConfig {
    pub fn idle_keep_alive(&self) -> Duration {
        Duration::from_millis(self.idle_keep_alive_ms)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Set maximum number of connections per host
    pub fn with_max_conns_per_host(mut self, max_conns_per_host: usize) -> Self {
        self.max_conns_per_host = max_conns_per_host;
        self
    }

    /// Set idle lifetime of keep-alive connections
    pub fn with_idle_keep_alive(mut self, duration: Duration) -> Self {
        self.idle_keep_alive_ms = duration.as_millis() as u64;
        self
    }

    /// Set total attempts for idempotent calls
    pub fn with_max_idempotent_call_attempts(mut self, attempts: u32) -> Self {
        self.max_idempotent_call_attempts = attempts;
        self
    }

    /// Set the dial timeout
    pub fn with_dial_timeout(mut self, duration: Duration) -> Self {
        self.dial_timeout_ms = duration.as_millis() as u64;
        self
    }

    pub fn with_default_timeout(mut self, duration: Duration) -> Self {
        self.default_timeout_ms = Some(duration.as_millis() as u64);
        self
    }

    pub fn with_retry_backoff(mut self, duration: Duration) -> Self {
        self.retry_backoff_ms = duration.as_millis() as u64;
        self
    }
}

impl ClientConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ClientError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.transport.max_conns_per_host == 0 {
            return Err(ClientError::Config(
                "max_conns_per_host must be > 0".to_string(),
            ));
        }

        if self.transport.max_idempotent_call_attempts == 0 {
            return Err(ClientError::Config(
                "max_idempotent_call_attempts must be > 0".to_string(),
            ));
        }

        if let Some(user_agent) = &self.transport.user_agent {
            if http::HeaderValue::from_str(user_agent).is_err() {
                return Err(ClientError::Config(format!(
                    "Invalid user agent: {}",
                    user_agent
                )));
            }
        }

        self.breaker.validate()
    }
}
