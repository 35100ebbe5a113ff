use super::retry::{RetryConfig, RetryExecutor};
use super::{Transport, TransportError, TransportRequest, TransportResponse};
use crate::config::TransportConfig;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use http::Method;
use std::time::Duration;
use tracing::debug;

/// `Transport` backed by a pooled `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    retry: RetryExecutor,
    default_timeout: Option<Duration>,
    dial_timeout: Duration,
}

impl ReqwestTransport {
    /// Build a transport from configuration
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(config.max_conns_per_host)
            .pool_idle_timeout(config.idle_keep_alive())
            .connect_timeout(config.dial_timeout());

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }

        let client = builder
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let retry = RetryExecutor::new(RetryConfig {
            max_attempts: config.max_idempotent_call_attempts,
            initial_backoff: config.retry_backoff(),
            ..Default::default()
        });

        debug!(
            max_conns_per_host = config.max_conns_per_host,
            idle_keep_alive_ms = config.idle_keep_alive_ms,
            dial_timeout_ms = config.dial_timeout_ms,
            max_idempotent_call_attempts = config.max_idempotent_call_attempts,
            "Created reqwest transport"
        );

        Ok(Self {
            client,
            retry,
            default_timeout: config.default_timeout(),
            dial_timeout: config.dial_timeout(),
        })
    }

    /// Build a transport with default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(&TransportConfig::default())
    }

    async fn send(
        &self,
        request: &TransportRequest,
        timeout: Option<Duration>,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let url = url::Url::parse(request.uri()).map_err(|e| {
            TransportError::InvalidRequest(format!("url {:?}: {}", request.uri(), e))
        })?;
        let method = request.method().clone();
        let idempotent = is_idempotent(&method);
        let body = request.body_bytes();

        let attempt = || {
            let mut builder = self
                .client
                .request(method.clone(), url.clone())
                .headers(request.headers().clone());
            if !body.is_empty() {
                builder = builder.body(body.clone());
            }
            if let Some(timeout) = timeout {
                builder = builder.timeout(timeout);
            }
            let dial_timeout = self.dial_timeout;

            async move {
                let response = builder
                    .send()
                    .await
                    .map_err(|e| classify(e, timeout, dial_timeout))?;
                let status = response.status().as_u16();
                let body = response.bytes().await.map_err(|e| {
                    if e.is_timeout() {
                        TransportError::Timeout(timeout.unwrap_or_default())
                    } else {
                        TransportError::Request {
                            status,
                            message: e.to_string(),
                        }
                    }
                })?;
                Ok(TransportResponse { status, body })
            }
        };

        if idempotent {
            self.retry.execute(attempt, TransportError::is_connect).await
        } else {
            attempt().await
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn call(
        &self,
        request: &TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        self.send(request, self.default_timeout).await
    }

    async fn call_timeout(
        &self,
        request: &TransportRequest,
        timeout: Duration,
    ) -> std::result::Result<TransportResponse, TransportError> {
        self.send(request, Some(timeout)).await
    }
}

/// Methods that may be re-sent after a failed dial
fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
    )
}

fn classify(
    e: reqwest::Error,
    timeout: Option<Duration>,
    dial_timeout: Duration,
) -> TransportError {
    if e.is_connect() {
        if e.is_timeout() {
            return TransportError::Connect(format!("dial timed out after {:?}", dial_timeout));
        }
        return TransportError::Connect(e.to_string());
    }
    if e.is_timeout() {
        return TransportError::Timeout(timeout.unwrap_or_default());
    }
    if e.is_builder() {
        return TransportError::InvalidRequest(e.to_string());
    }
    TransportError::Request {
        status: e.status().map(|s| s.as_u16()).unwrap_or(0),
        message: e.to_string(),
    }
}
