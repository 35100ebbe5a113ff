//! Circuit breaker proxy.
//!
//! Routes every call through the breaker of its destination (the request
//! URL) and always answers with a [`Response`], whether the failure came
//! from the breaker or from the transport.

use crate::circuit_breaker::{BreakerOutcome, BreakerRegistry, CircuitBreakerConfig, Verdict};
use crate::client::{CallContext, Client, RequestArgs, Response};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::observability::SharedSink;
use std::sync::Arc;
use tracing::{debug, warn};

/// HTTP client guarded by one circuit breaker per destination
#[derive(Debug, Clone)]
pub struct ClientBreaker {
    client: Arc<Client>,
    registry: Arc<BreakerRegistry>,
}

impl ClientBreaker {
    /// Wrap `client`, creating breakers with the default policy
    pub fn new(client: Arc<Client>, sink: SharedSink) -> Self {
        Self::with_registry(
            client,
            Arc::new(BreakerRegistry::new(CircuitBreakerConfig::default(), sink)),
        )
    }

    /// Wrap `client` with an existing registry
    pub fn with_registry(client: Arc<Client>, registry: Arc<BreakerRegistry>) -> Self {
        Self { client, registry }
    }

    /// Build the client, transport and registry from configuration
    pub fn from_config(config: &ClientConfig, sink: SharedSink) -> Result<Self> {
        config.validate()?;
        let client = Client::new(&config.transport)?;
        let registry = BreakerRegistry::new(config.breaker.clone(), sink);
        Ok(Self::with_registry(Arc::new(client), Arc::new(registry)))
    }

    pub fn registry(&self) -> &BreakerRegistry {
        &self.registry
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Execute a call through the destination's circuit breaker
    pub async fn execute(&self, ctx: &CallContext, args: RequestArgs) -> Response {
        // Invalid arguments never reach the registry
        if let Err(e) = self.client.validate(&args) {
            debug!(error = %e, "Rejecting invalid request arguments");
            return Response::failure(e);
        }

        let breaker = self.registry.get_or_create(args.request_url());

        let outcome = breaker
            .execute_classified(
                || async {
                    let resp = self.client.execute(ctx, &args).await;
                    if resp.err.is_some() {
                        Err(resp)
                    } else {
                        Ok(resp)
                    }
                },
                |resp: &Response| classify(resp.err.as_ref()),
            )
            .await;

        match outcome {
            BreakerOutcome::Ok(resp) => resp,
            BreakerOutcome::Err(resp) => resp,
            BreakerOutcome::Rejected(rejection) => {
                warn!(
                    destination = %args.request_url(),
                    reason = rejection.as_str(),
                    "Circuit breaker rejected request"
                );
                Response::failure(rejection.into_error(args.request_url()))
            }
        }
    }
}

/// Settle a finished call: only connectivity and timeout failures count
/// against the destination, a caller's own cancellation counts for nothing
fn classify(err: Option<&ClientError>) -> Verdict {
    match err {
        Some(e) if e.is_execution_failure() => Verdict::Failure,
        Some(e) if e.is_cancellation() => Verdict::Ignore,
        _ => Verdict::Success,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::observability::default_sink;
    use crate::transport::{Transport, TransportError, TransportRequest, TransportResponse};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Transport whose availability can be flipped at runtime
    #[derive(Default)]
    struct SwitchTransport {
        down: AtomicBool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Transport for SwitchTransport {
        async fn call(
            &self,
            _request: &TransportRequest,
        ) -> std::result::Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                Err(TransportError::Connect("connection refused".to_string()))
            } else {
                Ok(TransportResponse {
                    status: 200,
                    body: Bytes::from_static(b"ok"),
                })
            }
        }

        async fn call_timeout(
            &self,
            request: &TransportRequest,
            _timeout: Duration,
        ) -> std::result::Result<TransportResponse, TransportError> {
            self.call(request).await
        }
    }

    fn proxy(transport: Arc<SwitchTransport>) -> ClientBreaker {
        ClientBreaker::new(Arc::new(Client::with_transport(transport)), default_sink())
    }

    #[tokio::test]
    async fn test_success_propagates_unchanged() {
        let transport = Arc::new(SwitchTransport::default());
        let proxy = proxy(transport);

        let resp = proxy
            .execute(&CallContext::default(), RequestArgs::new("GET", "http://svc/a"))
            .await;

        assert!(resp.is_ok());
        assert_eq!(resp.code, 200);
        assert_eq!(resp.body, Bytes::from_static(b"ok"));
    }

    #[tokio::test]
    async fn test_invalid_args_create_no_breaker() {
        let transport = Arc::new(SwitchTransport::default());
        let proxy = proxy(transport.clone());

        let resp = proxy
            .execute(&CallContext::default(), RequestArgs::new(" ", "http://svc/a"))
            .await;

        assert!(resp.err.unwrap().is_validation());
        assert_eq!(resp.code, 400);
        assert!(proxy.registry().is_empty());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_eleventh_call_is_rejected_without_transport() {
        let transport = Arc::new(SwitchTransport::default());
        transport.down.store(true, Ordering::SeqCst);
        let proxy = proxy(transport.clone());
        let ctx = CallContext::default();

        for _ in 0..10 {
            let resp = proxy.execute(&ctx, RequestArgs::new("GET", "http://svc/a")).await;
            assert!(matches!(resp.err, Some(ClientError::Execution(_))));
            assert_eq!(resp.code, 0);
        }
        assert_eq!(proxy.registry().state("http://svc/a"), CircuitState::Open);

        let resp = proxy.execute(&ctx, RequestArgs::new("GET", "http://svc/a")).await;
        assert!(matches!(resp.err, Some(ClientError::CircuitOpen { .. })));
        assert_eq!(resp.code, 400);
        assert!(resp.body.is_empty());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_after_cool_down() {
        let transport = Arc::new(SwitchTransport::default());
        transport.down.store(true, Ordering::SeqCst);
        let proxy = proxy(transport.clone());
        let ctx = CallContext::default();
        let url = "http://svc/a";

        for _ in 0..10 {
            proxy.execute(&ctx, RequestArgs::new("GET", url)).await;
        }
        assert_eq!(proxy.registry().state(url), CircuitState::Open);

        transport.down.store(false, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(10)).await;

        let resp = proxy.execute(&ctx, RequestArgs::new("GET", url)).await;
        assert!(resp.is_ok());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 11);
        assert_eq!(proxy.registry().state(url), CircuitState::HalfOpen);

        for _ in 0..4 {
            assert!(proxy.execute(&ctx, RequestArgs::new("GET", url)).await.is_ok());
        }
        assert_eq!(proxy.registry().state(url), CircuitState::Closed);
        let breaker = proxy.registry().get(url).unwrap();
        assert_eq!(breaker.counts().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_error_statuses_do_not_trip() {
        struct ErrorStatusTransport;

        #[async_trait]
        impl Transport for ErrorStatusTransport {
            async fn call(
                &self,
                _request: &TransportRequest,
            ) -> std::result::Result<TransportResponse, TransportError> {
                Ok(TransportResponse {
                    status: 500,
                    body: Bytes::new(),
                })
            }

            async fn call_timeout(
                &self,
                request: &TransportRequest,
                _timeout: Duration,
            ) -> std::result::Result<TransportResponse, TransportError> {
                self.call(request).await
            }
        }

        let proxy = ClientBreaker::new(
            Arc::new(Client::with_transport(Arc::new(ErrorStatusTransport))),
            default_sink(),
        );
        let ctx = CallContext::default();

        for _ in 0..25 {
            let resp = proxy.execute(&ctx, RequestArgs::new("GET", "http://svc/a")).await;
            assert!(resp.is_ok());
            assert_eq!(resp.code, 500);
        }

        let breaker = proxy.registry().get("http://svc/a").unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.counts().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_destinations_are_isolated() {
        let transport = Arc::new(SwitchTransport::default());
        transport.down.store(true, Ordering::SeqCst);
        let proxy = proxy(transport.clone());
        let ctx = CallContext::default();

        for _ in 0..10 {
            proxy.execute(&ctx, RequestArgs::new("GET", "http://svc/a")).await;
        }
        transport.down.store(false, Ordering::SeqCst);

        let resp = proxy.execute(&ctx, RequestArgs::new("GET", "http://svc/b")).await;
        assert!(resp.is_ok());
        assert_eq!(proxy.registry().state("http://svc/a"), CircuitState::Open);
        assert_eq!(proxy.registry().state("http://svc/b"), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_from_config_uses_breaker_policy() {
        let mut config = ClientConfig::default();
        config.breaker.failure_threshold = 3;

        let proxy = ClientBreaker::from_config(&config, default_sink()).unwrap();
        let breaker = proxy.registry().get_or_create("http://svc/a");
        assert_eq!(breaker.config().failure_threshold, 3);
    }

    #[tokio::test]
    async fn test_cancelled_calls_do_not_trip() {
        let transport = Arc::new(SwitchTransport::default());
        let proxy = proxy(transport.clone());

        let token = CancellationToken::new();
        token.cancel();
        let cancelled = CallContext::default().with_cancellation(token);

        for _ in 0..10 {
            let resp = proxy
                .execute(&cancelled, RequestArgs::new("GET", "http://svc/a"))
                .await;
            assert!(matches!(resp.err, Some(ClientError::Cancelled)));
        }

        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(proxy.registry().state("http://svc/a"), CircuitState::Closed);
        let breaker = proxy.registry().get_or_create("http://svc/a");
        assert_eq!(breaker.counts().consecutive_failures, 0);
        assert_eq!(breaker.metrics().ignored_requests, 10);

        let resp = proxy
            .execute(&CallContext::default(), RequestArgs::new("GET", "http://svc/a"))
            .await;
        assert!(resp.is_ok());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_deadline_counts_as_failure() {
        let transport = Arc::new(SwitchTransport::default());
        let proxy = proxy(transport);
        let expired = CallContext::default().with_deadline(tokio::time::Instant::now());

        for _ in 0..10 {
            let resp = proxy
                .execute(&expired, RequestArgs::new("GET", "http://svc/a"))
                .await;
            assert!(matches!(resp.err, Some(ClientError::DeadlineExceeded)));
        }

        assert_eq!(proxy.registry().state("http://svc/a"), CircuitState::Open);
    }

    #[test]
    fn test_classify() {
        let refused = ClientError::Execution(TransportError::Connect("refused".to_string()));
        assert_eq!(classify(Some(&refused)), Verdict::Failure);
        assert_eq!(classify(Some(&ClientError::DeadlineExceeded)), Verdict::Failure);
        assert_eq!(classify(Some(&ClientError::Cancelled)), Verdict::Ignore);
        assert_eq!(
            classify(Some(&ClientError::Validation("url".to_string()))),
            Verdict::Success
        );
        assert_eq!(classify(None), Verdict::Success);
    }
}
