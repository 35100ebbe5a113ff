//! Request executor.
//!
//! Validates [`RequestArgs`], drives a [`Transport`] for one call and folds
//! every outcome into a [`Response`]. Only transport, timeout and
//! cancellation failures become errors; any status the peer returns is a
//! successful exchange.

pub mod args;
pub mod context;
pub mod response;

pub use args::RequestArgs;
pub use context::CallContext;
pub use response::Response;

use crate::config::TransportConfig;
use crate::error::{ClientError, Result};
use crate::metrics::Timer;
use crate::transport::{PooledRequest, ReqwestTransport, RequestPool, Transport, TransportError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Executes single calls against a shared transport
pub struct Client {
    transport: Arc<dyn Transport>,
    pool: RequestPool,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client backed by a reqwest transport
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self {
            transport: Arc::new(transport),
            pool: RequestPool::new(config.request_pool_capacity),
        })
    }

    /// Create a client over any transport
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            pool: RequestPool::default(),
        }
    }

    /// Pool the client draws requests from
    pub fn pool(&self) -> &RequestPool {
        &self.pool
    }

    /// Validate arguments without executing anything
    pub fn validate(&self, args: &RequestArgs) -> Result<()> {
        args.validate()
    }

    /// Execute a single call
    pub async fn execute(&self, ctx: &CallContext, args: &RequestArgs) -> Response {
        let mut request = self.pool.acquire();

        if let Err(e) = args.validate() {
            debug!(error = %e, "Rejecting invalid request arguments");
            return Response::failure(e);
        }

        if let Err(e) = prepare(&mut request, args) {
            debug!(error = %e, "Failed to build transport request");
            return Response::failure(ClientError::Validation(e.to_string()));
        }

        let timer = Timer::new(args.request_url(), args.method());
        let timeout = args.timeout();

        debug!(
            method = %args.method(),
            url = %args.request_url(),
            timeout_ms = timeout.as_millis() as u64,
            "Executing request"
        );

        let call = async {
            if timeout.is_zero() {
                self.transport.call(&request).await
            } else {
                self.transport.call_timeout(&request, timeout).await
            }
        };

        match ctx.run(call).await {
            Ok(Ok(resp)) => {
                debug!(
                    url = %args.request_url(),
                    status = resp.status,
                    elapsed_secs = timer.elapsed(),
                    "Request completed"
                );
                timer.record(resp.status);
                Response::success(resp.status, resp.body)
            }
            Ok(Err(e)) => {
                warn!(
                    method = %args.method(),
                    url = %args.request_url(),
                    error = %e,
                    "Request execution failed"
                );
                timer.record_error();
                Response::failure(ClientError::Execution(e))
            }
            Err(e) => {
                warn!(
                    method = %args.method(),
                    url = %args.request_url(),
                    error = %e,
                    "Request stopped by call context"
                );
                timer.record_error();
                Response::failure(e)
            }
        }
    }
}

/// Copy arguments into a pooled request
fn prepare(
    request: &mut PooledRequest<'_>,
    args: &RequestArgs,
) -> std::result::Result<(), TransportError> {
    request.set_uri(args.request_url());
    request.set_method(args.method())?;

    if let Some(body) = args.body() {
        request.set_body(body);
    }
    if let Some(header) = args.header() {
        for (name, value) in header {
            request.add_header(name, value)?;
        }
    }

    Ok(())
}
