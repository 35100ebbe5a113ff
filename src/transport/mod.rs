//! Transport collaborator.
//!
//! The executor hands a pooled [`TransportRequest`] to a [`Transport`] and
//! gets back a status code and body, or a [`TransportError`]. Connection
//! pooling, dialing and idempotent retries live behind this seam.

pub mod pool;
pub mod reqwest_transport;
pub mod retry;

pub use pool::{PooledRequest, RequestPool};
pub use reqwest_transport::ReqwestTransport;
pub use retry::{RetryConfig, RetryExecutor};

pub use crate::error::TransportError;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::time::Duration;

/// A reusable outbound request
#[derive(Debug, Default)]
pub struct TransportRequest {
    uri: String,
    method: Method,
    headers: HeaderMap,
    body: BytesMut,
}

impl TransportRequest {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn set_uri(&mut self, uri: &str) {
        self.uri.clear();
        self.uri.push_str(uri);
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Set the method. Verbs are case-sensitive; extension methods are allowed.
    pub fn set_method(&mut self, method: &str) -> Result<(), TransportError> {
        self.method = Method::from_bytes(method.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("method {:?}: {}", method, e)))?;
        Ok(())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Append a header, keeping any existing values for the same name
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<(), TransportError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("header name {:?}: {}", name, e)))?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            TransportError::InvalidRequest(format!("header {:?} value: {}", name.as_str(), e))
        })?;
        self.headers.append(name, value);
        Ok(())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn set_body(&mut self, body: &[u8]) {
        self.body.clear();
        self.body.extend_from_slice(body);
    }

    /// Copy of the body suitable for handing to a client
    pub fn body_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.body)
    }

    /// Clear for reuse, keeping allocated capacity
    pub fn reset(&mut self) {
        self.uri.clear();
        self.method = Method::GET;
        self.headers.clear();
        self.body.clear();
    }
}

/// Response to a completed HTTP exchange, whatever its status class
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Executes a single HTTP exchange
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the call with the transport's default timeout
    async fn call(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError>;

    /// Perform the call, giving up after `timeout`
    async fn call_timeout(
        &self,
        request: &TransportRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}
