use crate::error::{ClientError, Result};
use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method};
use std::collections::HashMap;
use std::time::Duration;

/// Arguments for a single outbound call
///
/// `timeout` of zero defers to the transport's default timeout.
#[derive(Debug, Clone, Default)]
pub struct RequestArgs {
    request_url: String,
    method: String,
    body: Option<Bytes>,
    header: Option<HashMap<String, String>>,
    timeout: Duration,
}

impl RequestArgs {
    pub fn new(method: impl Into<String>, request_url: impl Into<String>) -> Self {
        Self {
            request_url: request_url.into(),
            method: method.into(),
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Add a header. Keys are unique; a repeated key replaces the earlier value.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, header: HashMap<String, String>) -> Self {
        self.header = Some(header);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Destination URL, also the key of the destination's circuit breaker
    pub fn request_url(&self) -> &str {
        &self.request_url
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn header(&self) -> Option<&HashMap<String, String>> {
        self.header.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check the arguments before anything touches the network
    pub fn validate(&self) -> Result<()> {
        if self.request_url.trim().is_empty() {
            return Err(ClientError::Validation("request_url is required".to_string()));
        }
        if self.method.trim().is_empty() {
            return Err(ClientError::Validation("method is required".to_string()));
        }

        Method::from_bytes(self.method.as_bytes()).map_err(|_| {
            ClientError::Validation(format!("invalid method: {:?}", self.method))
        })?;

        if let Some(header) = &self.header {
            for (name, value) in header {
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                    ClientError::Validation(format!("invalid header name: {:?}", name))
                })?;
                HeaderValue::from_str(value).map_err(|_| {
                    ClientError::Validation(format!("invalid value for header {:?}", name))
                })?;
            }
        }

        Ok(())
    }
}
