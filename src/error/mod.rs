use http::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid request arguments: {0}")]
    Validation(String),

    #[error("Circuit breaker is open for destination: {destination}")]
    CircuitOpen { destination: String },

    #[error("Too many half-open requests for destination: {destination}")]
    TooManyRequests { destination: String },

    #[error("Execution failed: {0}")]
    Execution(#[source] TransportError),

    #[error("Call deadline exceeded")]
    DeadlineExceeded,

    #[error("Call cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Status code reported alongside this error in a `Response`.
    ///
    /// Failures that happen before any network attempt map to 400. Execution
    /// failures carry whatever status the transport last observed, or 0.
    pub fn status_code(&self) -> u16 {
        match self {
            ClientError::Validation(_)
            | ClientError::CircuitOpen { .. }
            | ClientError::TooManyRequests { .. }
            | ClientError::Config(_) => StatusCode::BAD_REQUEST.as_u16(),
            ClientError::Execution(e) => e.status(),
            ClientError::DeadlineExceeded | ClientError::Cancelled => 0,
        }
    }

    /// True when the breaker refused the call without running it
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ClientError::CircuitOpen { .. } | ClientError::TooManyRequests { .. }
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::Validation(_))
    }

    /// True for connectivity and timeout failures, the only errors that
    /// count against a destination's breaker
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, ClientError::Execution(_) | ClientError::DeadlineExceeded)
    }

    /// True when the caller gave up on the call itself
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }
}

/// Errors raised by a `Transport` while performing a single exchange
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("dial failed: {0}")]
    Connect(String),

    #[error("request failed: {message}")]
    Request { status: u16, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Last status code observed before the failure (0 if none was received)
    pub fn status(&self) -> u16 {
        match self {
            TransportError::Request { status, .. } => *status,
            _ => 0,
        }
    }

    /// Connect-class failures are safe to retry for idempotent methods
    pub fn is_connect(&self) -> bool {
        matches!(self, TransportError::Connect(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ClientError::Validation("url".to_string()).status_code(),
            400
        );
        assert_eq!(
            ClientError::CircuitOpen {
                destination: "http://svc/a".to_string()
            }
            .status_code(),
            400
        );
        assert_eq!(
            ClientError::Execution(TransportError::Connect("refused".to_string())).status_code(),
            0
        );
        assert_eq!(
            ClientError::Execution(TransportError::Request {
                status: 502,
                message: "body read".to_string()
            })
            .status_code(),
            502
        );
        assert_eq!(ClientError::DeadlineExceeded.status_code(), 0);
    }

    #[test]
    fn test_error_classification() {
        let open = ClientError::CircuitOpen {
            destination: "http://svc/a".to_string(),
        };
        assert!(open.is_rejection());
        assert!(!open.is_execution_failure());

        let busy = ClientError::TooManyRequests {
            destination: "http://svc/a".to_string(),
        };
        assert!(busy.is_rejection());

        let exec = ClientError::Execution(TransportError::Timeout(Duration::from_secs(1)));
        assert!(exec.is_execution_failure());
        assert!(!exec.is_rejection());

        assert!(ClientError::Validation("method".to_string()).is_validation());
        assert!(ClientError::DeadlineExceeded.is_execution_failure());
        assert!(!ClientError::Cancelled.is_execution_failure());
        assert!(ClientError::Cancelled.is_cancellation());
        assert!(!ClientError::DeadlineExceeded.is_cancellation());
    }

    #[test]
    fn test_error_display() {
        let err = ClientError::Execution(TransportError::Connect("connection refused".to_string()));
        assert_eq!(
            err.to_string(),
            "Execution failed: dial failed: connection refused"
        );

        let err = ClientError::CircuitOpen {
            destination: "http://svc/a".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Circuit breaker is open for destination: http://svc/a"
        );
    }
}
