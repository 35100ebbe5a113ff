use crate::error::ClientError;
use bytes::Bytes;

/// Uniform result of a call.
///
/// Exactly one outcome: either `err` is `None` and `code` is the peer's
/// status (4xx/5xx included), or `err` is set and `code` carries the best
/// known classification for it.
#[derive(Debug, Default)]
pub struct Response {
    pub body: Bytes,
    pub err: Option<ClientError>,
    pub code: u16,
}

impl Response {
    /// A completed HTTP exchange
    pub fn success(code: u16, body: Bytes) -> Self {
        Self {
            body,
            err: None,
            code,
        }
    }

    /// A failed call, classified by its error
    pub fn failure(err: ClientError) -> Self {
        Self {
            body: Bytes::new(),
            code: err.status_code(),
            err: Some(err),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.err.is_none()
    }

    /// Convert into a `Result` of status code and body
    pub fn into_result(self) -> crate::error::Result<(u16, Bytes)> {
        match self.err {
            Some(err) => Err(err),
            None => Ok((self.code, self.body)),
        }
    }
}
