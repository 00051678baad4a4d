//! Error types for the CRM integration client.
//!
//! # Design
//! Three layers of failure are kept apart. `TransportError` means no usable
//! response was obtained. `BackendError` means the backend answered with a
//! non-2xx status; on a conflict it carries the id the backend reported so
//! callers can recover the existing record without another round-trip.
//! Everything else (payload encoding, unexpected response shapes) lands in
//! `Error` directly.

use serde_json::Value;
use thiserror::Error;

/// Failure to obtain or read an HTTP response.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request exceeded the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(#[source] ureq::Error),

    /// DNS resolution or the TCP connection failed.
    #[error("connection failed: {0}")]
    Connect(#[source] ureq::Error),

    /// Any other failure while sending the request or reading the response.
    #[error("request failed: {0}")]
    Request(#[source] ureq::Error),

    /// The response body was not empty and not valid JSON.
    #[error("malformed response body: {0}")]
    MalformedBody(#[source] serde_json::Error),
}

impl From<ureq::Error> for TransportError {
    fn from(err: ureq::Error) -> Self {
        let wrap: fn(ureq::Error) -> TransportError = match &err {
            ureq::Error::Timeout(_) => TransportError::Timeout,
            ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => TransportError::Connect,
            ureq::Error::Io(io) => match io.kind() {
                std::io::ErrorKind::TimedOut => TransportError::Timeout,
                std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted => TransportError::Connect,
                _ => TransportError::Request,
            },
            _ => TransportError::Request,
        };
        wrap(err)
    }
}

/// The backend answered with a status outside 200..300.
#[derive(Debug, Error)]
#[error("backend error ({status})")]
pub struct BackendError {
    pub status: u16,
    /// `id` from the response body, present on conflicts for existing records.
    pub conflicting_id: Option<String>,
    pub body: Value,
}

impl BackendError {
    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }
}

/// Errors returned by client operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A payload could not be encoded or a response could not be decoded
    /// into the expected type.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A successful response lacked a field the operation depends on.
    #[error("unexpected response body: {0}")]
    UnexpectedBody(String),

    /// An epoch value outside the representable date range.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}

impl Error {
    /// HTTP status of a backend failure, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Backend(err) => Some(err.status),
            _ => None,
        }
    }
}
