//! Error types for the request pipeline.
//!
//! # Design
//! Each failure kind is its own type so a caller can match on exactly what
//! went wrong, and `ApiError` wraps them for the completion result. The
//! `Display` text of every error is the user-facing category only; structured
//! detail (status codes, transport causes) stays in fields and accessors.
//! `StatusCodeError` in particular never prints its numeric code.

use std::fmt;
use std::io;

use thiserror::Error;

/// What went wrong below HTTP: the request never produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connecting, resolving or talking to the peer failed.
    Connection,
    /// The transport gave up waiting.
    Timeout,
    /// The operation was cancelled through its handle.
    Cancelled,
    /// The wire request could not be expressed by the transport.
    InvalidRequest,
    /// Local I/O failed while streaming the body.
    Io,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::Connection => "connection",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Cancelled => "cancelled",
            TransportErrorKind::InvalidRequest => "invalid request",
            TransportErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

/// Network-level failure reported by the transport.
#[derive(Debug, Clone, Error)]
#[error("network request failed")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(TransportErrorKind::Cancelled, "operation cancelled")
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// The transport's own description of the cause.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A response arrived but its status is outside the accepted range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("the server could not complete the request")]
pub struct StatusCodeError {
    code: u16,
}

impl StatusCodeError {
    pub fn new(code: u16) -> Self {
        Self { code }
    }

    pub fn code(&self) -> u16 {
        self.code
    }
}

/// The response body could not be turned into the requested type, or a
/// request body could not be encoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("the data could not be read: {message}")]
pub struct ConversionError {
    message: String,
}

impl ConversionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn missing_data() -> Self {
        Self::new("missing data")
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for ConversionError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Everything a completion can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Status(#[from] StatusCodeError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The transport completed with neither a body nor an error, or dropped
    /// its completion without calling it.
    #[error("an internal error occurred")]
    InvariantViolation,

    /// Moving a downloaded file into place failed.
    #[error("the downloaded file could not be saved")]
    Filesystem(#[source] io::Error),
}

impl ApiError {
    /// The HTTP status that caused the failure, if it was a status failure.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status(err) => Some(err.code()),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Transport(err) if err.kind() == TransportErrorKind::Cancelled)
    }
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;
