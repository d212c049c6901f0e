use thiserror::Error;

use crate::common::types::RequestId;

/// Failure reported by the transport layer for one task.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("Timeout")]
    Timeout,
    #[error("Task cancelled")]
    Cancelled,
    #[error("Transport session invalidated")]
    SessionInvalidated,
}

impl TransportError {
    /// Creates an HTTP error from a generic string
    pub fn http<S: Into<String>>(msg: S) -> Self {
        Self::Http(msg.into())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(error.to_string())
        }
    }
}

/// Terminal error delivered to a consumer through `finish_loading`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("Response MIME type could not be resolved (got {mime:?})")]
    UnresolvableContentType { mime: Option<String> },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Transport finished after {delivered} of {expected} bytes")]
    PrematureCompletion { delivered: u64, expected: u64 },
    #[error("Origin answered with HTTP {status}")]
    HttpStatus { status: u16 },
    #[error("Origin ignored the Range header (HTTP {status})")]
    RangeNotHonoured { status: u16 },
    #[error("Invalid byte window: offset={offset}, length={length:?}")]
    InvalidRange { offset: u64, length: Option<u64> },
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Request {0} is already loading")]
    DuplicateRequest(RequestId),
}

pub type LoadResult<T> = Result<T, LoadError>;
