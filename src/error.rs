use thiserror::Error;

use crate::response::Response;
use crate::transport::TransportError;

/// Result type for httpwire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for httpwire
#[derive(Error, Debug)]
pub enum Error {
    /// Connectivity or protocol-negotiation failure below HTTP semantics
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A structurally valid response with an error status, raised when the
    /// client is configured to treat HTTP errors as failures
    #[error("HTTP error response: {} {}", .0.status(), .0.reason_phrase())]
    HttpStatus(Box<Response>),

    /// Status code outside the valid 100-999 range
    #[error("status code must be a three digit number, got {0}")]
    InvalidStatus(u16),

    /// URL parsing errors
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Malformed wire message or body
    #[error("malformed message: {0}")]
    Malformed(String),

    /// I/O errors while reading or buffering bodies
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The status code of the error response, if this is an HTTP error.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus(response) => Some(response.status()),
            _ => None,
        }
    }

    /// The error response itself, if this is an HTTP error.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Error::HttpStatus(response) => Some(response),
            _ => None,
        }
    }

    /// Consume the error, returning the response if this is an HTTP error.
    pub fn into_response(self) -> Option<Response> {
        match self {
            Error::HttpStatus(response) => Some(*response),
            _ => None,
        }
    }

    /// Check if this is a transport-level failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Check if this is an HTTP error status.
    pub fn is_http_status(&self) -> bool {
        matches!(self, Error::HttpStatus(_))
    }
}
