//! HTTP error types.

use thiserror::Error;

/// The request bytes could not be turned into a [`Request`](super::Request).
///
/// Every variant is answered with `400 Bad Request`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed request: missing header delimiter")]
    MissingDelimiter,

    #[error("malformed request: header block is not valid UTF-8")]
    InvalidEncoding,

    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),

    #[error("malformed Content-Length: {0:?}")]
    InvalidContentLength(String),
}
