//! Error taxonomy for dispatch-server calls.

use depot_core::error::CoreError;

/// Errors returned by [`DispatchClient`](crate::DispatchClient) operations.
///
/// "No job available" is not an error: `request_job` reports it as
/// `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A caller-supplied argument was rejected before any network call.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The HTTP exchange itself failed (connect, DNS, TLS, timeout),
    /// after the retry policy was exhausted.
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// `request` or `isempty` answered with a status other than 200.
    #[error("Request against server unsuccessful ({status}): {reason}")]
    Request {
        /// HTTP status code.
        status: u16,
        /// Reason phrase for the status.
        reason: String,
    },

    /// `submit` or `complete` answered with a non-2xx status.
    #[error("Dispatch server returned HTTP {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 200 response that breaks the response contract, e.g. a missing
    /// required field or a body that is not JSON.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Client configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<CoreError> for DispatchError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            CoreError::UnexpectedResponse(msg) => Self::UnexpectedResponse(msg),
        }
    }
}
