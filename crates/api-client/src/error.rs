//! REST client errors

use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a REST call
///
/// Variants fall into three classes: network (retryable), auth (needs a
/// fresh login) and decode (payload dropped).
#[derive(Error, Debug)]
pub enum ApiError {
    /// No identity in the session; the request was never sent
    #[error("not logged in")]
    Unauthenticated,

    #[error("transport error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    /// The server rejected the identity
    #[error("identity rejected (HTTP {0})")]
    Auth(StatusCode),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("response missing `{0}`")]
    MissingField(&'static str),

    /// The server refused the action, with its message
    #[error("request rejected (HTTP {status}): {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("invalid endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ApiError {
    /// Map a reqwest failure, separating out timeouts
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(err)
        }
    }

    /// Transport faults and server-side errors may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout => true,
            ApiError::Rejected { status, .. } => status.is_server_error(),
            _ => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Unauthenticated | ApiError::Auth(_))
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, ApiError::Decode(_) | ApiError::MissingField(_))
    }
}
