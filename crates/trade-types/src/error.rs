//! Decode errors for push frames and REST payloads

use thiserror::Error;

/// A payload that could not be turned into a typed value
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not valid UTF-8")]
    Utf8,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("unknown frame kind `{0}`")]
    UnknownKind(String),

    #[error("frame does not match any known event shape")]
    Unclassified,
}
