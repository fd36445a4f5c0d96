use std::error::Error as StdError;

use thiserror::Error;

/// Marker trait for pub/sub errors.
pub trait PubSubError: StdError + Send + Sync + 'static {
    /// Broad classification of the failure.
    fn kind(&self) -> PubSubErrorKind;
}

/// Broad classification of pub/sub failures.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PubSubErrorKind {
    /// Topic or subscription does not exist.
    NotFound,

    /// The remote service failed or could not be reached.
    External,

    /// Anything else.
    Other,
}

/// Errors decoding a message envelope.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The `data` field is not valid base64.
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),

    /// The envelope says JSON but the body does not parse.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Text payload is not UTF-8.
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}
