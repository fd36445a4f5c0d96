use halyard_object_store::{DecodeError, ObjectStoreError, ObjectStoreErrorKind, UriError};
use thiserror::Error;

/// Errors from the Cloud Storage backend.
#[derive(Debug, Error)]
pub enum Error {
    /// The storage API call failed.
    #[error(transparent)]
    Api(#[from] halyard_metadata::Error),

    /// The object does not match its stored content type.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The object location is not a valid `gs://` URI.
    #[error(transparent)]
    Uri(#[from] UriError),
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Self::Api(error.into())
    }
}

impl ObjectStoreError for Error {
    fn kind(&self) -> ObjectStoreErrorKind {
        match self {
            Self::Api(e) if e.is_not_found() => ObjectStoreErrorKind::NotFound,
            Self::Api(_) => ObjectStoreErrorKind::External,
            Self::Decode(_) => ObjectStoreErrorKind::Decode,
            Self::Uri(_) => ObjectStoreErrorKind::Other,
        }
    }
}
