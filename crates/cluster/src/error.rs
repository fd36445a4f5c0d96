use halyard_compute::ComputeError;
use halyard_messaging::PubSubError;
use halyard_object_store::{DecodeError, ObjectStoreError};
use thiserror::Error;

/// Errors that can occur in this crate.
///
/// Backend errors are boxed so one error type serves every combination of
/// store, compute and pub/sub backends.
#[derive(Debug, Error)]
pub enum Error {
    /// A background task panicked or was aborted.
    #[error("background task failed: {0}")]
    BackgroundTask(#[from] tokio::task::JoinError),

    /// Compute inventory or labelling failed.
    #[error("compute: {0}")]
    Compute(Box<dyn ComputeError>),

    /// The provider configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The external tag filter is not of the form `key=value`.
    #[error("invalid external tag {0:?}, expected key=value")]
    InvalidTag(String),

    /// Pub/sub call failed.
    #[error("messaging: {0}")]
    PubSub(Box<dyn PubSubError>),

    /// A stored object does not hold the expected document.
    #[error("invalid object {key}: {source}")]
    Record {
        /// The object's key.
        key: String,

        /// Why it does not decode.
        source: DecodeError,
    },

    /// A value could not be serialized.
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),

    /// Object store call failed.
    #[error("object store: {0}")]
    Store(Box<dyn ObjectStoreError>),
}

impl Error {
    pub(crate) fn compute<E: ComputeError>(error: E) -> Self {
        Self::Compute(Box::new(error))
    }

    pub(crate) fn pubsub<E: PubSubError>(error: E) -> Self {
        Self::PubSub(Box::new(error))
    }

    pub(crate) fn store<E: ObjectStoreError>(error: E) -> Self {
        Self::Store(Box::new(error))
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
