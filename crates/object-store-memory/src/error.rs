use halyard_object_store::{ObjectStoreError, ObjectStoreErrorKind};
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// No object is stored under the key.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Injected failure for the key, used to exercise best-effort paths.
    #[error("injected failure for {0}")]
    Injected(String),
}

impl ObjectStoreError for Error {
    fn kind(&self) -> ObjectStoreErrorKind {
        match self {
            Self::NotFound(_) => ObjectStoreErrorKind::NotFound,
            Self::Injected(_) => ObjectStoreErrorKind::External,
        }
    }
}
