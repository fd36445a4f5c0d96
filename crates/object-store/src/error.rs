use std::error::Error;
use std::fmt::{self, Debug};

/// Marker trait for `ObjectStore` errors
pub trait ObjectStoreError: Debug + Error + Send + Sync + 'static {
    /// Returns the kind of this error
    fn kind(&self) -> ObjectStoreErrorKind;

    /// Shorthand for `kind() == ObjectStoreErrorKind::NotFound`.
    fn is_not_found(&self) -> bool {
        self.kind() == ObjectStoreErrorKind::NotFound
    }
}

/// The kind of object store error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ObjectStoreErrorKind {
    /// The requested object does not exist.
    NotFound,

    /// The stored bytes could not be decoded for their content type.
    Decode,

    /// The remote storage service failed.
    External,

    /// Other/unknown error
    Other,
}

impl fmt::Display for ObjectStoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
