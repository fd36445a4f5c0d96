//! Abstract interface for blob storage of cluster state.
//!
//! Objects live under a handful of folders (`instances/`, `public_keys/`,
//! `credentials/`, `backup/`). Values carry their content type so that a
//! round trip through the store gives back the same shape: raw bytes, a JSON
//! document, or plain text.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
pub mod keys;
mod retention;
mod uri;
mod value;

pub use error::{ObjectStoreError, ObjectStoreErrorKind};
pub use retention::{latest_in_folder, store_with_retention};
pub use uri::{GsUri, UriError, parse_gs_uri};
pub use value::{ContentType, DecodeError, ObjectValue};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Listing entry for a stored object.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObjectInfo {
    /// Full object name, including the folder prefix.
    pub name: String,

    /// When the object was last written.
    pub updated_at: DateTime<Utc>,
}

/// A trait representing a content-type-aware key/value blob store.
///
/// # Required Methods
/// - `get`: Reads and decodes an object. Missing keys are an error of kind
///   `ObjectStoreErrorKind::NotFound`.
/// - `put`: Overwrites an object, inferring the content type from the value.
/// - `delete`: Removes an object. Backends may fail when the key is missing.
/// - `list_by_prefix`: Lists objects whose names start with a prefix.
#[async_trait]
pub trait ObjectStore: Clone + Send + Sync + 'static {
    /// The error type for store operations.
    type Error: ObjectStoreError;

    /// Reads the object stored under `key`.
    async fn get<K>(&self, key: K) -> Result<ObjectValue, Self::Error>
    where
        K: Into<String> + Send;

    /// Writes `value` under `key`, replacing any previous object.
    async fn put<K>(&self, key: K, value: ObjectValue) -> Result<(), Self::Error>
    where
        K: Into<String> + Send;

    /// Deletes the object stored under `key`.
    async fn delete<K>(&self, key: K) -> Result<(), Self::Error>
    where
        K: Into<String> + Send;

    /// Lists every object whose name starts with `prefix`.
    async fn list_by_prefix<P>(&self, prefix: P) -> Result<Vec<ObjectInfo>, Self::Error>
    where
        P: Into<String> + Send;
}
