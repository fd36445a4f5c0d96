//! In-memory (single process) implementation of the object store for tests
//! and local development.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use halyard_object_store::{ContentType, ObjectInfo, ObjectStore, ObjectValue};
use tokio::sync::Mutex;

#[derive(Clone, Debug)]
struct StoredObject {
    bytes: Bytes,
    content_type: ContentType,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<String, StoredObject>,
    failing_deletes: HashSet<String>,
}

/// In-memory object store. Clones share the same objects.
#[derive(Clone, Debug, Default)]
pub struct MemoryObjectStore {
    state: Arc<Mutex<State>>,
}

impl MemoryObjectStore {
    /// Creates a new, empty `MemoryObjectStore`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes an object with an explicit modification time.
    pub async fn put_at<K: Into<String>>(
        &self,
        key: K,
        value: ObjectValue,
        updated_at: DateTime<Utc>,
    ) {
        self.state.lock().await.objects.insert(
            key.into(),
            StoredObject {
                bytes: value.encode(),
                content_type: value.content_type(),
                updated_at,
            },
        );
    }

    /// Makes every later `delete` of `key` fail.
    pub async fn fail_deletes_for<K: Into<String>>(&self, key: K) {
        self.state.lock().await.failing_deletes.insert(key.into());
    }

    /// Returns the names of all stored objects.
    pub async fn names(&self) -> Vec<String> {
        self.state.lock().await.objects.keys().cloned().collect()
    }

    /// Returns whether an object exists under `key`.
    pub async fn contains(&self, key: &str) -> bool {
        self.state.lock().await.objects.contains_key(key)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    type Error = Error;

    async fn get<K>(&self, key: K) -> Result<ObjectValue, Self::Error>
    where
        K: Into<String> + Send,
    {
        let key = key.into();
        let state = self.state.lock().await;
        let object = state.objects.get(&key).ok_or(Error::NotFound(key))?;

        // Only values written through `ObjectValue::encode` live here, so the
        // decode matches the encode.
        Ok(ObjectValue::decode(object.bytes.clone(), object.content_type)
            .unwrap_or_else(|_| ObjectValue::Bytes(object.bytes.clone())))
    }

    async fn put<K>(&self, key: K, value: ObjectValue) -> Result<(), Self::Error>
    where
        K: Into<String> + Send,
    {
        self.put_at(key, value, Utc::now()).await;
        Ok(())
    }

    async fn delete<K>(&self, key: K) -> Result<(), Self::Error>
    where
        K: Into<String> + Send,
    {
        let key = key.into();
        let mut state = self.state.lock().await;

        if state.failing_deletes.contains(&key) {
            return Err(Error::Injected(key));
        }

        state
            .objects
            .remove(&key)
            .map(|_| ())
            .ok_or(Error::NotFound(key))
    }

    async fn list_by_prefix<P>(&self, prefix: P) -> Result<Vec<ObjectInfo>, Self::Error>
    where
        P: Into<String> + Send,
    {
        let prefix = prefix.into();
        let state = self.state.lock().await;

        Ok(state
            .objects
            .iter()
            .filter(|(name, _)| name.starts_with(&prefix))
            .map(|(name, object)| ObjectInfo {
                name: name.clone(),
                updated_at: object.updated_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use halyard_object_store::ObjectStoreError;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_and_get_keep_shape() {
        let store = MemoryObjectStore::new();

        store
            .put("instances/a", ObjectValue::from(json!({"isPrimary": true})))
            .await
            .unwrap();
        store.put("public_keys/a", ObjectValue::from("ssh-rsa AAA")).await.unwrap();
        store
            .put("backup/a.ucs", ObjectValue::from(Bytes::from_static(b"\x1f\x8b")))
            .await
            .unwrap();

        assert_eq!(
            store.get("instances/a").await.unwrap(),
            ObjectValue::Json(json!({"isPrimary": true}))
        );
        assert_eq!(
            store.get("public_keys/a").await.unwrap(),
            ObjectValue::Text("ssh-rsa AAA".to_string())
        );
        assert_eq!(
            store.get("backup/a.ucs").await.unwrap(),
            ObjectValue::Bytes(Bytes::from_static(b"\x1f\x8b"))
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let store = MemoryObjectStore::new();

        let err = store.get("instances/missing").await.unwrap_err();
        assert!(err.is_not_found());

        let err = store.delete("instances/missing").await.unwrap_err();
        assert_matches!(err, Error::NotFound(_));
    }

    #[tokio::test]
    async fn test_list_by_prefix_only_returns_folder() {
        let store = MemoryObjectStore::new();
        store.put("instances/a", ObjectValue::from("a")).await.unwrap();
        store.put("instances/b", ObjectValue::from("b")).await.unwrap();
        store.put("public_keys/a", ObjectValue::from("k")).await.unwrap();

        let names: Vec<String> = store
            .list_by_prefix("instances/")
            .await
            .unwrap()
            .into_iter()
            .map(|info| info.name)
            .collect();

        assert_eq!(names, vec!["instances/a", "instances/b"]);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryObjectStore::new();
        let other = store.clone();

        store.put("credentials/primary", ObjectValue::from("x")).await.unwrap();

        assert!(other.contains("credentials/primary").await);
    }
}
