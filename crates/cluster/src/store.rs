use std::collections::BTreeMap;

use bytes::Bytes;
use futures::future::try_join_all;
use halyard_object_store::keys::{
    BACKUP_FOLDER, INSTANCES_FOLDER, PRIMARY_CREDENTIALS_KEY, id_from_key, instance_key,
    public_key_key,
};
use halyard_object_store::{
    ObjectInfo, ObjectStore, ObjectStoreError, ObjectValue, latest_in_folder,
    store_with_retention,
};
use tracing::{debug, warn};

use crate::{Error, InstanceRecord, Result};

/// Typed access to the cluster keyspace.
#[derive(Clone, Debug)]
pub struct ClusterStore<S> {
    store: S,
}

impl<S> ClusterStore<S>
where
    S: ObjectStore,
{
    /// Wraps `store`.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub const fn inner(&self) -> &S {
        &self.store
    }

    /// Loads every persisted instance record, keyed by instance id.
    ///
    /// Records deleted between listing and reading are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or reading fails, or a record does not
    /// decode.
    pub async fn get_instances(&self) -> Result<BTreeMap<String, InstanceRecord>> {
        let listed = self
            .store
            .list_by_prefix(INSTANCES_FOLDER)
            .await
            .map_err(Error::store)?;

        let ids: Vec<String> = listed
            .iter()
            .filter_map(|object| id_from_key(INSTANCES_FOLDER, &object.name))
            .map(String::from)
            .collect();

        let records = try_join_all(ids.iter().map(|id| self.get_instance(id))).await?;

        Ok(ids
            .into_iter()
            .zip(records)
            .filter_map(|(id, record)| record.map(|record| (id, record)))
            .collect())
    }

    /// Loads one instance record.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the record does not decode.
    pub async fn get_instance(&self, instance_id: &str) -> Result<Option<InstanceRecord>> {
        let key = instance_key(instance_id);

        match self.store.get(key.clone()).await {
            Ok(value) => {
                let mut record: InstanceRecord = value
                    .to_json()
                    .map_err(|source| Error::Record { key, source })?;
                if record.instance_id.is_empty() {
                    record.instance_id = instance_id.to_string();
                }
                Ok(Some(record))
            }
            Err(e) if e.is_not_found() => {
                debug!("{key} vanished before it could be read");
                Ok(None)
            }
            Err(e) => Err(Error::store(e)),
        }
    }

    /// Writes an instance record under its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn put_instance(&self, record: &InstanceRecord) -> Result<()> {
        let value = ObjectValue::json(record)?;

        self.store
            .put(instance_key(&record.instance_id), value)
            .await
            .map_err(Error::store)
    }

    /// Deletes an instance record.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        self.store
            .delete(instance_key(instance_id))
            .await
            .map_err(Error::store)
    }

    /// Reads an instance's public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails for a reason other than absence.
    pub async fn get_public_key(&self, instance_id: &str) -> Result<Option<Bytes>> {
        match self.store.get(public_key_key(instance_id)).await {
            Ok(value) => Ok(Some(value.into_bytes())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(Error::store(e)),
        }
    }

    /// Stores an instance's public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn put_public_key(&self, instance_id: &str, key: Bytes) -> Result<()> {
        self.store
            .put(public_key_key(instance_id), ObjectValue::Bytes(key))
            .await
            .map_err(Error::store)
    }

    /// Deletes an instance's public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_public_key(&self, instance_id: &str) -> Result<()> {
        self.store
            .delete(public_key_key(instance_id))
            .await
            .map_err(Error::store)
    }

    /// Reads the credentials published by the primary.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails for a reason other than absence,
    /// or the object is not JSON.
    pub async fn get_primary_credentials(&self) -> Result<Option<serde_json::Value>> {
        match self.store.get(PRIMARY_CREDENTIALS_KEY).await {
            Ok(value) => value.to_json().map(Some).map_err(|source| Error::Record {
                key: PRIMARY_CREDENTIALS_KEY.to_string(),
                source,
            }),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(Error::store(e)),
        }
    }

    /// Publishes the primary's credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn put_primary_credentials(&self, credentials: serde_json::Value) -> Result<()> {
        self.store
            .put(PRIMARY_CREDENTIALS_KEY, ObjectValue::Json(credentials))
            .await
            .map_err(Error::store)
    }

    /// Stores a backup file, keeping the `max_copies` newest older backups.
    ///
    /// # Errors
    ///
    /// Returns an error if writing or listing fails. Failed deletes of old
    /// backups are only logged.
    pub async fn store_backup(
        &self,
        file_name: &str,
        contents: Bytes,
        max_copies: usize,
    ) -> Result<Vec<String>> {
        let deleted = store_with_retention(
            &self.store,
            BACKUP_FOLDER,
            file_name,
            ObjectValue::Bytes(contents),
            max_copies,
        )
        .await
        .map_err(Error::store)?;

        if !deleted.is_empty() {
            debug!("pruned {} old backups", deleted.len());
        }

        Ok(deleted)
    }

    /// The newest stored backup.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    pub async fn latest_backup(&self) -> Result<Option<ObjectInfo>> {
        latest_in_folder(&self.store, BACKUP_FOLDER)
            .await
            .map_err(Error::store)
    }

    /// Reads a backup file.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn get_backup(&self, name: &str) -> Result<Bytes> {
        let key = if name.starts_with(BACKUP_FOLDER) {
            name.to_string()
        } else {
            format!("{BACKUP_FOLDER}{name}")
        };

        self.store
            .get(key)
            .await
            .map(ObjectValue::into_bytes)
            .map_err(Error::store)
    }

    /// Deletes an instance record and its public key, logging failures.
    pub(crate) async fn purge_instance(&self, instance_id: &str) {
        let (record, key) = tokio::join!(
            self.delete_instance(instance_id),
            self.delete_public_key(instance_id)
        );

        if let Err(e) = record {
            warn!("failed to delete record of {instance_id}: {e}");
        }
        if let Err(e) = key {
            warn!("failed to delete public key of {instance_id}: {e}");
        }
    }
}
