//! Layout of the cluster keyspace.

/// Folder holding one record per cluster instance.
pub const INSTANCES_FOLDER: &str = "instances/";

/// Folder holding raw public key material per instance.
pub const PUBLIC_KEYS_FOLDER: &str = "public_keys/";

/// Folder holding credential singletons.
pub const CREDENTIALS_FOLDER: &str = "credentials/";

/// Folder holding configuration backups.
pub const BACKUP_FOLDER: &str = "backup/";

/// Key of the credentials published by the elected primary.
pub const PRIMARY_CREDENTIALS_KEY: &str = "credentials/primary";

/// Key of an instance record.
#[must_use]
pub fn instance_key(instance_id: &str) -> String {
    format!("{INSTANCES_FOLDER}{instance_id}")
}

/// Key of an instance's public key.
#[must_use]
pub fn public_key_key(instance_id: &str) -> String {
    format!("{PUBLIC_KEYS_FOLDER}{instance_id}")
}

/// Key of a backup file.
#[must_use]
pub fn backup_key(file_name: &str) -> String {
    format!("{BACKUP_FOLDER}{file_name}")
}

/// Strips `folder` from an object name, returning the bare id.
#[must_use]
pub fn id_from_key<'a>(folder: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(folder).filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_round_trip_ids() {
        let key = instance_key("bigip-1");
        assert_eq!(key, "instances/bigip-1");
        assert_eq!(id_from_key(INSTANCES_FOLDER, &key), Some("bigip-1"));
        assert_eq!(id_from_key(INSTANCES_FOLDER, "instances/"), None);
        assert_eq!(id_from_key(INSTANCES_FOLDER, "backup/x.ucs"), None);
    }
}
