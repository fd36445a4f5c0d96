use bytes::Bytes;
use chrono::{TimeZone, Utc};
use halyard_object_store::keys::BACKUP_FOLDER;
use halyard_object_store::{ObjectStore, ObjectValue, latest_in_folder, store_with_retention};
use halyard_object_store_memory::MemoryObjectStore;

async fn seed_backups(store: &MemoryObjectStore) {
    let backups = [
        ("backup/ucsAutosave_123.ucs", 1),
        ("backup/ucsAutosave_234.ucs", 2),
        ("backup/ucsAutosave_345.ucs", 3),
        ("backup/ucsAutosave_456.ucs", 4),
    ];

    for (name, day) in backups {
        store
            .put_at(
                name,
                ObjectValue::from(Bytes::from_static(b"ucs")),
                Utc.with_ymd_and_hms(2019, 1, day, 0, 0, 0).unwrap(),
            )
            .await;
    }
}

#[tokio::test]
async fn test_prunes_two_oldest_of_four() {
    let store = MemoryObjectStore::new();
    seed_backups(&store).await;

    let mut deleted = store_with_retention(
        &store,
        BACKUP_FOLDER,
        "ucsAutosave_567.ucs",
        ObjectValue::from(Bytes::from_static(b"new")),
        2,
    )
    .await
    .unwrap();
    deleted.sort();

    assert_eq!(
        deleted,
        vec!["backup/ucsAutosave_123.ucs", "backup/ucsAutosave_234.ucs"]
    );
    assert_eq!(
        store.names().await,
        vec![
            "backup/ucsAutosave_345.ucs",
            "backup/ucsAutosave_456.ucs",
            "backup/ucsAutosave_567.ucs",
        ]
    );
}

#[tokio::test]
async fn test_nothing_pruned_under_limit() {
    let store = MemoryObjectStore::new();
    seed_backups(&store).await;

    let deleted = store_with_retention(
        &store,
        BACKUP_FOLDER,
        "ucsAutosave_567.ucs",
        ObjectValue::from(Bytes::from_static(b"new")),
        10,
    )
    .await
    .unwrap();

    assert!(deleted.is_empty());
    assert_eq!(store.names().await.len(), 5);
}

#[tokio::test]
async fn test_delete_failures_are_skipped() {
    let store = MemoryObjectStore::new();
    seed_backups(&store).await;
    store.fail_deletes_for("backup/ucsAutosave_123.ucs").await;

    let deleted = store_with_retention(
        &store,
        BACKUP_FOLDER,
        "ucsAutosave_567.ucs",
        ObjectValue::from(Bytes::from_static(b"new")),
        2,
    )
    .await
    .unwrap();

    assert_eq!(deleted, vec!["backup/ucsAutosave_234.ucs"]);
    assert!(store.contains("backup/ucsAutosave_123.ucs").await);
}

#[tokio::test]
async fn test_latest_in_folder() {
    let store = MemoryObjectStore::new();
    assert!(latest_in_folder(&store, BACKUP_FOLDER).await.unwrap().is_none());

    seed_backups(&store).await;
    store
        .put("instances/not-a-backup", ObjectValue::from("x"))
        .await
        .unwrap();

    let latest = latest_in_folder(&store, BACKUP_FOLDER).await.unwrap().unwrap();
    assert_eq!(latest.name, "backup/ucsAutosave_456.ucs");
}
