use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::{ObjectInfo, ObjectStore, ObjectValue};

/// Writes `value` to `folder/name` and prunes older copies in the folder.
///
/// The existing objects other than the one just written are sorted oldest
/// first and deleted from the front until at most `max_copies` remain, so the
/// folder ends up holding the new object plus the `max_copies` newest prior
/// copies. Objects with equal timestamps keep their listing order.
///
/// Deletion failures are logged and skipped. The names of the objects that
/// were actually deleted are returned.
///
/// # Errors
///
/// Returns an error if writing the new object or listing the folder fails.
pub async fn store_with_retention<S>(
    store: &S,
    folder: &str,
    name: &str,
    value: ObjectValue,
    max_copies: usize,
) -> Result<Vec<String>, S::Error>
where
    S: ObjectStore,
{
    let key = format!("{folder}{name}");

    store.put(key.clone(), value).await?;
    debug!("stored {key}, pruning {folder} to {max_copies} prior copies");

    let mut objects: Vec<ObjectInfo> = store
        .list_by_prefix(folder)
        .await?
        .into_iter()
        .filter(|object| object.name != key)
        .collect();

    if objects.len() <= max_copies {
        return Ok(Vec::new());
    }

    // Stable sort: ties keep listing order.
    objects.sort_by_key(|object| object.updated_at);
    let excess = objects.len() - max_copies;

    let doomed: Vec<String> = objects
        .into_iter()
        .take(excess)
        .map(|object| object.name)
        .collect();

    let results = join_all(doomed.iter().map(|name| store.delete(name.clone()))).await;

    let mut deleted = Vec::with_capacity(doomed.len());
    for (name, result) in doomed.into_iter().zip(results) {
        match result {
            Ok(()) => {
                info!("deleted old copy {name}");
                deleted.push(name);
            }
            Err(e) => warn!("failed to delete old copy {name}: {e}"),
        }
    }

    Ok(deleted)
}

/// Returns the most recently updated object in `folder`, if any.
///
/// # Errors
///
/// Returns an error if listing the folder fails.
pub async fn latest_in_folder<S>(store: &S, folder: &str) -> Result<Option<ObjectInfo>, S::Error>
where
    S: ObjectStore,
{
    Ok(store
        .list_by_prefix(folder)
        .await?
        .into_iter()
        .max_by_key(|object| object.updated_at))
}
