// pg-r2-backup/src/backup/retention.rs
use tracing::{debug, info};

use super::object_store::{ObjectStore, RemoteObject};
use crate::errors::Result;

/// Returns the objects that fall outside the newest `keep`, oldest first.
///
/// Objects are ranked by last-modified time, newest first. The sort is
/// stable, so objects with equal timestamps keep their listing order.
pub fn select_for_deletion(mut objects: Vec<RemoteObject>, keep: usize) -> Vec<RemoteObject> {
    objects.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
    if objects.len() <= keep {
        return Vec::new();
    }
    let mut excess = objects.split_off(keep);
    excess.reverse();
    excess
}

/// Deletes every backup under `prefix` beyond the newest `keep` and returns
/// the deleted keys.
///
/// Stops at the first failed deletion; objects already deleted stay deleted.
pub async fn prune(store: &dyn ObjectStore, prefix: &str, keep: usize) -> Result<Vec<String>> {
    let objects = store.list(prefix).await?;
    let listed = objects.len();
    let doomed = select_for_deletion(objects, keep);
    info!(
        "Found {} backup(s) under prefix '{}', keeping {}",
        listed,
        prefix,
        listed.min(keep)
    );

    let mut deleted = Vec::with_capacity(doomed.len());
    for object in doomed {
        debug!(
            "Deleting {} ({} bytes, last modified {})",
            object.key, object.size, object.last_modified
        );
        store.delete(&object.key).await?;
        info!("Deleted old backup: {}", object.key);
        deleted.push(object.key);
    }
    Ok(deleted)
}
