use super::cache::SyncCache;
use super::documents::DocumentStore;
use super::error_log::ErrorBatch;
use super::remote::RemoteStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrphanReport {
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

/// Deletes the remote entry of every cached document that no longer exists.
/// This is the only place document deletion is noticed.
pub async fn collect_orphans(
    remote: &dyn RemoteStore,
    documents: &dyn DocumentStore,
    cache: &mut SyncCache,
    batch: &mut ErrorBatch,
) -> OrphanReport {
    let mut report = OrphanReport::default();
    for (path, key) in cache.snapshot() {
        match documents.exists(&path).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(err) => {
                batch.push(format!("{path}: could not check whether document exists: {err}"));
                report.failed.push(path);
                continue;
            }
        }
        match remote.delete(&key).await {
            Ok(()) => {
                cache.remove(&path);
                tracing::info!(%path, %key, "removed orphaned key");
                report.removed.push(path);
            }
            Err(err) => {
                batch.push(format!(
                    "{path}: failed to delete orphaned key \"{key}\": {err}"
                ));
                report.failed.push(path);
            }
        }
    }
    report
}
