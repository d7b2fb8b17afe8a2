use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use super::cache::{CacheError, SyncCache};
use super::documents::{DocumentError, DocumentStore};
use super::duplicates::resolve_duplicates;
use super::error_log::{ErrorBatch, ErrorLog};
use super::metadata::MetadataFields;
use super::orphans::collect_orphans;
use super::reconcile::{SyncOutcome, SyncPlan, apply_plan, plan_sync};
use super::remote::RemoteStore;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("document store error: {0}")]
    Document(#[from] DocumentError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

/// What to do with a document that wants to be synced but has no id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingIdPolicy {
    /// Skip it and report an error naming the document.
    #[default]
    Report,
    /// Skip it quietly.
    Skip,
    /// Write a fresh id into the document, then sync it.
    Generate,
}

impl MissingIdPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "report" => Some(Self::Report),
            "skip" => Some(Self::Skip),
            "generate" => Some(Self::Generate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSettings {
    pub fields: MetadataFields,
    pub missing_id: MissingIdPolicy,
}

/// Aggregate result of a bulk pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub ids_reassigned: usize,
    pub orphans_removed: usize,
    pub orphans_failed: usize,
    pub messages: Vec<String>,
}

impl BulkReport {
    fn record(mut self, outcome: &SyncOutcome) -> Self {
        match outcome {
            SyncOutcome::Skipped => self.skipped += 1,
            SyncOutcome::Acted(actions) if actions.is_ok() => self.succeeded += 1,
            _ => self.failed += 1,
        }
        self
    }
}

/// Owns the sync cache and drives every reconciliation. Callers serialize
/// access, so no two reconciliations overlap.
pub struct SyncEngine {
    remote: Arc<dyn RemoteStore>,
    documents: Arc<dyn DocumentStore>,
    cache: SyncCache,
    error_log: ErrorLog,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        documents: Arc<dyn DocumentStore>,
        cache: SyncCache,
        error_log: ErrorLog,
        settings: SyncSettings,
    ) -> Self {
        Self {
            remote,
            documents,
            cache,
            error_log,
            settings,
        }
    }

    pub fn cache(&self) -> &SyncCache {
        &self.cache
    }

    /// Reconciles one document, logs any failure right away and persists the
    /// cache if it changed.
    pub async fn sync_document(&mut self, path: &str) -> SyncOutcome {
        let outcome = self.reconcile_path(path).await;
        let messages = outcome.error_messages(path);
        if !messages.is_empty() {
            self.error_log.record(&messages).await;
        }
        if self.cache.is_dirty() {
            self.save_cache().await;
        }
        outcome
    }

    /// Duplicate resolution, then every document in path order, then orphan
    /// cleanup. Failures are collected into one error-log entry and the cache
    /// is saved once at the end.
    pub async fn sync_all(&mut self) -> Result<BulkReport, EngineError> {
        let mut batch = ErrorBatch::default();
        let result = self.sync_all_into(&mut batch).await;
        if self.cache.is_dirty() {
            self.save_cache().await;
        }
        self.error_log.flush(batch).await;
        result
    }

    async fn sync_all_into(&mut self, batch: &mut ErrorBatch) -> Result<BulkReport, EngineError> {
        let duplicates =
            resolve_duplicates(self.documents.as_ref(), &self.settings.fields, batch).await?;
        let unresolved: HashSet<String> = duplicates.unresolved.into_iter().collect();

        let mut report = BulkReport {
            ids_reassigned: duplicates.reassigned.len(),
            ..BulkReport::default()
        };
        for path in self.documents.list_paths().await? {
            let outcome = if unresolved.contains(&path) {
                SyncOutcome::SkippedWithError(format!(
                    "{path}: skipped because its duplicate key could not be resolved"
                ))
            } else {
                self.reconcile_path(&path).await
            };
            batch.extend(outcome.error_messages(&path));
            report = report.record(&outcome);
        }

        let orphans = collect_orphans(
            self.remote.as_ref(),
            self.documents.as_ref(),
            &mut self.cache,
            batch,
        )
        .await;
        report.orphans_removed = orphans.removed.len();
        report.orphans_failed = orphans.failed.len();

        report.messages = batch.messages().to_vec();
        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            ids_reassigned = report.ids_reassigned,
            orphans_removed = report.orphans_removed,
            "bulk sync finished"
        );
        Ok(report)
    }

    /// Best-effort save before the process exits.
    pub async fn shutdown(&mut self) {
        if self.cache.is_dirty() {
            self.save_cache().await;
        }
    }

    async fn reconcile_path(&mut self, path: &str) -> SyncOutcome {
        let document = match self.documents.read(path).await {
            Ok(document) => document,
            Err(err) => {
                return SyncOutcome::SkippedWithError(format!(
                    "{path}: failed to read document: {err}"
                ));
            }
        };
        let mut content = document.as_ref().map(|doc| doc.content.clone());
        let mut metadata = document
            .as_ref()
            .and_then(|doc| doc.metadata(&self.settings.fields));

        let mut plan = plan_sync(metadata.as_ref(), self.cache.get(path));
        if plan == SyncPlan::MissingId {
            match self.settings.missing_id {
                MissingIdPolicy::Report => {}
                MissingIdPolicy::Skip => return SyncOutcome::Skipped,
                MissingIdPolicy::Generate => {
                    let id = Uuid::new_v4().to_string();
                    if let Err(err) = self
                        .documents
                        .set_metadata_field(path, &self.settings.fields.id, &id)
                        .await
                    {
                        return SyncOutcome::SkippedWithError(format!(
                            "{path}: failed to assign a new id: {err}"
                        ));
                    }
                    tracing::info!(%path, %id, "assigned id to document");
                    match self.documents.read(path).await {
                        Ok(Some(updated)) => {
                            metadata = updated.metadata(&self.settings.fields);
                            content = Some(updated.content);
                        }
                        Ok(None) => {
                            metadata = None;
                            content = None;
                        }
                        Err(err) => {
                            return SyncOutcome::SkippedWithError(format!(
                                "{path}: failed to read document: {err}"
                            ));
                        }
                    }
                    plan = plan_sync(metadata.as_ref(), self.cache.get(path));
                }
            }
        }

        let outcome = apply_plan(
            self.remote.as_ref(),
            &mut self.cache,
            path,
            plan,
            content.as_deref().unwrap_or_default(),
        )
        .await;
        tracing::debug!(%path, ?outcome, "reconciled document");
        outcome
    }

    async fn save_cache(&mut self) {
        if let Err(err) = self.cache.save().await {
            tracing::warn!(error = %err, "failed to persist sync cache");
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
