//! Per-document sync decision and its execution against the remote store.

use super::cache::SyncCache;
use super::metadata::Metadata;
use super::remote::RemoteStore;

/// What has to happen remotely for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPlan {
    /// Nothing tracked and nothing to publish.
    Skip,
    /// Sync is enabled but no id is set and nothing is tracked yet.
    MissingId,
    /// The tracked key has to go; the document no longer wants to be synced.
    Remove { key: String },
    /// Publish under `key`, deleting the `stale` key first when it differs.
    Upload { stale: Option<String>, key: String },
}

pub fn plan_sync(metadata: Option<&Metadata>, cached: Option<&str>) -> SyncPlan {
    let target = metadata
        .filter(|metadata| metadata.sync_enabled)
        .and_then(Metadata::remote_key);
    match (target, cached) {
        (Some(key), cached) => SyncPlan::Upload {
            stale: cached.filter(|cached| *cached != key).map(str::to_string),
            key,
        },
        (None, Some(cached)) => SyncPlan::Remove {
            key: cached.to_string(),
        },
        (None, None) if metadata.is_some_and(|metadata| metadata.sync_enabled) => {
            SyncPlan::MissingId
        }
        (None, None) => SyncPlan::Skip,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub key: String,
    pub error: Option<String>,
}

impl StepResult {
    fn from_result(key: &str, result: Result<(), super::remote::RemoteError>) -> Self {
        Self {
            key: key.to_string(),
            error: result.err().map(|err| err.reason),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteActions {
    pub deleted: Option<StepResult>,
    pub uploaded: Option<StepResult>,
}

impl RemoteActions {
    pub fn is_ok(&self) -> bool {
        self.deleted.as_ref().is_none_or(StepResult::is_ok)
            && self.uploaded.as_ref().is_none_or(StepResult::is_ok)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped,
    /// Intended skip, but the document is malformed. Carries the full message.
    SkippedWithError(String),
    Acted(RemoteActions),
}

impl SyncOutcome {
    pub fn is_failure(&self) -> bool {
        match self {
            SyncOutcome::Skipped => false,
            SyncOutcome::SkippedWithError(_) => true,
            SyncOutcome::Acted(actions) => !actions.is_ok(),
        }
    }

    /// Human-readable failure lines for the error log, in the order the
    /// steps ran.
    pub fn error_messages(&self, path: &str) -> Vec<String> {
        match self {
            SyncOutcome::Skipped => Vec::new(),
            SyncOutcome::SkippedWithError(message) => vec![message.clone()],
            SyncOutcome::Acted(actions) => {
                let mut messages = Vec::new();
                if let Some(StepResult {
                    key,
                    error: Some(reason),
                }) = &actions.deleted
                {
                    messages.push(format!("{path}: failed to delete \"{key}\": {reason}"));
                }
                if let Some(StepResult {
                    key,
                    error: Some(reason),
                }) = &actions.uploaded
                {
                    messages.push(format!("{path}: failed to upload \"{key}\": {reason}"));
                }
                messages
            }
        }
    }
}

/// Executes `plan` for `path`. Remote calls run one at a time and the cache
/// is updated after each successful call, so it never names a key that the
/// remote store is not believed to hold.
pub async fn apply_plan(
    remote: &dyn RemoteStore,
    cache: &mut SyncCache,
    path: &str,
    plan: SyncPlan,
    content: &str,
) -> SyncOutcome {
    match plan {
        SyncPlan::Skip => SyncOutcome::Skipped,
        SyncPlan::MissingId => SyncOutcome::SkippedWithError(format!(
            "{path}: sync is enabled but the document has no id"
        )),
        SyncPlan::Remove { key } => {
            let result = remote.delete(&key).await;
            if result.is_ok() {
                cache.remove(path);
            }
            SyncOutcome::Acted(RemoteActions {
                deleted: Some(StepResult::from_result(&key, result)),
                uploaded: None,
            })
        }
        SyncPlan::Upload { stale, key } => {
            let mut actions = RemoteActions::default();
            if let Some(stale) = stale {
                let result = remote.delete(&stale).await;
                let failed = result.is_err();
                actions.deleted = Some(StepResult::from_result(&stale, result));
                if failed {
                    return SyncOutcome::Acted(actions);
                }
                cache.remove(path);
            }
            let result = remote.put(&key, content).await;
            if result.is_ok() {
                cache.insert(path, &key);
            }
            actions.uploaded = Some(StepResult::from_result(&key, result));
            SyncOutcome::Acted(actions)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::{MemoryRemote, RemoteCall};

    fn synced(id: Option<&str>, collection: Option<&str>) -> Metadata {
        Metadata {
            sync_enabled: true,
            id: id.map(str::to_string),
            collection: collection.map(str::to_string),
        }
    }

    #[test]
    fn plan_table() {
        let disabled = Metadata {
            sync_enabled: false,
            id: Some("x".into()),
            collection: None,
        };
        let no_id = synced(None, Some("blog"));
        let post = synced(Some("post-1"), None);

        assert_eq!(
            plan_sync(None, Some("k")),
            SyncPlan::Remove { key: "k".into() }
        );
        assert_eq!(
            plan_sync(Some(&disabled), Some("k")),
            SyncPlan::Remove { key: "k".into() }
        );
        assert_eq!(
            plan_sync(Some(&no_id), Some("k")),
            SyncPlan::Remove { key: "k".into() }
        );
        assert_eq!(plan_sync(None, None), SyncPlan::Skip);
        assert_eq!(plan_sync(Some(&disabled), None), SyncPlan::Skip);
        assert_eq!(plan_sync(Some(&no_id), None), SyncPlan::MissingId);
        assert_eq!(
            plan_sync(Some(&post), None),
            SyncPlan::Upload {
                stale: None,
                key: "post-1".into()
            }
        );
        assert_eq!(
            plan_sync(Some(&post), Some("post-1")),
            SyncPlan::Upload {
                stale: None,
                key: "post-1".into()
            }
        );
        assert_eq!(
            plan_sync(Some(&synced(Some("post-1"), Some("blog"))), Some("post-1")),
            SyncPlan::Upload {
                stale: Some("post-1".into()),
                key: "blog/post-1".into()
            }
        );
    }

    #[tokio::test]
    async fn failed_stale_delete_aborts_upload_and_keeps_cache() {
        let remote = MemoryRemote::default();
        remote.fail_delete("old", "timeout");
        let mut cache = SyncCache::in_memory();
        cache.insert("a.md", "old");

        let outcome = apply_plan(
            &remote,
            &mut cache,
            "a.md",
            SyncPlan::Upload {
                stale: Some("old".into()),
                key: "new".into(),
            },
            "body",
        )
        .await;

        assert!(outcome.is_failure());
        assert_eq!(remote.calls(), vec![RemoteCall::Delete("old".into())]);
        assert_eq!(cache.get("a.md"), Some("old"));
        assert_eq!(
            outcome.error_messages("a.md"),
            vec!["a.md: failed to delete \"old\": timeout".to_string()]
        );
    }

    #[tokio::test]
    async fn failed_put_after_delete_leaves_document_untracked() {
        let remote = MemoryRemote::default();
        remote.fail_put("new", "quota");
        let mut cache = SyncCache::in_memory();
        cache.insert("a.md", "old");

        let outcome = apply_plan(
            &remote,
            &mut cache,
            "a.md",
            SyncPlan::Upload {
                stale: Some("old".into()),
                key: "new".into(),
            },
            "body",
        )
        .await;

        assert!(outcome.is_failure());
        assert_eq!(
            remote.calls(),
            vec![
                RemoteCall::Delete("old".into()),
                RemoteCall::Put("new".into(), "body".into())
            ]
        );
        assert_eq!(cache.get("a.md"), None);
        assert!(remote.values().is_empty());
    }

    #[tokio::test]
    async fn missing_id_message_names_document() {
        let remote = MemoryRemote::default();
        let mut cache = SyncCache::in_memory();
        let outcome = apply_plan(&remote, &mut cache, "drafts/x.md", SyncPlan::MissingId, "").await;
        assert_eq!(
            outcome,
            SyncOutcome::SkippedWithError(
                "drafts/x.md: sync is enabled but the document has no id".into()
            )
        );
        assert!(remote.calls().is_empty());
    }
}
