//! Corpus-wide pre-pass that makes remote keys unique before a bulk sync.

use std::collections::BTreeMap;

use uuid::Uuid;

use super::documents::{DocumentError, DocumentStore};
use super::error_log::ErrorBatch;
use super::metadata::MetadataFields;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdReassignment {
    pub key: String,
    pub path: String,
    pub old_id: String,
    pub new_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateReport {
    pub reassigned: Vec<IdReassignment>,
    /// Colliding documents whose id could not be rewritten.
    pub unresolved: Vec<String>,
}

pub async fn resolve_duplicates(
    documents: &dyn DocumentStore,
    fields: &MetadataFields,
    batch: &mut ErrorBatch,
) -> Result<DuplicateReport, DocumentError> {
    resolve_duplicates_with(documents, fields, batch, || Uuid::new_v4().to_string()).await
}

/// Within every group of documents sharing a key, the lexicographically first
/// path keeps its id and every other document gets `new_id()` written back
/// into its metadata.
pub async fn resolve_duplicates_with(
    documents: &dyn DocumentStore,
    fields: &MetadataFields,
    batch: &mut ErrorBatch,
    mut new_id: impl FnMut() -> String,
) -> Result<DuplicateReport, DocumentError> {
    let mut by_key: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    for path in documents.list_paths().await? {
        let document = match documents.read(&path).await {
            Ok(Some(document)) => document,
            Ok(None) => continue,
            Err(err) => {
                batch.push(format!("{path}: failed to read document: {err}"));
                continue;
            }
        };
        let Some(metadata) = document.metadata(fields) else {
            continue;
        };
        if !metadata.sync_enabled {
            continue;
        }
        let (Some(key), Some(id)) = (metadata.remote_key(), metadata.id) else {
            continue;
        };
        by_key.entry(key).or_default().push((path, id));
    }

    let mut report = DuplicateReport::default();
    for (key, mut group) in by_key {
        if group.len() < 2 {
            continue;
        }
        group.sort_by(|left, right| left.0.cmp(&right.0));
        for (path, old_id) in group.into_iter().skip(1) {
            let fresh = new_id();
            match documents
                .set_metadata_field(&path, &fields.id, &fresh)
                .await
            {
                Ok(()) => {
                    batch.push(format!(
                        "Duplicate key \"{key}\": {path} id changed from \"{old_id}\" to \"{fresh}\""
                    ));
                    tracing::info!(%key, %path, %old_id, new_id = %fresh, "reassigned duplicate id");
                    report.reassigned.push(IdReassignment {
                        key: key.clone(),
                        path,
                        old_id,
                        new_id: fresh,
                    });
                }
                Err(err) => {
                    batch.push(format!(
                        "Duplicate key \"{key}\": failed to reassign id of {path}: {err}"
                    ));
                    report.unresolved.push(path);
                }
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::metadata::extract_metadata;
    use crate::sync::testing::MemoryDocuments;

    fn counter() -> impl FnMut() -> String {
        let mut next = 0;
        move || {
            next += 1;
            format!("gen-{next}")
        }
    }

    fn id_of(docs: &MemoryDocuments, path: &str) -> Option<String> {
        extract_metadata(&docs.content(path).unwrap(), &MetadataFields::default())
            .and_then(|metadata| metadata.id)
    }

    #[tokio::test]
    async fn first_path_keeps_id_and_others_are_renamed() {
        let docs = MemoryDocuments::with(&[
            ("c.md", "---\nkv_sync: true\nid: x\n---\nc"),
            ("a.md", "---\nkv_sync: true\nid: x\n---\na"),
            ("b.md", "---\nkv_sync: true\nid: x\n---\nb"),
            ("d.md", "---\nkv_sync: true\nid: y\n---\nd"),
        ]);
        let mut batch = ErrorBatch::default();

        let report =
            resolve_duplicates_with(&docs, &MetadataFields::default(), &mut batch, counter())
                .await
                .unwrap();

        assert_eq!(id_of(&docs, "a.md").as_deref(), Some("x"));
        assert_eq!(id_of(&docs, "b.md").as_deref(), Some("gen-1"));
        assert_eq!(id_of(&docs, "c.md").as_deref(), Some("gen-2"));
        assert_eq!(id_of(&docs, "d.md").as_deref(), Some("y"));
        assert_eq!(report.reassigned.len(), 2);
        assert_eq!(
            batch.messages(),
            &[
                "Duplicate key \"x\": b.md id changed from \"x\" to \"gen-1\"".to_string(),
                "Duplicate key \"x\": c.md id changed from \"x\" to \"gen-2\"".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn rerun_on_unique_set_is_a_no_op() {
        let docs = MemoryDocuments::with(&[
            ("a.md", "---\nkv_sync: true\nid: x\n---\n"),
            ("b.md", "---\nkv_sync: true\nid: x\n---\n"),
        ]);
        let fields = MetadataFields::default();
        let mut batch = ErrorBatch::default();
        resolve_duplicates(&docs, &fields, &mut batch).await.unwrap();
        let renamed = id_of(&docs, "b.md").unwrap();
        assert!(Uuid::parse_str(&renamed).is_ok());

        let mut second = ErrorBatch::default();
        let report = resolve_duplicates(&docs, &fields, &mut second).await.unwrap();
        assert_eq!(report, DuplicateReport::default());
        assert!(second.is_empty());
        assert_eq!(id_of(&docs, "b.md"), Some(renamed));
    }

    #[tokio::test]
    async fn collisions_consider_collection_and_sync_flag() {
        let docs = MemoryDocuments::with(&[
            ("a.md", "---\nkv_sync: true\nid: x\ncollection: blog\n---\n"),
            ("b.md", "---\nkv_sync: true\nid: x\n---\n"),
            ("c.md", "---\nkv_sync: false\nid: x\n---\n"),
            ("d.md", "---\nkv_sync: true\nid: x\ncollection: \" blog \"\n---\n"),
        ]);
        let mut batch = ErrorBatch::default();
        let report =
            resolve_duplicates_with(&docs, &MetadataFields::default(), &mut batch, counter())
                .await
                .unwrap();

        assert_eq!(report.reassigned.len(), 1);
        assert_eq!(report.reassigned[0].path, "d.md");
        assert_eq!(report.reassigned[0].key, "blog/x");
        assert_eq!(id_of(&docs, "b.md").as_deref(), Some("x"));
        assert_eq!(id_of(&docs, "c.md").as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn failed_rewrite_is_reported_as_unresolved() {
        let docs = MemoryDocuments::with(&[
            ("a.md", "---\nkv_sync: true\nid: x\n---\n"),
            ("b.md", "---\nkv_sync: true\nid: x\n---\n"),
        ]);
        docs.set_read_only(true);
        let mut batch = ErrorBatch::default();
        let report =
            resolve_duplicates_with(&docs, &MetadataFields::default(), &mut batch, counter())
                .await
                .unwrap();

        assert!(report.reassigned.is_empty());
        assert_eq!(report.unresolved, vec!["b.md".to_string()]);
        assert_eq!(batch.len(), 1);
        assert!(batch.messages()[0].contains("failed to reassign id of b.md"));
    }
}
