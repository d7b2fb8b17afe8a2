use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use super::frontmatter::{self, FrontmatterError};
use super::metadata::{Metadata, MetadataFields, extract_metadata};
use super::paths::{
    PathError, document_path_for, is_hidden, is_markdown, relative_document_path,
};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("invalid document path {path}: {source}")]
    Path {
        path: String,
        #[source]
        source: PathError,
    },
    #[error("frontmatter error in {path}: {source}")]
    Frontmatter {
        path: String,
        #[source]
        source: FrontmatterError,
    },
}

/// Snapshot of one document as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: String,
    pub content: String,
}

impl Document {
    pub fn metadata(&self, fields: &MetadataFields) -> Option<Metadata> {
        extract_metadata(&self.content, fields)
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document path, sorted.
    async fn list_paths(&self) -> Result<Vec<String>, DocumentError>;
    async fn read(&self, path: &str) -> Result<Option<Document>, DocumentError>;
    async fn exists(&self, path: &str) -> Result<bool, DocumentError>;
    /// Durably rewrites one frontmatter field of the document.
    async fn set_metadata_field(
        &self,
        path: &str,
        field: &str,
        value: &str,
    ) -> Result<(), DocumentError>;
}

/// Directory of Markdown files.
#[derive(Debug, Clone)]
pub struct VaultStore {
    root: PathBuf,
    ignored: HashSet<String>,
}

impl VaultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignored: HashSet::new(),
        }
    }

    /// Excludes a vault-relative path (e.g. the error log) from the corpus.
    pub fn ignoring(mut self, path: impl Into<String>) -> Self {
        self.ignored.insert(path.into());
        self
    }

    pub fn is_document(&self, path: &str) -> bool {
        is_markdown(path) && !is_hidden(path) && !self.ignored.contains(path)
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, DocumentError> {
        document_path_for(&self.root, path).map_err(|source| DocumentError::Path {
            path: path.to_string(),
            source,
        })
    }
}

#[async_trait]
impl DocumentStore for VaultStore {
    async fn list_paths(&self) -> Result<Vec<String>, DocumentError> {
        let mut out = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|source| io_error(&dir, source))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|source| io_error(&dir, source))?
            {
                let path = entry.path();
                if entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|source| io_error(&path, source))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }
                if let Some(relative) = relative_document_path(&self.root, &path)
                    && self.is_document(&relative)
                {
                    out.push(relative);
                }
            }
        }
        out.sort();
        Ok(out)
    }

    async fn read(&self, path: &str) -> Result<Option<Document>, DocumentError> {
        let target = self.resolve(path)?;
        match tokio::fs::read_to_string(&target).await {
            Ok(content) => Ok(Some(Document {
                path: path.to_string(),
                content,
            })),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(io_error(&target, source)),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, DocumentError> {
        let target = self.resolve(path)?;
        match tokio::fs::metadata(&target).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(io_error(&target, source)),
        }
    }

    async fn set_metadata_field(
        &self,
        path: &str,
        field: &str,
        value: &str,
    ) -> Result<(), DocumentError> {
        let target = self.resolve(path)?;
        let Some(document) = self.read(path).await? else {
            return Err(DocumentError::NotFound(path.to_string()));
        };
        let updated = frontmatter::set_field(&document.content, field, value).map_err(
            |source| DocumentError::Frontmatter {
                path: path.to_string(),
                source,
            },
        )?;
        let partial = partial_path(&target);
        tokio::fs::write(&partial, updated)
            .await
            .map_err(|source| io_error(&partial, source))?;
        tokio::fs::rename(&partial, &target)
            .await
            .map_err(|source| io_error(&target, source))?;
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> DocumentError {
    DocumentError::Io {
        path: path.display().to_string(),
        source,
    }
}

// Hidden and without the `.md` suffix, so it never shows up as a document.
fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.partial"))
}
