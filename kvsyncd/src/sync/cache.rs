//! Persisted map from document path to the remote key last known to exist.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub const CACHE_FILE_NAME: &str = "sync-cache.json";
const SYNCED_FILES_FIELD: &str = "syncedFiles";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache file {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct PersistedCache<'a> {
    #[serde(rename = "syncedFiles")]
    synced_files: &'a BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct SyncCache {
    path: Option<PathBuf>,
    entries: BTreeMap<String, String>,
    dirty: bool,
}

impl SyncCache {
    /// Cache that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the cache at `path`. A missing file is an empty cache; anything
    /// other than a flat string-to-string `syncedFiles` object is an error,
    /// because prior remote state cannot be guessed.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self {
                    path: Some(path),
                    ..Self::default()
                });
            }
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        let entries = parse_entries(&raw).map_err(|reason| CacheError::Malformed {
            path: path.clone(),
            reason,
        })?;
        Ok(Self {
            path: Some(path),
            entries,
            dirty: false,
        })
    }

    pub fn get(&self, document_path: &str) -> Option<&str> {
        self.entries.get(document_path).map(String::as_str)
    }

    /// Returns true when the stored key changed.
    pub fn insert(&mut self, document_path: &str, key: &str) -> bool {
        if self.get(document_path) == Some(key) {
            return false;
        }
        self.entries
            .insert(document_path.to_string(), key.to_string());
        self.dirty = true;
        true
    }

    pub fn remove(&mut self, document_path: &str) -> Option<String> {
        let removed = self.entries.remove(document_path);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(path, key)| (path.clone(), key.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn to_json(&self) -> Result<String, CacheError> {
        Ok(serde_json::to_string_pretty(&PersistedCache {
            synced_files: &self.entries,
        })?)
    }

    /// Writes the whole mapping, replacing the previous file atomically.
    pub async fn save(&mut self) -> Result<(), CacheError> {
        let Some(path) = self.path.clone() else {
            self.dirty = false;
            return Ok(());
        };
        let json = self.to_json()?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| CacheError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let partial = partial_path(&path);
        tokio::fs::write(&partial, json)
            .await
            .map_err(|source| CacheError::Io {
                path: partial.clone(),
                source,
            })?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|source| CacheError::Io {
                path: path.clone(),
                source,
            })?;
        self.dirty = false;
        Ok(())
    }
}

fn parse_entries(raw: &str) -> Result<BTreeMap<String, String>, String> {
    let value: Value = serde_json::from_str(raw).map_err(|err| err.to_string())?;
    let Value::Object(mut root) = value else {
        return Err("top-level value is not an object".to_string());
    };
    let synced = match root.remove(SYNCED_FILES_FIELD) {
        None | Some(Value::Null) => return Ok(BTreeMap::new()),
        Some(Value::Object(synced)) => synced,
        Some(_) => return Err(format!("`{SYNCED_FILES_FIELD}` is not an object")),
    };
    synced
        .into_iter()
        .map(|(path, key)| match key {
            Value::String(key) => Ok((path, key)),
            other => Err(format!("entry for {path:?} is not a string: {other}")),
        })
        .collect()
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}
