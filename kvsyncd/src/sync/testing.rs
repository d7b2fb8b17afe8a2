use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use super::documents::{Document, DocumentError, DocumentStore};
use super::frontmatter;
use super::remote::{RemoteError, RemoteStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Put(String, String),
    Delete(String),
}

#[derive(Default)]
pub struct MemoryRemote {
    calls: Mutex<Vec<RemoteCall>>,
    values: Mutex<BTreeMap<String, String>>,
    put_failures: Mutex<HashMap<String, String>>,
    delete_failures: Mutex<HashMap<String, String>>,
}

impl MemoryRemote {
    pub fn fail_put(&self, key: &str, reason: &str) {
        self.put_failures
            .lock()
            .unwrap()
            .insert(key.to_string(), reason.to_string());
    }

    pub fn fail_delete(&self, key: &str, reason: &str) {
        self.delete_failures
            .lock()
            .unwrap()
            .insert(key.to_string(), reason.to_string());
    }

    pub fn seed(&self, key: &str, body: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), body.to_string());
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn values(&self) -> BTreeMap<String, String> {
        self.values.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn put(&self, key: &str, body: &str) -> Result<(), RemoteError> {
        self.calls
            .lock()
            .unwrap()
            .push(RemoteCall::Put(key.to_string(), body.to_string()));
        if let Some(reason) = self.put_failures.lock().unwrap().get(key) {
            return Err(RemoteError::new(reason.clone()));
        }
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), body.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RemoteError> {
        self.calls
            .lock()
            .unwrap()
            .push(RemoteCall::Delete(key.to_string()));
        if let Some(reason) = self.delete_failures.lock().unwrap().get(key) {
            return Err(RemoteError::new(reason.clone()));
        }
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDocuments {
    docs: Mutex<BTreeMap<String, String>>,
    read_only: Mutex<bool>,
}

impl MemoryDocuments {
    pub fn with(docs: &[(&str, &str)]) -> Self {
        let store = Self::default();
        for (path, content) in docs {
            store.insert(path, content);
        }
        store
    }

    pub fn insert(&self, path: &str, content: &str) {
        self.docs
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
    }

    pub fn remove(&self, path: &str) {
        self.docs.lock().unwrap().remove(path);
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.docs.lock().unwrap().get(path).cloned()
    }

    pub fn set_read_only(&self, read_only: bool) {
        *self.read_only.lock().unwrap() = read_only;
    }
}

#[async_trait]
impl DocumentStore for MemoryDocuments {
    async fn list_paths(&self) -> Result<Vec<String>, DocumentError> {
        Ok(self.docs.lock().unwrap().keys().cloned().collect())
    }

    async fn read(&self, path: &str) -> Result<Option<Document>, DocumentError> {
        Ok(self.content(path).map(|content| Document {
            path: path.to_string(),
            content,
        }))
    }

    async fn exists(&self, path: &str) -> Result<bool, DocumentError> {
        Ok(self.docs.lock().unwrap().contains_key(path))
    }

    async fn set_metadata_field(
        &self,
        path: &str,
        field: &str,
        value: &str,
    ) -> Result<(), DocumentError> {
        if *self.read_only.lock().unwrap() {
            return Err(DocumentError::Io {
                path: path.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            });
        }
        let content = self
            .content(path)
            .ok_or_else(|| DocumentError::NotFound(path.to_string()))?;
        let updated = frontmatter::set_field(&content, field, value).map_err(|source| {
            DocumentError::Frontmatter {
                path: path.to_string(),
                source,
            }
        })?;
        self.insert(path, &updated);
        Ok(())
    }
}
