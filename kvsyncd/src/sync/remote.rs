use async_trait::async_trait;
use kvsync_core::{KvClient, KvError};
use thiserror::Error;

/// Failure reported by the remote store; `reason` is shown to the user as-is.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct RemoteError {
    pub reason: String,
}

impl RemoteError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<KvError> for RemoteError {
    fn from(err: KvError) -> Self {
        Self::new(err.to_string())
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn put(&self, key: &str, body: &str) -> Result<(), RemoteError>;
    async fn delete(&self, key: &str) -> Result<(), RemoteError>;
}

#[async_trait]
impl RemoteStore for KvClient {
    async fn put(&self, key: &str, body: &str) -> Result<(), RemoteError> {
        Ok(self.put_value(key, body).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), RemoteError> {
        Ok(self.delete_value(key).await?)
    }
}
