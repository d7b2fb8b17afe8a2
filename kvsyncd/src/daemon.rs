use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use kvsync_core::KvClient;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::control::{CONTROL_SOCKET_NAME, ControlListener, ControlRequest, ControlResponse};
use crate::state_lock::StateLock;
use crate::sync::cache::{CACHE_FILE_NAME, SyncCache};
use crate::sync::debounce::Debouncer;
use crate::sync::documents::VaultStore;
use crate::sync::engine::{BulkReport, MissingIdPolicy, SyncEngine, SyncSettings};
use crate::sync::error_log::{DEFAULT_ERROR_LOG_NAME, ErrorLog};
use crate::sync::metadata::{
    DEFAULT_COLLECTION_FIELD, DEFAULT_ID_FIELD, DEFAULT_SYNC_FIELD, MetadataFields,
};
use crate::sync::paths::{document_path_for, relative_document_path};
use crate::sync::reconcile::SyncOutcome;
use crate::sync::remote::RemoteStore;
use crate::sync::watcher::{DocumentChanged, start_document_watcher};

const DEFAULT_STATE_DIR_NAME: &str = "kvsync";
const DEFAULT_DEBOUNCE_MS: u64 = 2000;

#[derive(Clone)]
pub struct RemoteConfig {
    pub account_id: String,
    pub namespace_id: String,
    pub api_token: String,
    pub base_url: Option<String>,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("account_id", &self.account_id)
            .field("namespace_id", &self.namespace_id)
            .field("api_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub vault_root: PathBuf,
    pub state_root: PathBuf,
    pub remote: RemoteConfig,
    pub settings: SyncSettings,
    /// Quiet period before a changed document is reconciled. Milliseconds in
    /// the environment.
    pub debounce: Duration,
    pub auto_sync: bool,
    /// Vault-relative path of the Markdown error log.
    pub error_log: String,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let vault_root = std::env::var("KVSYNC_VAULT_DIR")
            .map(|value| expand_with_home(&value, &home))
            .context("KVSYNC_VAULT_DIR is not set")?;
        let state_root = std::env::var("KVSYNC_STATE_DIR")
            .ok()
            .map(|value| expand_with_home(&value, &home))
            .unwrap_or_else(default_state_root);
        let remote = RemoteConfig {
            account_id: required_env("KVSYNC_ACCOUNT_ID")?,
            namespace_id: required_env("KVSYNC_NAMESPACE_ID")?,
            api_token: required_env("KVSYNC_API_TOKEN")?,
            base_url: std::env::var("KVSYNC_API_BASE_URL")
                .ok()
                .filter(|value| !value.trim().is_empty()),
        };
        let fields = MetadataFields {
            sync: read_string_env("KVSYNC_SYNC_FIELD", DEFAULT_SYNC_FIELD),
            id: read_string_env("KVSYNC_ID_FIELD", DEFAULT_ID_FIELD),
            collection: read_string_env("KVSYNC_COLLECTION_FIELD", DEFAULT_COLLECTION_FIELD),
        };
        let missing_id = match std::env::var("KVSYNC_MISSING_ID") {
            Ok(value) => MissingIdPolicy::parse(&value)
                .with_context(|| format!("unknown KVSYNC_MISSING_ID value: {value}"))?,
            Err(_) => MissingIdPolicy::default(),
        };
        let debounce =
            Duration::from_millis(read_u64_env("KVSYNC_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS));
        let auto_sync = read_bool_env("KVSYNC_AUTO_SYNC", true);
        let error_log = read_string_env("KVSYNC_ERROR_LOG", DEFAULT_ERROR_LOG_NAME);

        Ok(Self {
            vault_root,
            state_root,
            remote,
            settings: SyncSettings { fields, missing_id },
            debounce,
            auto_sync,
            error_log,
        })
    }

    pub fn cache_path(&self) -> PathBuf {
        self.state_root.join(CACHE_FILE_NAME)
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.vault_root.join(&self.error_log)
    }

    pub fn control_socket_path(&self) -> PathBuf {
        self.state_root.join(CONTROL_SOCKET_NAME)
    }
}

/// Every reconciliation goes through one of these, so the watcher, the
/// control socket and one-shot runs share a single engine and cache.
#[derive(Clone)]
pub struct SyncHandle {
    vault_root: PathBuf,
    engine: Arc<Mutex<SyncEngine>>,
}

impl SyncHandle {
    pub async fn sync_all(&self) -> anyhow::Result<BulkReport> {
        let mut engine = self.engine.lock().await;
        Ok(engine.sync_all().await?)
    }

    /// `path` is vault-relative or absolute inside the vault.
    pub async fn sync_one(&self, path: &str) -> anyhow::Result<SyncOutcome> {
        let path = normalize_document_arg(&self.vault_root, path)?;
        Ok(self.engine.lock().await.sync_document(&path).await)
    }

    pub async fn respond(&self, request: ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::SyncAll => match self.sync_all().await {
                Ok(report) => ControlResponse::ok(describe_report(&report)),
                Err(err) => ControlResponse::error(format!("{err:#}")),
            },
            ControlRequest::SyncOne { path } => match self.sync_one(&path).await {
                Ok(outcome) => ControlResponse::ok(describe_outcome(&path, &outcome)),
                Err(err) => ControlResponse::error(format!("{err:#}")),
            },
        }
    }
}

pub struct DaemonRuntime {
    config: DaemonConfig,
    engine: Arc<Mutex<SyncEngine>>,
    _state_lock: Option<StateLock>,
}

impl DaemonRuntime {
    /// Fails when another process holds the state directory or the persisted
    /// cache cannot be trusted; nothing is synced in either case.
    pub async fn bootstrap(config: DaemonConfig) -> anyhow::Result<Self> {
        let vault = tokio::fs::metadata(&config.vault_root)
            .await
            .with_context(|| format!("vault is unavailable at {:?}", config.vault_root))?;
        anyhow::ensure!(
            vault.is_dir(),
            "vault root {:?} is not a directory",
            config.vault_root
        );
        let state_lock =
            StateLock::acquire(&config.state_root).context("refusing to start sync")?;
        let cache = SyncCache::load(config.cache_path())
            .await
            .context("sync cache is unreadable, refusing to start sync")?;
        let client = match config.remote.base_url.as_deref() {
            Some(url) => KvClient::with_base_url(
                url,
                config.remote.account_id.clone(),
                config.remote.namespace_id.clone(),
                config.remote.api_token.clone(),
            ),
            None => KvClient::new(
                config.remote.account_id.clone(),
                config.remote.namespace_id.clone(),
                config.remote.api_token.clone(),
            ),
        }
        .context("invalid key-value client config")?;

        Ok(Self::assemble(
            config,
            Arc::new(client),
            cache,
            Some(state_lock),
        ))
    }

    /// Runtime over an arbitrary remote store. Takes no state-directory lock.
    pub fn with_remote(config: DaemonConfig, remote: Arc<dyn RemoteStore>, cache: SyncCache) -> Self {
        Self::assemble(config, remote, cache, None)
    }

    fn assemble(
        config: DaemonConfig,
        remote: Arc<dyn RemoteStore>,
        cache: SyncCache,
        state_lock: Option<StateLock>,
    ) -> Self {
        let documents =
            Arc::new(VaultStore::new(&config.vault_root).ignoring(config.error_log.clone()));
        let engine = SyncEngine::new(
            remote,
            documents,
            cache,
            ErrorLog::new(config.error_log_path()),
            config.settings.clone(),
        );
        Self {
            config,
            engine: Arc::new(Mutex::new(engine)),
            _state_lock: state_lock,
        }
    }

    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            vault_root: self.config.vault_root.clone(),
            engine: Arc::clone(&self.engine),
        }
    }

    pub async fn sync_all(&self) -> anyhow::Result<BulkReport> {
        self.handle().sync_all().await
    }

    pub async fn sync_one(&self, path: &str) -> anyhow::Result<SyncOutcome> {
        self.handle().sync_one(path).await
    }

    /// Serves manual triggers from other `kvsyncd` invocations until the
    /// returned task is aborted. Aborting removes the socket file.
    pub async fn start_control_server(&self) -> anyhow::Result<JoinHandle<()>> {
        let socket = self.config.control_socket_path();
        let listener = ControlListener::bind(&socket)
            .await
            .with_context(|| format!("failed to open control socket {}", socket.display()))?;
        let handle = self.handle();
        Ok(tokio::spawn(async move {
            loop {
                let connection = match listener.accept().await {
                    Ok(connection) => connection,
                    Err(err) => {
                        tracing::warn!(error = %err, "control socket accept failed");
                        continue;
                    }
                };
                let handle = handle.clone();
                tokio::spawn(async move {
                    let answered = connection
                        .answer(|request| async move {
                            let response = handle.respond(request).await;
                            tracing::info!(ok = response.ok, "{}", response.message);
                            response
                        })
                        .await;
                    if let Err(err) = answered {
                        tracing::warn!(error = %err, "control request failed");
                    }
                });
            }
        }))
    }

    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!(
            vault_root = %self.config.vault_root.display(),
            cache = %self.config.cache_path().display(),
            debounce_ms = self.config.debounce.as_millis() as u64,
            auto_sync = self.config.auto_sync,
            "started"
        );

        let control = match self.start_control_server().await {
            Ok(task) => Some(task),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "manual triggers are unavailable");
                None
            }
        };

        let debouncer = Arc::new(Debouncer::<String>::new());
        let (watcher, rx) = if self.config.auto_sync {
            match start_document_watcher(&self.config.vault_root) {
                Ok((watcher, rx)) => (Some(watcher), Some(rx)),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to start document watcher");
                    (None, None)
                }
            }
        } else {
            tracing::info!("automatic sync is disabled");
            (None, None)
        };

        let event_handle = rx.map(|mut rx| {
            let engine = Arc::clone(&self.engine);
            let debouncer = Arc::clone(&debouncer);
            let delay = self.config.debounce;
            let error_log = self.config.error_log.clone();
            tokio::spawn(async move {
                while let Some(DocumentChanged { path }) = rx.recv().await {
                    if path == error_log {
                        continue;
                    }
                    let engine = Arc::clone(&engine);
                    let task_path = path.clone();
                    debouncer.schedule(path, delay, move || async move {
                        let outcome = engine.lock().await.sync_document(&task_path).await;
                        tracing::info!("{}", describe_outcome(&task_path, &outcome));
                    });
                }
            })
        });

        let _watcher = watcher;
        tokio::signal::ctrl_c()
            .await
            .context("failed waiting for shutdown signal")?;

        if let Some(task) = control {
            task.abort();
        }
        if let Some(handle) = event_handle {
            handle.abort();
        }
        let cancelled = debouncer.cancel_all();
        tracing::info!(cancelled, "shutting down");
        self.engine.lock().await.shutdown().await;
        Ok(())
    }
}

include!("daemon_helpers.rs");

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
