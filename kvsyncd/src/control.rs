//! One-shot requests from the CLI into a running daemon, one JSON line each
//! way over a Unix socket in the state directory.

use std::future::Future;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

pub const CONTROL_SOCKET_NAME: &str = "control.sock";

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("no daemon is listening on {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("a daemon is already listening on {0}")]
    AlreadyRunning(PathBuf),
    #[error("control socket io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed control message: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("daemon closed the connection without answering")]
    NoResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum ControlRequest {
    SyncAll,
    SyncOne { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    pub message: String,
}

impl ControlResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Sends `request` to the daemon behind `socket` and waits for its answer.
/// Fails with [`ControlError::Connect`] when nothing is listening.
pub async fn send_request(
    socket: &Path,
    request: &ControlRequest,
) -> Result<ControlResponse, ControlError> {
    let stream = UnixStream::connect(socket)
        .await
        .map_err(|source| ControlError::Connect {
            path: socket.to_path_buf(),
            source,
        })?;
    let (read, mut write) = stream.into_split();
    write_message(&mut write, request).await?;
    write.shutdown().await?;
    read_message(&mut BufReader::new(read))
        .await?
        .ok_or(ControlError::NoResponse)
}

/// Listening side of the control socket. The socket file is removed on drop.
pub struct ControlListener {
    inner: UnixListener,
    path: PathBuf,
}

impl ControlListener {
    pub async fn bind(path: &Path) -> Result<Self, ControlError> {
        if path.exists() {
            // A live socket must not be unlinked from under its daemon.
            if UnixStream::connect(path).await.is_ok() {
                return Err(ControlError::AlreadyRunning(path.to_path_buf()));
            }
            std::fs::remove_file(path)?;
        }
        let inner = UnixListener::bind(path)?;
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }

    pub async fn accept(&self) -> Result<ControlConnection, ControlError> {
        let (stream, _) = self.inner.accept().await?;
        Ok(ControlConnection { stream })
    }
}

impl Drop for ControlListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub struct ControlConnection {
    stream: UnixStream,
}

impl ControlConnection {
    /// Reads the single request of this connection and writes back what
    /// `handler` returns. An unreadable request is answered with an error.
    pub async fn answer<F, Fut>(self, handler: F) -> Result<(), ControlError>
    where
        F: FnOnce(ControlRequest) -> Fut,
        Fut: Future<Output = ControlResponse>,
    {
        let (read, mut write) = self.stream.into_split();
        let response = match read_message::<ControlRequest, _>(&mut BufReader::new(read)).await {
            Ok(Some(request)) => handler(request).await,
            Ok(None) => return Ok(()),
            Err(err) => ControlResponse::error(err.to_string()),
        };
        write_message(&mut write, &response).await?;
        write.shutdown().await?;
        Ok(())
    }
}

async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), ControlError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    Ok(())
}

async fn read_message<T, R>(reader: &mut R) -> Result<Option<T>, ControlError>
where
    T: DeserializeOwned,
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line.trim_end())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn echo_once(listener: ControlListener) {
        let connection = listener.accept().await.unwrap();
        connection
            .answer(|request| async move {
                match request {
                    ControlRequest::SyncAll => ControlResponse::ok("all"),
                    ControlRequest::SyncOne { path } => ControlResponse::error(path),
                }
            })
            .await
            .unwrap();
    }

    #[test]
    fn requests_are_tagged_by_command() {
        let json = serde_json::to_string(&ControlRequest::SyncOne {
            path: "blog/a.md".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"command":"sync-one","path":"blog/a.md"}"#);
        assert_eq!(
            serde_json::from_str::<ControlRequest>(r#"{"command":"sync-all"}"#).unwrap(),
            ControlRequest::SyncAll
        );
    }

    #[tokio::test]
    async fn request_reaches_listener_and_returns_answer() {
        let dir = tempdir().unwrap();
        let socket = dir.path().join(CONTROL_SOCKET_NAME);
        let listener = ControlListener::bind(&socket).await.unwrap();
        let server = tokio::spawn(echo_once(listener));

        let response = send_request(
            &socket,
            &ControlRequest::SyncOne {
                path: "notes/a.md".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(response, ControlResponse::error("notes/a.md"));

        server.await.unwrap();
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn missing_listener_is_a_connect_error() {
        let dir = tempdir().unwrap();
        let err = send_request(&dir.path().join(CONTROL_SOCKET_NAME), &ControlRequest::SyncAll)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Connect { .. }));
    }

    #[tokio::test]
    async fn live_socket_is_not_taken_over_but_stale_one_is() {
        let dir = tempdir().unwrap();
        let socket = dir.path().join(CONTROL_SOCKET_NAME);
        let first = ControlListener::bind(&socket).await.unwrap();
        assert!(matches!(
            ControlListener::bind(&socket).await,
            Err(ControlError::AlreadyRunning(_))
        ));
        drop(first);

        std::fs::write(&socket, "stale").unwrap();
        let _second = ControlListener::bind(&socket).await.unwrap();
    }
}
