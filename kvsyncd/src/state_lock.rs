use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs4::FileExt;
use thiserror::Error;

pub const LOCK_FILE_NAME: &str = "sync-cache.json.lock";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state directory {0} is in use by another kvsyncd process")]
    Held(PathBuf),
}

/// Exclusive hold on a state directory. Only the holder may load or save the
/// sync cache stored there.
#[derive(Debug)]
pub struct StateLock {
    file: File,
}

impl StateLock {
    pub fn acquire(state_root: &Path) -> Result<Self, LockError> {
        std::fs::create_dir_all(state_root).map_err(|source| LockError::Io {
            path: state_root.to_path_buf(),
            source,
        })?;
        let path = state_root.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Io {
                path: path.clone(),
                source,
            })?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file }),
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                Err(LockError::Held(state_root.to_path_buf()))
            }
            Err(source) => Err(LockError::Io { path, source }),
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_holder_is_refused_until_release() {
        let dir = tempdir().unwrap();
        let first = StateLock::acquire(dir.path()).unwrap();
        assert!(matches!(
            StateLock::acquire(dir.path()),
            Err(LockError::Held(_))
        ));

        drop(first);
        assert!(StateLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn creates_missing_state_dir() {
        let dir = tempdir().unwrap();
        let state = dir.path().join("nested").join("kvsync");
        let _lock = StateLock::acquire(&state).unwrap();
        assert!(state.join(LOCK_FILE_NAME).exists());
    }
}
