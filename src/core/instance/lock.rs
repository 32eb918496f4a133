// ─── Install Locks ───
// Serializes work on one version id: an in-process mutex per id, plus an
// advisory lock file so a second launcher process waits as well.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::error::{LauncherError, LauncherResult};

/// A lock file older than this is considered abandoned.
const LOCK_STALE_SECS: i64 = 60 * 10;
const LOCK_POLL: Duration = Duration::from_millis(250);

/// Holds a lock file; the file is removed on drop.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Create `path` exclusively, waiting while another holder has it.
    pub async fn acquire(path: &Path, cancel: &CancellationToken) -> LauncherResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }

        let mut attempts = 0_u32;
        loop {
            attempts += 1;
            match tokio::fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(path)
                .await
            {
                Ok(mut file) => {
                    let payload = serde_json::json!({
                        "pid": std::process::id(),
                        "timestamp": Utc::now().timestamp(),
                    });
                    file.write_all(payload.to_string().as_bytes())
                        .await
                        .map_err(|e| LauncherError::io(path, e))?;
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    cleanup_stale_lock(path).await;
                    if attempts % 20 == 0 {
                        info!("Waiting for lock at {:?}", path);
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(LauncherError::Cancelled),
                        _ = tokio::time::sleep(LOCK_POLL) => {}
                    }
                }
                Err(err) => return Err(LauncherError::io(path, err)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(source) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove lock {:?}: {}", self.path, source);
        }
    }
}

async fn cleanup_stale_lock(path: &Path) {
    let Ok(content) = tokio::fs::read_to_string(path).await else {
        return;
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) else {
        return;
    };
    let pid = value.get("pid").and_then(|v| v.as_u64()).unwrap_or_default();
    let timestamp = value
        .get("timestamp")
        .and_then(|v| v.as_i64())
        .unwrap_or_default();
    let expired = Utc::now().timestamp().saturating_sub(timestamp) > LOCK_STALE_SECS;

    #[cfg(target_os = "linux")]
    let dead = !PathBuf::from(format!("/proc/{pid}")).exists();
    #[cfg(not(target_os = "linux"))]
    let dead = {
        let _ = pid;
        false
    };

    if expired || dead {
        warn!("Removing stale lock {:?} (pid {}, age check {})", path, pid, expired);
        let _ = tokio::fs::remove_file(path).await;
    }
}

/// Per-version locks shared by every install running in this process.
#[derive(Clone, Default)]
pub struct VersionLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

/// Held for the duration of one install. The file lock is released before
/// the in-process slot.
#[derive(Debug)]
pub struct VersionGuard {
    _file: FileLock,
    _slot: OwnedMutexGuard<()>,
}

impl VersionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `version_id`, waiting for any other holder in this process and
    /// then for the lock file at `lock_path`.
    pub async fn lock(
        &self,
        version_id: &str,
        lock_path: &Path,
        cancel: &CancellationToken,
    ) -> LauncherResult<VersionGuard> {
        let slot = {
            let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            map.entry(version_id.to_string()).or_default().clone()
        };
        let slot = tokio::select! {
            _ = cancel.cancelled() => return Err(LauncherError::Cancelled),
            guard = slot.lock_owned() => guard,
        };
        let file = FileLock::acquire(lock_path, cancel).await?;
        Ok(VersionGuard {
            _file: file,
            _slot: slot,
        })
    }
}
