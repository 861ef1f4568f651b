//! Session: a per-transcription-request scratch directory on local disk
//! (§3.1). Owns every chunk file and intermediate artifact created for one
//! call; torn down — every file unlinked — on return, success or failure.

use crate::error::{AppError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

pub struct Session {
    id: String,
    root: PathBuf,
}

impl Session {
    /// Create a fresh session directory under `base_dir`.
    pub async fn create(base_dir: &Path) -> Result<Self> {
        let id = Uuid::new_v4().to_string();
        let root = base_dir.join(&id);
        fs::create_dir_all(&root).await?;
        Ok(Self { id, root })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chunk_path(&self, index: usize) -> PathBuf {
        self.root.join(crate::external::normalizer::chunk_file_name(index))
    }

    /// Unlink every file under the session root, per §3.1's teardown
    /// invariant. Idempotent: tearing down a missing directory is not
    /// an error (the session may already have been cleaned up).
    pub async fn teardown(self) -> Result<()> {
        teardown_dir(&self.root).await
    }
}

async fn teardown_dir(root: &Path) -> Result<()> {
    match fs::remove_dir_all(root).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::from(e)),
    }
}

/// Startup sweep of orphaned session directories left behind by a prior
/// crashed process (SPEC_FULL §3 supplement 5), grounded on the original
/// `file_cleanup_manager.py`'s age-based sweep. Removes any directory
/// under `base_dir` older than `max_age`.
pub async fn sweep_orphaned_sessions(base_dir: &Path, max_age: Duration) -> Result<usize> {
    if !base_dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    let mut entries = fs::read_dir(base_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(_) => continue,
        };
        if !metadata.is_dir() {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|m| m.elapsed().ok())
            .unwrap_or_default();
        if age > max_age {
            match teardown_dir(&entry.path()).await {
                Ok(()) => {
                    removed += 1;
                    info!(path = ?entry.path(), "removed orphaned session directory");
                }
                Err(e) => warn!(path = ?entry.path(), error = %e, "failed to remove orphaned session directory"),
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_teardown_removes_all_files() {
        let base = std::env::temp_dir().join(format!("te-session-test-{}", Uuid::new_v4()));
        let session = Session::create(&base).await.unwrap();
        let root = session.root().to_path_buf();
        fs::write(root.join("chunk_000.wav"), b"data").await.unwrap();

        session.teardown().await.unwrap();
        assert!(!root.exists());

        let _ = fs::remove_dir_all(&base).await;
    }

    #[tokio::test]
    async fn sweep_removes_only_stale_directories() {
        let base = std::env::temp_dir().join(format!("te-sweep-test-{}", Uuid::new_v4()));
        fs::create_dir_all(&base).await.unwrap();

        let fresh = Session::create(&base).await.unwrap();
        let removed = sweep_orphaned_sessions(&base, Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert!(fresh.root().exists());

        let _ = fs::remove_dir_all(&base).await;
    }
}
