//! Overwrite backups.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Local};
use tokio::sync::OwnedMutexGuard;

/// Hidden directory, colocated with the original file, that holds its backups.
pub const BACKUP_DIR: &str = ".backups";

type LockTable = Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>;

/// Takes timestamped copies of files before they are overwritten.
///
/// Also hands out per-destination write locks so two concurrent writes to the
/// same file cannot interleave their check-then-copy.
#[derive(Debug, Clone, Default)]
pub struct BackupManager {
    locks: Arc<LockTable>,
}

impl BackupManager {
    /// Create a new backup manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the write lock for a destination path.
    pub async fn lock(&self, target: &Path) -> WriteGuard {
        let mutex = {
            let mut table = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(table.entry(target.to_path_buf()).or_default())
        };
        let guard = mutex.lock_owned().await;
        WriteGuard {
            key: target.to_path_buf(),
            locks: Arc::clone(&self.locks),
            _guard: guard,
        }
    }

    /// Copy `target` into its backup area if it currently exists as a file.
    ///
    /// Returns the backup path, or `None` when there was nothing to back up.
    ///
    /// # Errors
    /// Returns error if the backup directory or copy cannot be written.
    pub async fn backup(&self, target: &Path) -> io::Result<Option<PathBuf>> {
        match tokio::fs::metadata(target).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(None),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        }

        let Some(dest) = backup_path(target, Local::now()) else {
            return Ok(None);
        };
        if let Some(dir) = dest.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::copy(target, &dest).await?;
        tracing::debug!(
            original = %target.display(),
            backup = %dest.display(),
            "Backed up file before overwrite"
        );
        Ok(Some(dest))
    }
}

/// Backup location for `target` taken at `at`.
///
/// Names have one-second resolution, so two backups of the same file within
/// one second share a slot.
#[must_use]
pub fn backup_path(target: &Path, at: DateTime<Local>) -> Option<PathBuf> {
    let name = target.file_name()?;
    let dir = target.parent()?;
    let mut file = name.to_os_string();
    file.push(format!(".bak-{}", at.format("%Y%m%d-%H%M%S")));
    Some(dir.join(BACKUP_DIR).join(file))
}

/// Exclusive write access to one destination path.
pub struct WriteGuard {
    key: PathBuf,
    locks: Arc<LockTable>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        let mut table = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the table and this guard reference the mutex: nobody is waiting.
        if table
            .get(&self.key)
            .is_some_and(|mutex| Arc::strong_count(mutex) <= 2)
        {
            table.remove(&self.key);
        }
    }
}
