//! List, read, peek and write inside the workspace roots.

use std::{io, path::Path};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use workgate_core::{PathError, ResolvedPath, WorkspaceRoots};

use crate::backup::BackupManager;

/// Default number of lines returned by [`FileOps::peek`].
pub const DEFAULT_PEEK_LIMIT: usize = 50;

/// File operation error.
#[derive(Debug, Error)]
pub enum FileOpError {
    #[error("Path escape: {0}")]
    PathEscape(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    #[error("Is a directory: {0}")]
    IsADirectory(String),
    #[error("Not a text file: {0}")]
    NotDecodable(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl From<PathError> for FileOpError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::Escape(path) => Self::PathEscape(path),
            other => Self::Io {
                path: String::new(),
                source: io::Error::other(other.to_string()),
            },
        }
    }
}

impl FileOpError {
    fn io(path: &str) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| {
            if source.kind() == io::ErrorKind::NotFound {
                Self::NotFound(path.to_string())
            } else {
                Self::Io {
                    path: path.to_string(),
                    source,
                }
            }
        }
    }
}

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    /// Last modification time (RFC 3339, UTC).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

/// Directory listing, directories first.
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    /// Root-relative path of the listed directory.
    pub path: String,
    pub entries: Vec<DirEntry>,
}

/// Whole-file content.
#[derive(Debug, Clone, Serialize)]
pub struct FileContent {
    pub path: String,
    pub content: String,
}

/// First lines of a file.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub path: String,
    pub preview: String,
    /// Number of lines in `preview`.
    pub lines: usize,
}

/// Result of a write.
#[derive(Debug, Clone, Serialize)]
pub struct Saved {
    /// Root-relative path that was written.
    pub saved: String,
}

/// File operations confined to the workspace roots.
#[derive(Debug, Clone)]
pub struct FileOps {
    roots: WorkspaceRoots,
    backups: BackupManager,
}

impl FileOps {
    /// Create file operations over the given roots.
    #[must_use]
    pub fn new(roots: WorkspaceRoots) -> Self {
        Self {
            roots,
            backups: BackupManager::new(),
        }
    }

    /// The roots these operations are confined to.
    #[must_use]
    pub const fn roots(&self) -> &WorkspaceRoots {
        &self.roots
    }

    /// List a directory.
    ///
    /// # Errors
    /// `PathEscape`, `NotFound`, `NotADirectory`, or I/O failure.
    pub async fn list(&self, path: &str) -> Result<Listing, FileOpError> {
        let resolved = self.roots.resolve(path)?;
        let meta = tokio::fs::metadata(resolved.path())
            .await
            .map_err(FileOpError::io(path))?;
        if !meta.is_dir() {
            return Err(FileOpError::NotADirectory(path.to_string()));
        }

        let mut reader = tokio::fs::read_dir(resolved.path())
            .await
            .map_err(FileOpError::io(path))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(FileOpError::io(path))? {
            // Follow symlinks for type and size; fall back to the link itself.
            let meta = match tokio::fs::metadata(entry.path()).await {
                Ok(meta) => meta,
                Err(_) => match entry.metadata().await {
                    Ok(meta) => meta,
                    Err(err) => {
                        tracing::debug!(entry = %entry.path().display(), %err, "Skipping unreadable entry");
                        continue;
                    }
                },
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_directory: meta.is_dir(),
                size: if meta.is_dir() { 0 } else { meta.len() },
                modified: meta
                    .modified()
                    .ok()
                    .map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Secs, true)),
            });
        }

        sort_entries(&mut entries);
        Ok(Listing {
            path: resolved.relative_display(),
            entries,
        })
    }

    /// Read a whole text file.
    ///
    /// # Errors
    /// `PathEscape`, `NotFound`, `IsADirectory`, `NotDecodable`, or I/O failure.
    pub async fn read(&self, path: &str) -> Result<FileContent, FileOpError> {
        let resolved = self.resolve_file(path).await?;
        let bytes = tokio::fs::read(resolved.path())
            .await
            .map_err(FileOpError::io(path))?;
        let content = String::from_utf8(bytes)
            .ok()
            .filter(|text| !text.contains('\0'))
            .ok_or_else(|| FileOpError::NotDecodable(path.to_string()))?;
        Ok(FileContent {
            path: resolved.relative_display(),
            content,
        })
    }

    /// Read up to `limit` lines from the start of a text file.
    ///
    /// An empty file has nothing to preview and is reported as `NotDecodable`.
    ///
    /// # Errors
    /// Same as [`Self::read`].
    pub async fn peek(&self, path: &str, limit: usize) -> Result<Preview, FileOpError> {
        let resolved = self.resolve_file(path).await?;
        let file = tokio::fs::File::open(resolved.path())
            .await
            .map_err(FileOpError::io(path))?;

        let limit = limit.max(1);
        let mut lines = BufReader::new(file).lines();
        let mut collected = Vec::new();
        while collected.len() < limit {
            match lines.next_line().await {
                Ok(Some(line)) if line.contains('\0') => {
                    return Err(FileOpError::NotDecodable(path.to_string()));
                }
                Ok(Some(line)) => collected.push(line),
                Ok(None) => break,
                Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                    return Err(FileOpError::NotDecodable(path.to_string()));
                }
                Err(err) => return Err(FileOpError::io(path)(err)),
            }
        }

        if collected.is_empty() {
            return Err(FileOpError::NotDecodable(path.to_string()));
        }
        Ok(Preview {
            path: resolved.relative_display(),
            lines: collected.len(),
            preview: collected.join("\n"),
        })
    }

    /// Write a file, backing up any existing content first.
    ///
    /// Containment is checked before anything is created on disk.
    ///
    /// # Errors
    /// `PathEscape`, `IsADirectory`, or I/O failure.
    pub async fn write(&self, path: &str, content: &str) -> Result<Saved, FileOpError> {
        let resolved = self.roots.resolve(path)?;
        let target = resolved.path();
        let _guard = self.backups.lock(target).await;

        if tokio::fs::metadata(target).await.is_ok_and(|meta| meta.is_dir()) {
            return Err(FileOpError::IsADirectory(path.to_string()));
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(FileOpError::io(path))?;
        }
        self.backups
            .backup(target)
            .await
            .map_err(FileOpError::io(path))?;
        tokio::fs::write(target, content)
            .await
            .map_err(FileOpError::io(path))?;

        tracing::info!(path = %target.display(), bytes = content.len(), "Saved file");
        Ok(Saved {
            saved: resolved.relative_display(),
        })
    }

    async fn resolve_file(&self, path: &str) -> Result<ResolvedPath, FileOpError> {
        let resolved = self.roots.resolve(path)?;
        if is_dir(resolved.path()).await.map_err(FileOpError::io(path))? {
            return Err(FileOpError::IsADirectory(path.to_string()));
        }
        Ok(resolved)
    }
}

async fn is_dir(path: &Path) -> io::Result<bool> {
    tokio::fs::metadata(path).await.map(|meta| meta.is_dir())
}

/// Directories first, then case-insensitive name order.
fn sort_entries(entries: &mut [DirEntry]) {
    entries.sort_by(|a, b| {
        b.is_directory
            .cmp(&a.is_directory)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.name.cmp(&b.name))
    });
}
