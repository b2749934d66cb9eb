//! Workspace roots and path containment.
//!
//! Every filesystem-touching operation goes through [`WorkspaceRoots::resolve`].
//! Containment is decided on the canonical form of the candidate path, so a
//! symlink inside a root cannot be used to reach files outside of it.

use std::{
    io,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;

/// Path resolution error.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("Path escape: {0}")]
    Escape(String),
    #[error("No workspace roots configured")]
    NoRoots,
    #[error("Failed to prepare workspace root {}: {source}", path.display())]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A canonical path together with the root that contains it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    path: PathBuf,
    root: PathBuf,
}

impl ResolvedPath {
    /// Absolute canonical path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The workspace root containing [`Self::path`].
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path relative to its owning root (empty for the root itself).
    #[must_use]
    pub fn relative(&self) -> &Path {
        self.path.strip_prefix(&self.root).unwrap_or_else(|_| Path::new(""))
    }

    /// Root-relative path with `/` separators, `.` for the root itself.
    #[must_use]
    pub fn relative_display(&self) -> String {
        let parts: Vec<_> = self
            .relative()
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        if parts.is_empty() {
            ".".to_string()
        } else {
            parts.join("/")
        }
    }

    /// Consume into the absolute path.
    #[must_use]
    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

/// The configured, canonicalized workspace roots.
///
/// Always holds at least one root. The first one is the primary root: the
/// default working directory and the home of the execution transcript.
#[derive(Debug, Clone)]
pub struct WorkspaceRoots {
    roots: Arc<[PathBuf]>,
}

impl WorkspaceRoots {
    /// Create (if absent) and canonicalize each root directory.
    ///
    /// Duplicates that canonicalize to the same directory are collapsed.
    ///
    /// # Errors
    /// Returns error if no roots are given or a root cannot be created.
    pub fn prepare<I, P>(dirs: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut roots: Vec<PathBuf> = Vec::new();
        for dir in dirs {
            let dir = expand_home(dir.as_ref());
            let canonical = std::fs::create_dir_all(&dir)
                .and_then(|()| dir.canonicalize())
                .map_err(|source| PathError::Root {
                    path: dir.clone(),
                    source,
                })?;
            if !roots.contains(&canonical) {
                tracing::debug!(root = %canonical.display(), "Workspace root ready");
                roots.push(canonical);
            }
        }

        if roots.is_empty() {
            return Err(PathError::NoRoots);
        }
        Ok(Self {
            roots: roots.into(),
        })
    }

    /// The primary root.
    #[must_use]
    pub fn primary(&self) -> &Path {
        &self.roots[0]
    }

    /// All roots, in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(PathBuf::as_path)
    }

    /// Resolve a caller-supplied relative path into a contained canonical path.
    ///
    /// Roots are tried in order; the first whose canonical form prefixes the
    /// canonical candidate wins. Absolute inputs are rejected outright.
    ///
    /// # Errors
    /// Returns [`PathError::Escape`] if the path lands outside every root.
    pub fn resolve(&self, input: &str) -> Result<ResolvedPath, PathError> {
        let raw = Path::new(input);
        let has_prefix = matches!(raw.components().next(), Some(Component::Prefix(_)));
        if raw.is_absolute() || raw.has_root() || has_prefix {
            return Err(PathError::Escape(input.to_string()));
        }

        let relative = expand_home(raw);
        for root in self.roots.iter() {
            let candidate = match canonicalize_lenient(&root.join(&relative)) {
                Ok(candidate) => candidate,
                Err(err) => {
                    tracing::debug!(input, root = %root.display(), %err, "Candidate cannot be canonicalized");
                    continue;
                }
            };
            if candidate.starts_with(root) {
                return Ok(ResolvedPath {
                    path: candidate,
                    root: root.clone(),
                });
            }
        }

        Err(PathError::Escape(input.to_string()))
    }
}

/// Canonicalize a path whose trailing components may not exist yet.
///
/// Existing prefixes are resolved through the filesystem (symlinks included);
/// missing components are appended lexically. Because the prefix is canonical
/// at every step, `..` pops a real parent rather than a symlink name.
fn canonicalize_lenient(path: &Path) -> io::Result<PathBuf> {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                resolved.push(name);
                match std::fs::symlink_metadata(&resolved) {
                    // A dangling symlink fails here and is surfaced as an error.
                    Ok(_) => resolved = resolved.canonicalize()?,
                    Err(err)
                        if matches!(
                            err.kind(),
                            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                        ) => {}
                    Err(err) => return Err(err),
                }
            }
        }
    }
    Ok(resolved)
}

fn expand_home(path: &Path) -> PathBuf {
    let mut components = path.components();
    if let Some(Component::Normal(first)) = components.next() {
        if first == "~" {
            if let Some(home) = dirs::home_dir() {
                return home.join(components.as_path());
            }
        }
    }
    path.to_path_buf()
}
