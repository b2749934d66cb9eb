//! Root-contained file operations.
//!
//! Provides:
//! - `FileOps` - list, read, peek and write, all routed through `WorkspaceRoots`
//! - `BackupManager` - timestamped copies taken before every overwrite

pub mod backup;
pub mod ops;

pub use backup::{BACKUP_DIR, BackupManager};
pub use ops::{
    DEFAULT_PEEK_LIMIT, DirEntry, FileContent, FileOpError, FileOps, Listing, Preview, Saved,
};
