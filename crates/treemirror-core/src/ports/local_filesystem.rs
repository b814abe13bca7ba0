//! Local filesystem port (driven/secondary port)
//!
//! This module defines every filesystem capability the reconcile pass needs:
//! recursive listing is built on [`ILocalFileSystem::read_dir`], equality on
//! [`ILocalFileSystem::open_read`], and the four mutations map one-to-one to
//! the [`Action`](crate::domain::Action) variants.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because filesystem errors are adapter-specific;
//!   the comparator classifies them into item errors.
//! - All paths are [`SyncPath`]s, which are guaranteed to be absolute.

use tokio::io::AsyncRead;

use crate::domain::{entry::EntryKind, newtypes::SyncPath};

/// A readable byte stream over a file's content
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

// ============================================================================
// FileSystemState struct
// ============================================================================

/// Snapshot of a path's state on the local filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystemState {
    /// Whether the path exists on disk
    pub exists: bool,
    /// Kind of the entry, links resolved (None when nothing resolves there)
    pub kind: Option<EntryKind>,
    /// Size in bytes (0 for anything but a file)
    pub size: u64,
}

impl FileSystemState {
    /// Returns a state representing a non-existent path
    pub fn not_found() -> Self {
        Self {
            exists: false,
            kind: None,
            size: 0,
        }
    }

    /// Returns a state for an existing entry
    pub fn found(kind: EntryKind, size: u64) -> Self {
        Self {
            exists: true,
            kind: Some(kind),
            size,
        }
    }

    /// Returns true if the path exists and is a regular file
    pub fn is_regular_file(&self) -> bool {
        self.kind == Some(EntryKind::File)
    }

    /// Returns true if the path exists and is a directory
    pub fn is_directory(&self) -> bool {
        self.kind == Some(EntryKind::Directory)
    }
}

/// One child returned by [`ILocalFileSystem::read_dir`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub path: SyncPath,
    pub kind: EntryKind,
    pub size: u64,
    /// True when the entry is a symbolic link; linked directories are
    /// reported but not descended into.
    pub is_symlink: bool,
}

/// A child that was listed but could not be inspected
#[derive(Debug)]
pub struct ListingFailure {
    pub path: SyncPath,
    pub error: anyhow::Error,
}

/// Everything found in one directory
///
/// A child that fails to stat lands in `failures` instead of failing the
/// whole listing.
#[derive(Debug, Default)]
pub struct DirListing {
    pub entries: Vec<DirEntry>,
    pub failures: Vec<ListingFailure>,
}

// ============================================================================
// ILocalFileSystem trait
// ============================================================================

/// Port trait for local filesystem operations
///
/// ## Implementation Notes
///
/// - `read_dir` lists one level only. Special files and unresolvable links
///   are reported as [`EntryKind::Other`]; vanished children are skipped.
/// - `copy_file` must overwrite an existing destination file.
/// - `create_directory` behaves like `mkdir -p`.
/// - `delete_directory` removes the directory and all descendants.
#[async_trait::async_trait]
pub trait ILocalFileSystem: Send + Sync {
    /// Lists the direct children of a directory
    ///
    /// # Errors
    /// Returns an error if the directory itself cannot be opened or read.
    /// Failures on individual children are returned inside the listing.
    async fn read_dir(&self, dir: &SyncPath) -> anyhow::Result<DirListing>;

    /// Gets the current state of a path
    ///
    /// Returns `FileSystemState::not_found()` if the path doesn't exist
    /// (does not return an error for missing paths).
    async fn get_state(&self, path: &SyncPath) -> anyhow::Result<FileSystemState>;

    /// Opens a file for sequential reading
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist, is locked, or cannot be read
    async fn open_read(&self, path: &SyncPath) -> anyhow::Result<ByteStream>;

    /// Copies `source` to `destination`, replacing any existing file
    ///
    /// Missing parent directories of `destination` are created.
    ///
    /// # Returns
    /// The number of bytes copied
    async fn copy_file(&self, source: &SyncPath, destination: &SyncPath) -> anyhow::Result<u64>;

    /// Creates a directory and all parent directories as needed
    async fn create_directory(&self, path: &SyncPath) -> anyhow::Result<()>;

    /// Deletes a single file
    async fn delete_file(&self, path: &SyncPath) -> anyhow::Result<()>;

    /// Deletes a directory together with everything below it
    async fn delete_directory(&self, path: &SyncPath) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_state() {
        let state = FileSystemState::not_found();
        assert!(!state.exists);
        assert!(!state.is_regular_file());
        assert!(!state.is_directory());
        assert_eq!(state.size, 0);
    }

    #[test]
    fn test_found_state() {
        let file = FileSystemState::found(EntryKind::File, 12);
        assert!(file.exists);
        assert!(file.is_regular_file());
        assert_eq!(file.size, 12);

        let dir = FileSystemState::found(EntryKind::Directory, 0);
        assert!(dir.is_directory());
        assert!(!dir.is_regular_file());
    }
}
