//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`ILocalFileSystem`] using `tokio::fs` for async file operations.
//!
//! ## Design Decisions
//!
//! - **Atomic replace**: Copies go to a uniquely named staging file in the
//!   target directory and are then renamed over the target, so an
//!   interrupted copy never leaves a truncated file under the real name.
//!   The staging file is created exclusively and can never clobber a
//!   mirrored entry.
//! - **Symlinks**: Resolved to their target's kind. Links that cannot be
//!   resolved (dangling, or looping back on themselves) are reported as
//!   [`EntryKind::Other`], like special files.
//! - **Per-child failures**: A child that cannot be inspected is returned
//!   as a [`ListingFailure`]; its siblings are still listed.
//! - **Vanishing entries**: A child that disappears between the directory
//!   listing and its `stat` is skipped rather than failing the listing.

use std::{io, io::ErrorKind, path::Path};

use anyhow::{anyhow, Context};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use treemirror_core::{
    domain::{EntryKind, SyncPath},
    ports::local_filesystem::{
        ByteStream, DirEntry, DirListing, FileSystemState, ILocalFileSystem, ListingFailure,
    },
};

/// Name prefix of the staging file a copy is written to
const STAGING_PREFIX: &str = ".treemirror-";
const STAGING_SUFFIX: &str = ".tmp";

// ============================================================================
// LocalFileSystemAdapter struct
// ============================================================================

/// Adapter that bridges the [`ILocalFileSystem`] port to the real filesystem.
///
/// This is a zero-sized struct because all operations derive their context
/// from the [`SyncPath`] arguments. The roots live at a higher layer.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystemAdapter;

impl LocalFileSystemAdapter {
    /// Create a new `LocalFileSystemAdapter`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn kind_of(metadata: &std::fs::Metadata) -> EntryKind {
    if metadata.is_dir() {
        EntryKind::Directory
    } else if metadata.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    }
}

/// Whether resolving a link failed because its target is missing or the
/// link points back into itself
fn is_unresolvable_link(err: &io::Error) -> bool {
    err.kind() == ErrorKind::NotFound || err.raw_os_error().is_some_and(is_link_loop)
}

#[cfg(target_os = "linux")]
fn is_link_loop(code: i32) -> bool {
    // ELOOP
    code == 40
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_link_loop(code: i32) -> bool {
    // ELOOP on the BSD family
    code == 62
}

#[cfg(not(unix))]
fn is_link_loop(_code: i32) -> bool {
    false
}

// ============================================================================
// ILocalFileSystem implementation
// ============================================================================

#[async_trait::async_trait]
impl ILocalFileSystem for LocalFileSystemAdapter {
    #[instrument(skip(self), fields(dir = %dir))]
    async fn read_dir(&self, dir: &SyncPath) -> anyhow::Result<DirListing> {
        let mut entries = tokio::fs::read_dir(dir.as_path())
            .await
            .with_context(|| format!("Failed to read directory: {dir}"))?;

        let mut listing = DirListing::default();

        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("Failed to read directory: {dir}"))?
        {
            let path = SyncPath::new(entry.path())?;

            let file_type = match entry.file_type().await {
                Ok(t) => t,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(path = %path, "entry vanished during listing");
                    continue;
                }
                Err(e) => {
                    let error = anyhow::Error::new(e).context(format!("Failed to stat {path}"));
                    listing.failures.push(ListingFailure { path, error });
                    continue;
                }
            };

            let is_symlink = file_type.is_symlink();

            // Follows links, so a link reports its target's kind and size.
            let metadata = match tokio::fs::metadata(path.as_path()).await {
                Ok(m) => m,
                Err(e) if is_symlink && is_unresolvable_link(&e) => {
                    debug!(path = %path, error = %e, "symbolic link cannot be resolved");
                    listing.entries.push(DirEntry {
                        path,
                        kind: EntryKind::Other,
                        size: 0,
                        is_symlink,
                    });
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(path = %path, "entry vanished during listing");
                    continue;
                }
                Err(e) => {
                    let error = anyhow::Error::new(e).context(format!("Failed to stat {path}"));
                    listing.failures.push(ListingFailure { path, error });
                    continue;
                }
            };

            let kind = kind_of(&metadata);
            let size = if kind == EntryKind::File {
                metadata.len()
            } else {
                0
            };

            listing.entries.push(DirEntry {
                path,
                kind,
                size,
                is_symlink,
            });
        }

        debug!(
            count = listing.entries.len(),
            failures = listing.failures.len(),
            "directory listed"
        );
        Ok(listing)
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn get_state(&self, path: &SyncPath) -> anyhow::Result<FileSystemState> {
        let metadata = match tokio::fs::metadata(path.as_path()).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("path not found");
                return Ok(FileSystemState::not_found());
            }
            Err(e) => return Err(e.into()),
        };

        let state = match kind_of(&metadata) {
            EntryKind::File => FileSystemState::found(EntryKind::File, metadata.len()),
            kind => FileSystemState::found(kind, 0),
        };

        debug!(exists = state.exists, kind = ?state.kind, size = state.size, "state retrieved");
        Ok(state)
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn open_read(&self, path: &SyncPath) -> anyhow::Result<ByteStream> {
        let file = tokio::fs::File::open(path.as_path()).await?;
        Ok(Box::new(file))
    }

    #[instrument(skip(self), fields(source = %source, destination = %destination))]
    async fn copy_file(&self, source: &SyncPath, destination: &SyncPath) -> anyhow::Result<u64> {
        let target = destination.as_path().to_path_buf();
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow!("{destination} has no parent directory"))?;

        tokio::fs::create_dir_all(&parent).await?;

        let mut reader = tokio::fs::File::open(source.as_path()).await?;
        let permissions = reader.metadata().await?.permissions();

        // Exclusive create: never reuses the name of an existing entry.
        let staging = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(STAGING_PREFIX)
                .suffix(STAGING_SUFFIX)
                .tempfile_in(&parent)
        })
        .await??;

        // From here on, dropping `staging_path` removes the staging file.
        let (file, staging_path) = staging.into_parts();
        debug!(staging = ?staging_path, "copying to staging file");

        let mut writer = tokio::fs::File::from_std(file);
        let bytes = tokio::io::copy(&mut reader, &mut writer).await?;
        writer.flush().await?;
        drop(writer);

        tokio::fs::set_permissions(&staging_path, permissions).await?;

        debug!("renaming staging file to target");
        tokio::task::spawn_blocking(move || staging_path.persist(&target))
            .await?
            .map_err(|e| e.error)?;

        debug!(bytes, "copy complete");
        Ok(bytes)
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn create_directory(&self, path: &SyncPath) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(path.as_path()).await?;
        debug!("directory created");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn delete_file(&self, path: &SyncPath) -> anyhow::Result<()> {
        // Also removes links and special files without touching their target.
        tokio::fs::remove_file(path.as_path()).await?;
        debug!("file removed");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn delete_directory(&self, path: &SyncPath) -> anyhow::Result<()> {
        tokio::fs::remove_dir_all(path.as_path()).await?;
        debug!("directory removed recursively");
        Ok(())
    }
}

// ============================================================================
// Unit tests
// ============================================================================
