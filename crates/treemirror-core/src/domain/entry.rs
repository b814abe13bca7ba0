//! Filesystem entries discovered by a tree scan

use std::fmt::{self, Display, Formatter};

use super::newtypes::{RelativePath, SyncPath};

/// Kind of a scanned entry
///
/// Symbolic links are resolved to the kind of their target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
    /// Neither of the above: a special file (socket, FIFO, device) or a
    /// symbolic link that cannot be resolved. Never mirrored; only ever
    /// removed from the destination.
    Other,
}

impl Display for EntryKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Directory => write!(f, "directory"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// One file or directory found below a tree root during a pass
///
/// Entries are discovered fresh every pass and dropped at pass end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystemEntry {
    /// Absolute location of the entry
    pub path: SyncPath,
    /// Location relative to the tree root; never empty
    pub relative: RelativePath,
    pub kind: EntryKind,
    /// Size in bytes at scan time (0 for directories)
    pub size: u64,
}

impl FileSystemEntry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}
