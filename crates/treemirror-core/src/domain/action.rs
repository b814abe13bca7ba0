//! Filesystem mutations derived from comparing the two trees
//!
//! An [`Action`] is computed for one source/destination pair and applied
//! immediately within the same pass; actions are never queued or persisted.

use std::fmt::{self, Display, Formatter};

use super::newtypes::SyncPath;

/// A single mutation of the destination tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Copy a source file over its destination counterpart
    CopyFile {
        source: SyncPath,
        destination: SyncPath,
    },
    /// Create a destination directory (and any missing ancestors)
    CreateDir(SyncPath),
    /// Remove a destination file
    DeleteFile(SyncPath),
    /// Remove a destination directory with all of its descendants
    DeleteDir(SyncPath),
}

impl Action {
    /// The destination path this action mutates
    pub fn target(&self) -> &SyncPath {
        match self {
            Self::CopyFile { destination, .. } => destination,
            Self::CreateDir(path) | Self::DeleteFile(path) | Self::DeleteDir(path) => path,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::DeleteFile(_) | Self::DeleteDir(_))
    }
}

/// Audit wording, one line per filesystem operation
impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::CopyFile {
                source,
                destination,
            } => write!(f, "Copied: {source} to {destination}"),
            Self::CreateDir(path) => write!(f, "Created directory: {path}"),
            Self::DeleteFile(path) => write!(f, "Deleted file: {path}"),
            Self::DeleteDir(path) => write!(f, "Deleted directory: {path}"),
        }
    }
}
