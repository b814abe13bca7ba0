//! Pass results and per-item failures
//!
//! A pass never aborts because one entry misbehaves. Each failure touching a
//! single entry becomes an [`ItemError`] and is aggregated into the
//! [`PassResult`] alongside the counters of applied actions.

use std::fmt::{self, Display, Formatter};
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::action::Action;

// ============================================================================
// ItemOperation
// ============================================================================

/// The operation that was being attempted when an item failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemOperation {
    /// Listing a directory below one of the roots
    Scan,
    /// Comparing a source file with its destination counterpart
    Compare,
    Copy,
    CreateDir,
    DeleteFile,
    DeleteDir,
}

impl ItemOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Compare => "compare",
            Self::Copy => "copy",
            Self::CreateDir => "create_dir",
            Self::DeleteFile => "delete_file",
            Self::DeleteDir => "delete_dir",
        }
    }

    /// The operation an action performs
    pub fn for_action(action: &Action) -> Self {
        match action {
            Action::CopyFile { .. } => Self::Copy,
            Action::CreateDir(_) => Self::CreateDir,
            Action::DeleteFile(_) => Self::DeleteFile,
            Action::DeleteDir(_) => Self::DeleteDir,
        }
    }
}

impl Display for ItemOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ItemErrorKind
// ============================================================================

/// Coarse classification of an item failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemErrorKind {
    PermissionDenied,
    /// The entry vanished between the scan and the operation
    NotFound,
    /// The file is held open or locked by another process
    Locked,
    PathTooLong,
    Other,
}

impl ItemErrorKind {
    /// Classify an error by the first I/O error in its chain
    pub fn classify(err: &anyhow::Error) -> Self {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<std::io::Error>())
            .map(Self::from_io)
            .unwrap_or(Self::Other)
    }

    /// Classify a raw I/O error
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::PermissionDenied => return Self::PermissionDenied,
            ErrorKind::NotFound => return Self::NotFound,
            ErrorKind::WouldBlock => return Self::Locked,
            _ => {}
        }

        match err.raw_os_error() {
            Some(code) if is_lock_violation(code) => Self::Locked,
            Some(code) if is_name_too_long(code) => Self::PathTooLong,
            _ => Self::Other,
        }
    }
}

#[cfg(unix)]
fn is_lock_violation(code: i32) -> bool {
    // ETXTBSY
    code == 26
}

#[cfg(windows)]
fn is_lock_violation(code: i32) -> bool {
    // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
    code == 32 || code == 33
}

#[cfg(not(any(unix, windows)))]
fn is_lock_violation(_code: i32) -> bool {
    false
}

#[cfg(target_os = "linux")]
fn is_name_too_long(code: i32) -> bool {
    // ENAMETOOLONG
    code == 36
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_name_too_long(code: i32) -> bool {
    // ENAMETOOLONG on the BSD family
    code == 63
}

#[cfg(windows)]
fn is_name_too_long(code: i32) -> bool {
    // ERROR_FILENAME_EXCED_RANGE
    code == 206
}

#[cfg(not(any(unix, windows)))]
fn is_name_too_long(_code: i32) -> bool {
    false
}

impl Display for ItemErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PermissionDenied => "permission denied",
            Self::NotFound => "not found",
            Self::Locked => "locked",
            Self::PathTooLong => "path too long",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

// ============================================================================
// ItemError
// ============================================================================

/// A failure on a single entry that did not abort the pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    /// The path being operated on
    pub path: PathBuf,
    pub operation: ItemOperation,
    pub kind: ItemErrorKind,
    /// Rendered error chain
    pub cause: String,
}

impl ItemError {
    /// Build an item error from an adapter failure
    pub fn new(path: impl Into<PathBuf>, operation: ItemOperation, err: &anyhow::Error) -> Self {
        Self {
            path: path.into(),
            operation,
            kind: ItemErrorKind::classify(err),
            cause: format!("{err:#}"),
        }
    }
}

impl Display for ItemError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed for {} ({}): {}",
            self.operation,
            self.path.display(),
            self.kind,
            self.cause
        )
    }
}

// ============================================================================
// PassResult
// ============================================================================

/// Summary of one reconcile pass
#[derive(Debug, Clone)]
pub struct PassResult {
    /// Number of files copied into the destination
    pub files_copied: u32,
    /// Number of destination directories created
    pub dirs_created: u32,
    /// Number of destination files deleted
    pub files_deleted: u32,
    /// Number of destination directories deleted (recursively)
    pub dirs_deleted: u32,
    /// Per-item failures, in the order they occurred
    pub errors: Vec<ItemError>,
    /// Wall-clock start of the pass
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the pass in milliseconds
    pub duration_ms: u64,
}

impl PassResult {
    /// An empty result for a pass starting now
    pub fn begin() -> Self {
        Self {
            files_copied: 0,
            dirs_created: 0,
            files_deleted: 0,
            dirs_deleted: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Count a successfully applied action
    pub fn record(&mut self, action: &Action) {
        match action {
            Action::CopyFile { .. } => self.files_copied += 1,
            Action::CreateDir(_) => self.dirs_created += 1,
            Action::DeleteFile(_) => self.files_deleted += 1,
            Action::DeleteDir(_) => self.dirs_deleted += 1,
        }
    }

    pub fn record_error(&mut self, error: ItemError) {
        self.errors.push(error);
    }

    /// Total number of filesystem mutations applied
    pub fn actions_applied(&self) -> u32 {
        self.files_copied + self.dirs_created + self.files_deleted + self.dirs_deleted
    }

    /// True when the pass had no item failures
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::domain::newtypes::SyncPath;

    fn path(p: &str) -> SyncPath {
        SyncPath::new(PathBuf::from(p)).unwrap()
    }

    #[test]
    fn test_begin_is_empty() {
        let result = PassResult::begin();
        assert_eq!(result.actions_applied(), 0);
        assert!(result.is_clean());
        assert_eq!(result.duration_ms, 0);
    }

    #[test]
    fn test_record_counts_each_action_kind() {
        let mut result = PassResult::begin();
        result.record(&Action::CopyFile {
            source: path("/s/a"),
            destination: path("/d/a"),
        });
        result.record(&Action::CreateDir(path("/d/sub")));
        result.record(&Action::DeleteFile(path("/d/x")));
        result.record(&Action::DeleteDir(path("/d/y")));
        result.record(&Action::DeleteDir(path("/d/z")));

        assert_eq!(result.files_copied, 1);
        assert_eq!(result.dirs_created, 1);
        assert_eq!(result.files_deleted, 1);
        assert_eq!(result.dirs_deleted, 2);
        assert_eq!(result.actions_applied(), 5);
    }

    #[test]
    fn test_classify_walks_context_chain() {
        let err = anyhow::Error::new(io::Error::from(io::ErrorKind::PermissionDenied))
            .context("Failed to open /s/a.txt");
        assert_eq!(ItemErrorKind::classify(&err), ItemErrorKind::PermissionDenied);

        let err = anyhow::anyhow!("no io error here");
        assert_eq!(ItemErrorKind::classify(&err), ItemErrorKind::Other);
    }

    #[test]
    fn test_from_io_kinds() {
        assert_eq!(
            ItemErrorKind::from_io(&io::Error::from(io::ErrorKind::NotFound)),
            ItemErrorKind::NotFound
        );
        assert_eq!(
            ItemErrorKind::from_io(&io::Error::from(io::ErrorKind::WouldBlock)),
            ItemErrorKind::Locked
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_from_io_raw_codes_linux() {
        assert_eq!(
            ItemErrorKind::from_io(&io::Error::from_raw_os_error(36)),
            ItemErrorKind::PathTooLong
        );
        assert_eq!(
            ItemErrorKind::from_io(&io::Error::from_raw_os_error(26)),
            ItemErrorKind::Locked
        );
    }

    #[test]
    fn test_item_error_display() {
        let err = anyhow::Error::new(io::Error::from(io::ErrorKind::NotFound)).context("gone");
        let item = ItemError::new("/d/a.txt", ItemOperation::DeleteFile, &err);

        assert_eq!(item.kind, ItemErrorKind::NotFound);
        let rendered = item.to_string();
        assert!(rendered.starts_with("delete_file failed for /d/a.txt (not found): gone"));
    }
}
