//! Tree reconciliation engine
//!
//! The [`TreeComparator`] makes a destination tree structurally and
//! byte-for-byte equal to a source tree in one pass.
//!
//! ## Pass Flow
//!
//! 1. **Scan**: list both trees recursively into snapshots keyed by
//!    [`RelativePath`]
//! 2. **Forward pass**: create missing directories, copy missing or changed
//!    files
//! 3. **Reverse pass**: delete destination entries with no source
//!    counterpart
//!
//! The reverse pass removes whole directories without visiting their
//! descendants, which is only sound once the forward pass has finished
//! bringing every surviving directory into place. The two passes therefore
//! run strictly in sequence.
//!
//! ## Error Isolation
//!
//! A failure touching one entry becomes an [`ItemError`] in the
//! [`PassResult`] and the pass moves on. Only a root that cannot be listed
//! (or a destination root that cannot be created) aborts the pass.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Instant,
};

use tracing::{debug, error, info, instrument, warn};
use treemirror_core::{
    domain::{
        Action, EntryKind, FileSystemEntry, ItemError, ItemErrorKind, ItemOperation, PassResult,
        RelativePath, SyncPath,
    },
    ports::ILocalFileSystem,
};

use crate::{comparator::files_equal, SyncError};

// ============================================================================
// TreeSnapshot
// ============================================================================

/// Which side of the mirror a snapshot describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tree {
    Source,
    Destination,
}

/// Every entry found below one root during the current pass
#[derive(Debug)]
struct TreeSnapshot {
    entries: BTreeMap<RelativePath, FileSystemEntry>,
    /// Children that could not be inspected and directories that could not
    /// be listed; what lies at and below them is unknown
    unscanned: BTreeSet<RelativePath>,
}

impl TreeSnapshot {
    fn is_unknown(&self, relative: &RelativePath) -> bool {
        self.unscanned.contains(relative) || has_ancestor_in(&self.unscanned, relative)
    }
}

fn has_ancestor_in(set: &BTreeSet<RelativePath>, relative: &RelativePath) -> bool {
    !set.is_empty() && relative.ancestors().any(|a| set.contains(a))
}

/// Outcome of applying a single action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Done,
    /// A delete found nothing to remove
    AlreadyGone,
    Failed,
}

// ============================================================================
// TreeComparator
// ============================================================================

/// One-way tree reconciliation
///
/// Holds no state between passes: every call to
/// [`reconcile`](TreeComparator::reconcile) scans both trees from scratch.
pub struct TreeComparator {
    filesystem: Arc<dyn ILocalFileSystem>,
}

impl TreeComparator {
    /// Creates a comparator over the given filesystem port
    pub fn new(filesystem: Arc<dyn ILocalFileSystem>) -> Self {
        Self { filesystem }
    }

    /// Runs one full pass: scan, forward pass, reverse pass
    ///
    /// # Returns
    /// The counts of applied actions and every per-item failure. Partial
    /// failures are never reported through `Err`.
    ///
    /// # Errors
    /// Returns [`SyncError::SourceUnavailable`] if the source root cannot be
    /// listed, and [`SyncError::DestinationUnavailable`] if the destination
    /// root cannot be created or listed.
    #[instrument(skip_all, fields(source = %source_root, destination = %destination_root))]
    pub async fn reconcile(
        &self,
        source_root: &SyncPath,
        destination_root: &SyncPath,
    ) -> Result<PassResult, SyncError> {
        let start = Instant::now();
        let mut result = PassResult::begin();

        let source = self
            .scan(source_root, Tree::Source, &mut result)
            .await
            .map_err(|e| SyncError::SourceUnavailable {
                path: source_root.as_path().to_path_buf(),
                cause: format!("{e:#}"),
            })?;

        self.ensure_root(destination_root).await.map_err(|e| {
            SyncError::DestinationUnavailable {
                path: destination_root.as_path().to_path_buf(),
                cause: format!("{e:#}"),
            }
        })?;

        let destination = self
            .scan(destination_root, Tree::Destination, &mut result)
            .await
            .map_err(|e| SyncError::DestinationUnavailable {
                path: destination_root.as_path().to_path_buf(),
                cause: format!("{e:#}"),
            })?;

        debug!(
            source_entries = source.entries.len(),
            destination_entries = destination.entries.len(),
            "Trees scanned"
        );

        let replaced = self
            .forward_pass(&source, &destination, destination_root, &mut result)
            .await;
        self.reverse_pass(&source, &destination, replaced, &mut result)
            .await;

        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    // ========================================================================
    // Scan
    // ========================================================================

    /// Lists every entry below `root`
    ///
    /// Failing to list the root itself is returned as an error. A child
    /// that cannot be inspected, or a nested directory that cannot be
    /// listed, is recorded as an item error and marked unscanned.
    ///
    /// Special files and unresolvable links are dropped from the source and
    /// kept in the destination, where they are always extraneous.
    async fn scan(
        &self,
        root: &SyncPath,
        tree: Tree,
        result: &mut PassResult,
    ) -> anyhow::Result<TreeSnapshot> {
        let mut snapshot = TreeSnapshot {
            entries: BTreeMap::new(),
            unscanned: BTreeSet::new(),
        };

        let mut pending = vec![(root.clone(), self.filesystem.read_dir(root).await?)];

        while let Some((dir, listing)) = pending.pop() {
            for failure in listing.failures {
                let item =
                    ItemError::new(failure.path.as_path(), ItemOperation::Scan, &failure.error);
                self.record_failure(result, item);
                match failure.path.relative_to(root) {
                    Ok(relative) => {
                        snapshot.unscanned.insert(relative);
                    }
                    Err(err) => warn!(path = %failure.path, %err, "Failure outside root"),
                }
            }

            for child in listing.entries {
                let relative = match child.path.relative_to(root) {
                    Ok(r) => r,
                    Err(err) => {
                        warn!(path = %child.path, %err, "Skipping entry outside root");
                        continue;
                    }
                };

                if child.kind == EntryKind::Other && tree == Tree::Source {
                    warn!(path = %child.path, "Skipping special file or unresolvable link");
                    continue;
                }

                let descend = child.kind == EntryKind::Directory && !child.is_symlink;
                if child.kind == EntryKind::Directory && child.is_symlink {
                    debug!(path = %child.path, "Not descending into linked directory");
                }

                let entry = FileSystemEntry {
                    path: child.path,
                    relative,
                    kind: child.kind,
                    size: child.size,
                };

                if descend {
                    match self.filesystem.read_dir(&entry.path).await {
                        Ok(grandchildren) => pending.push((entry.path.clone(), grandchildren)),
                        Err(err) => {
                            self.record_failure(
                                result,
                                ItemError::new(entry.path.as_path(), ItemOperation::Scan, &err),
                            );
                            snapshot.unscanned.insert(entry.relative.clone());
                        }
                    }
                }

                snapshot.entries.insert(entry.relative.clone(), entry);
            }

            debug!(dir = %dir, "Directory scanned");
        }

        Ok(snapshot)
    }

    /// Creates the destination root if it does not exist yet
    async fn ensure_root(&self, root: &SyncPath) -> anyhow::Result<()> {
        let state = self.filesystem.get_state(root).await?;

        if state.is_directory() {
            return Ok(());
        }
        if state.exists {
            anyhow::bail!("{root} exists and is not a directory");
        }

        self.filesystem.create_directory(root).await?;
        info!(path = %root, "Created destination root");
        Ok(())
    }

    // ========================================================================
    // Forward pass
    // ========================================================================

    /// Brings every source entry into the destination
    ///
    /// # Returns
    /// Destination directories removed to make room for a source file; their
    /// descendants are gone and must not be revisited by the reverse pass.
    async fn forward_pass(
        &self,
        source: &TreeSnapshot,
        destination: &TreeSnapshot,
        destination_root: &SyncPath,
        result: &mut PassResult,
    ) -> BTreeSet<RelativePath> {
        let mut replaced = BTreeSet::new();

        for (relative, src) in &source.entries {
            let target = destination_root.join(relative);

            let existing = match destination.entries.get(relative) {
                Some(entry) => Some(entry.clone()),
                None if destination.is_unknown(relative) => {
                    self.lookup(&target, relative).await
                }
                None => None,
            };

            match (src.kind, existing) {
                (EntryKind::Directory, None) => {
                    self.apply(Action::CreateDir(target), result).await;
                }
                (EntryKind::Directory, Some(dst)) if dst.is_directory() => {}
                (EntryKind::Directory, Some(_)) => {
                    // A non-directory sits where the source has a directory
                    if self.apply(Action::DeleteFile(target.clone()), result).await
                        != Applied::Failed
                    {
                        self.apply(Action::CreateDir(target), result).await;
                    }
                }
                (EntryKind::File, None) => {
                    self.apply(
                        Action::CopyFile {
                            source: src.path.clone(),
                            destination: target,
                        },
                        result,
                    )
                    .await;
                }
                (EntryKind::File, Some(dst)) if dst.is_file() => {
                    match files_equal(self.filesystem.as_ref(), src, &dst).await {
                        Ok(true) => {
                            debug!(path = %relative, "Unchanged");
                        }
                        Ok(false) => {
                            self.apply(
                                Action::CopyFile {
                                    source: src.path.clone(),
                                    destination: target,
                                },
                                result,
                            )
                            .await;
                        }
                        Err(err) => {
                            self.record_failure(
                                result,
                                ItemError::new(src.path.as_path(), ItemOperation::Compare, &err),
                            );
                        }
                    }
                }
                (EntryKind::File, Some(dst)) if dst.is_directory() => {
                    // A directory sits where the source has a file
                    if self.apply(Action::DeleteDir(target.clone()), result).await
                        != Applied::Failed
                    {
                        replaced.insert(relative.clone());
                        self.apply(
                            Action::CopyFile {
                                source: src.path.clone(),
                                destination: target,
                            },
                            result,
                        )
                        .await;
                    }
                }
                (EntryKind::File, Some(_)) => {
                    // A special file or broken link sits where the source has a file
                    if self.apply(Action::DeleteFile(target.clone()), result).await
                        != Applied::Failed
                    {
                        self.apply(
                            Action::CopyFile {
                                source: src.path.clone(),
                                destination: target,
                            },
                            result,
                        )
                        .await;
                    }
                }
                // Dropped by the source scan
                (EntryKind::Other, _) => {}
            }
        }

        replaced
    }

    /// Looks up a destination entry the scan could not see
    async fn lookup(&self, target: &SyncPath, relative: &RelativePath) -> Option<FileSystemEntry> {
        match self.filesystem.get_state(target).await {
            Ok(state) => state.kind.map(|kind| FileSystemEntry {
                path: target.clone(),
                relative: relative.clone(),
                kind,
                size: state.size,
            }),
            Err(err) => {
                debug!(path = %target, error = %err, "Lookup failed, treating as absent");
                None
            }
        }
    }

    // ========================================================================
    // Reverse pass
    // ========================================================================

    /// Deletes destination entries that have no source counterpart
    ///
    /// Directories go recursively; their descendants are skipped afterwards.
    /// Nothing at or below an unscanned source entry is deleted, since its
    /// source contents are unknown.
    async fn reverse_pass(
        &self,
        source: &TreeSnapshot,
        destination: &TreeSnapshot,
        mut removed: BTreeSet<RelativePath>,
        result: &mut PassResult,
    ) {
        for (relative, dst) in &destination.entries {
            if source.entries.contains_key(relative) {
                continue;
            }

            if has_ancestor_in(&removed, relative) {
                // Already removed together with an ancestor
                continue;
            }

            if source.is_unknown(relative) {
                debug!(path = %relative, "Kept: source entry could not be scanned");
                continue;
            }

            let action = match dst.kind {
                EntryKind::File | EntryKind::Other => Action::DeleteFile(dst.path.clone()),
                EntryKind::Directory => Action::DeleteDir(dst.path.clone()),
            };

            if self.apply(action, result).await != Applied::Failed
                && dst.kind == EntryKind::Directory
            {
                removed.insert(relative.clone());
            }
        }
    }

    // ========================================================================
    // Apply
    // ========================================================================

    /// Performs one action, logging and counting it
    async fn apply(&self, action: Action, result: &mut PassResult) -> Applied {
        let outcome = match &action {
            Action::CopyFile {
                source,
                destination,
            } => self.filesystem.copy_file(source, destination).await.map(|_| ()),
            Action::CreateDir(path) => self.filesystem.create_directory(path).await,
            Action::DeleteFile(path) => self.filesystem.delete_file(path).await,
            Action::DeleteDir(path) => self.filesystem.delete_directory(path).await,
        };

        let operation = ItemOperation::for_action(&action);

        match outcome {
            Ok(()) => {
                info!(operation = %operation, "{action}");
                result.record(&action);
                Applied::Done
            }
            Err(err) => {
                let subject = match &action {
                    Action::CopyFile { source, .. } => source,
                    other => other.target(),
                };
                let item = ItemError::new(subject.as_path(), operation, &err);

                if action.is_delete() && item.kind == ItemErrorKind::NotFound {
                    debug!(path = %subject, "Already gone");
                    return Applied::AlreadyGone;
                }

                self.record_failure(result, item);
                Applied::Failed
            }
        }
    }

    fn record_failure(&self, result: &mut PassResult, item: ItemError) {
        error!(
            path = %item.path.display(),
            operation = %item.operation,
            kind = %item.kind,
            error = %item.cause,
            "Item failed"
        );
        result.record_error(item);
    }
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::filesystem::LocalFileSystemAdapter;

    fn comparator() -> TreeComparator {
        TreeComparator::new(Arc::new(LocalFileSystemAdapter::new()))
    }

    fn root(dir: &TempDir, name: &str) -> SyncPath {
        let path = dir.path().join(name);
        std::fs::create_dir_all(&path).unwrap();
        SyncPath::new(path).unwrap()
    }

    #[test]
    fn test_has_ancestor_in() {
        let mut set = BTreeSet::new();
        assert!(!has_ancestor_in(&set, &RelativePath::try_from("a/b").unwrap()));

        set.insert(RelativePath::try_from("a").unwrap());
        assert!(has_ancestor_in(&set, &RelativePath::try_from("a/b").unwrap()));
        assert!(has_ancestor_in(&set, &RelativePath::try_from("a/b/c").unwrap()));
        assert!(!has_ancestor_in(&set, &RelativePath::try_from("a").unwrap()));
        assert!(!has_ancestor_in(&set, &RelativePath::try_from("ab/c").unwrap()));
    }

    #[tokio::test]
    async fn test_scan_keys_entries_by_relative_path() {
        let dir = TempDir::new().unwrap();
        let source = root(&dir, "source");
        std::fs::create_dir_all(source.as_path().join("sub/deep")).unwrap();
        std::fs::write(source.as_path().join("a.txt"), b"X").unwrap();
        std::fs::write(source.as_path().join("sub/deep/c.txt"), b"ZZZ").unwrap();

        let mut result = PassResult::begin();
        let snapshot = comparator()
            .scan(&source, Tree::Source, &mut result)
            .await
            .unwrap();

        let keys: Vec<String> = snapshot.entries.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["a.txt", "sub", "sub/deep", "sub/deep/c.txt"]);

        let c = &snapshot.entries[&RelativePath::try_from("sub/deep/c.txt").unwrap()];
        assert_eq!(c.kind, EntryKind::File);
        assert_eq!(c.size, 3);
        assert!(snapshot.unscanned.is_empty());
        assert!(result.is_clean());
    }

    #[tokio::test]
    async fn test_scan_of_empty_root_has_no_entries() {
        let dir = TempDir::new().unwrap();
        let source = root(&dir, "empty");

        let mut result = PassResult::begin();
        let snapshot = comparator()
            .scan(&source, Tree::Source, &mut result)
            .await
            .unwrap();
        assert!(snapshot.entries.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scan_keeps_unresolvable_links_only_in_destination() {
        let dir = TempDir::new().unwrap();
        let tree = root(&dir, "tree");
        std::fs::write(tree.as_path().join("a.txt"), b"X").unwrap();
        std::os::unix::fs::symlink("/nonexistent/target", tree.as_path().join("stale")).unwrap();
        std::os::unix::fs::symlink("loop", tree.as_path().join("loop")).unwrap();

        let mut result = PassResult::begin();
        let source = comparator()
            .scan(&tree, Tree::Source, &mut result)
            .await
            .unwrap();
        let destination = comparator()
            .scan(&tree, Tree::Destination, &mut result)
            .await
            .unwrap();

        let keys = |s: &TreeSnapshot| s.entries.keys().map(|k| k.to_string()).collect::<Vec<_>>();
        assert_eq!(keys(&source), vec!["a.txt"]);
        assert_eq!(keys(&destination), vec!["a.txt", "loop", "stale"]);
        assert!(result.is_clean());
    }

    #[test]
    fn test_is_unknown_covers_entry_and_descendants() {
        let mut snapshot = TreeSnapshot {
            entries: BTreeMap::new(),
            unscanned: BTreeSet::new(),
        };
        snapshot.unscanned.insert(RelativePath::try_from("bad").unwrap());

        assert!(snapshot.is_unknown(&RelativePath::try_from("bad").unwrap()));
        assert!(snapshot.is_unknown(&RelativePath::try_from("bad/child").unwrap()));
        assert!(!snapshot.is_unknown(&RelativePath::try_from("badge").unwrap()));
    }

    #[tokio::test]
    async fn test_ensure_root_creates_missing_destination() {
        let dir = TempDir::new().unwrap();
        let destination = SyncPath::new(dir.path().join("a/b/mirror")).unwrap();

        comparator().ensure_root(&destination).await.unwrap();
        assert!(destination.as_path().is_dir());
    }

    #[tokio::test]
    async fn test_ensure_root_rejects_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file");
        std::fs::write(&path, b"x").unwrap();

        let result = comparator()
            .ensure_root(&SyncPath::new(path).unwrap())
            .await;
        assert!(result.is_err());
    }
}
