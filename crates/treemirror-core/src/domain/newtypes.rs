//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for the two kinds of paths a
//! mirror pass deals with. Each newtype ensures validity at construction time.

use std::borrow::Borrow;
use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path, PathBuf};

use super::errors::DomainError;

// ============================================================================
// Absolute paths
// ============================================================================

/// A validated absolute path
///
/// SyncPath ensures the path is:
/// - Absolute
/// - Normalized (no . or .. components)
///
/// Both tree roots and every entry discovered under them are `SyncPath`s.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyncPath(PathBuf);

impl SyncPath {
    /// Create a new SyncPath, validating it is absolute
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` if the path is not absolute or
    /// escapes the filesystem root via `..`
    pub fn new(path: PathBuf) -> Result<Self, DomainError> {
        if !path.is_absolute() {
            return Err(DomainError::InvalidPath(format!(
                "Path must be absolute: {}",
                path.display()
            )));
        }

        // Lexical normalization only: the path may not exist yet
        let normalized = Self::normalize_path(&path)?;
        Ok(Self(normalized))
    }

    /// Get the inner path reference
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Get the path relative to a root
    ///
    /// The result is never empty: the root itself is not a member of its
    /// own tree.
    ///
    /// # Errors
    /// Returns `DomainError::PathNotInRoot` if this path is not strictly
    /// below `root`
    pub fn relative_to(&self, root: &SyncPath) -> Result<RelativePath, DomainError> {
        let suffix = self.0.strip_prefix(&root.0).map_err(|_| {
            DomainError::PathNotInRoot(format!(
                "{} is not within {}",
                self.0.display(),
                root.0.display()
            ))
        })?;

        if suffix.as_os_str().is_empty() {
            return Err(DomainError::PathNotInRoot(format!(
                "{} is the root itself",
                self.0.display()
            )));
        }

        RelativePath::new(suffix.to_path_buf())
    }

    /// Resolve a root-relative path against this path
    #[must_use]
    pub fn join(&self, relative: &RelativePath) -> SyncPath {
        // RelativePath is already normalized and free of `..`, so the joined
        // path stays absolute and normalized.
        Self(self.0.join(&relative.0))
    }

    /// Whether this path is equal to or below `other`
    #[must_use]
    pub fn starts_with(&self, other: &SyncPath) -> bool {
        self.0.starts_with(&other.0)
    }

    /// Normalize a path by resolving . and .. components
    fn normalize_path(path: &Path) -> Result<PathBuf, DomainError> {
        let mut normalized = PathBuf::new();

        for component in path.components() {
            match component {
                Component::Prefix(p) => normalized.push(p.as_os_str()),
                Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(DomainError::InvalidPath(
                            "Path escapes root via ..".to_string(),
                        ));
                    }
                }
                Component::Normal(c) => normalized.push(c),
            }
        }

        Ok(normalized)
    }
}

impl Display for SyncPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl TryFrom<PathBuf> for SyncPath {
    type Error = DomainError;

    fn try_from(path: PathBuf) -> Result<Self, Self::Error> {
        Self::new(path)
    }
}

impl From<SyncPath> for PathBuf {
    fn from(sync_path: SyncPath) -> Self {
        sync_path.0
    }
}

impl AsRef<Path> for SyncPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

// ============================================================================
// Root-relative paths
// ============================================================================

/// The suffix of an entry path after its root prefix
///
/// This is the join key between a source entry and its destination
/// counterpart. A RelativePath is never empty, never absolute and never
/// contains `..`.
///
/// Ordering compares component by component, so a directory sorts
/// immediately before all of its descendants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelativePath(PathBuf);

impl RelativePath {
    /// Create a new RelativePath
    ///
    /// # Errors
    /// Returns `DomainError::InvalidRelativePath` if the path is empty,
    /// rooted, or contains `..`
    pub fn new(path: PathBuf) -> Result<Self, DomainError> {
        let mut normalized = PathBuf::new();

        for component in path.components() {
            match component {
                Component::Normal(c) => normalized.push(c),
                Component::CurDir => {}
                Component::Prefix(_) | Component::RootDir | Component::ParentDir => {
                    return Err(DomainError::InvalidRelativePath(format!(
                        "{} must be a plain relative path",
                        path.display()
                    )));
                }
            }
        }

        if normalized.as_os_str().is_empty() {
            return Err(DomainError::InvalidRelativePath(
                "relative path must not be empty".to_string(),
            ));
        }

        Ok(Self(normalized))
    }

    /// Get the inner path reference
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Proper ancestors, nearest first; excludes the path itself and the root
    pub fn ancestors(&self) -> impl Iterator<Item = &Path> {
        self.0
            .ancestors()
            .skip(1)
            .filter(|a| !a.as_os_str().is_empty())
    }
}

impl Display for RelativePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl TryFrom<&str> for RelativePath {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(PathBuf::from(value))
    }
}

impl AsRef<Path> for RelativePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

// Ordering and hashing agree with `Path`, so sets of relative paths can be
// queried with plain path slices.
impl Borrow<Path> for RelativePath {
    fn borrow(&self) -> &Path {
        &self.0
    }
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod sync_path_tests {
        use super::*;

        #[test]
        fn test_new_absolute_path() {
            let path = SyncPath::new(PathBuf::from("/home/user/source")).unwrap();
            assert_eq!(path.to_string(), "/home/user/source");
        }

        #[test]
        fn test_new_relative_path_fails() {
            let result = SyncPath::new(PathBuf::from("relative/path"));
            assert!(matches!(result, Err(DomainError::InvalidPath(_))));
        }

        #[test]
        fn test_new_normalizes_dots() {
            let path = SyncPath::new(PathBuf::from("/home/user/./source/../mirror")).unwrap();
            assert_eq!(path.to_string(), "/home/user/mirror");
        }

        #[test]
        fn test_relative_to() {
            let root = SyncPath::new(PathBuf::from("/data/source")).unwrap();
            let child = SyncPath::new(PathBuf::from("/data/source/sub/b.txt")).unwrap();
            let relative = child.relative_to(&root).unwrap();
            assert_eq!(relative.as_path(), Path::new("sub/b.txt"));
        }

        #[test]
        fn test_relative_to_root_itself_fails() {
            let root = SyncPath::new(PathBuf::from("/data/source")).unwrap();
            let result = root.relative_to(&root);
            assert!(matches!(result, Err(DomainError::PathNotInRoot(_))));
        }

        #[test]
        fn test_relative_to_sibling_prefix_fails() {
            // "/data/source-old" shares a string prefix but is not below the root
            let root = SyncPath::new(PathBuf::from("/data/source")).unwrap();
            let other = SyncPath::new(PathBuf::from("/data/source-old/a.txt")).unwrap();
            assert!(other.relative_to(&root).is_err());
        }

        #[test]
        fn test_join_roundtrips_relative_to() {
            let source = SyncPath::new(PathBuf::from("/data/source")).unwrap();
            let destination = SyncPath::new(PathBuf::from("/backup/mirror")).unwrap();
            let entry = SyncPath::new(PathBuf::from("/data/source/sub/b.txt")).unwrap();

            let relative = entry.relative_to(&source).unwrap();
            let mirrored = destination.join(&relative);
            assert_eq!(mirrored.to_string(), "/backup/mirror/sub/b.txt");
        }

        #[test]
        fn test_starts_with() {
            let root = SyncPath::new(PathBuf::from("/data/source")).unwrap();
            let inner = SyncPath::new(PathBuf::from("/data/source/mirror")).unwrap();
            assert!(inner.starts_with(&root));
            assert!(root.starts_with(&root));
            assert!(!root.starts_with(&inner));
        }
    }

    mod relative_path_tests {
        use super::*;

        #[test]
        fn test_rejects_empty() {
            assert!(RelativePath::new(PathBuf::new()).is_err());
            assert!(RelativePath::new(PathBuf::from(".")).is_err());
        }

        #[test]
        fn test_rejects_absolute_and_parent() {
            assert!(RelativePath::new(PathBuf::from("/etc/passwd")).is_err());
            assert!(RelativePath::new(PathBuf::from("a/../../b")).is_err());
        }

        #[test]
        fn test_directory_sorts_before_descendants() {
            let dir = RelativePath::try_from("sub").unwrap();
            let child = RelativePath::try_from("sub/b.txt").unwrap();
            let sibling = RelativePath::try_from("sub-x").unwrap();
            let first = RelativePath::try_from("a.txt").unwrap();

            let mut paths = vec![sibling.clone(), child.clone(), dir.clone(), first.clone()];
            paths.sort();
            assert_eq!(paths, vec![first, dir, child, sibling]);
        }

        #[test]
        fn test_ancestors_nearest_first() {
            let path = RelativePath::try_from("a/b/c.txt").unwrap();
            let ancestors: Vec<&Path> = path.ancestors().collect();
            assert_eq!(ancestors, vec![Path::new("a/b"), Path::new("a")]);

            let top = RelativePath::try_from("a.txt").unwrap();
            assert_eq!(top.ancestors().count(), 0);
        }
    }
}
