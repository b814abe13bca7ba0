//! Domain error types
//!
//! Errors raised while constructing domain values: invalid paths and
//! paths that do not belong to the root they are resolved against.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Path is not strictly below the root it was resolved against
    #[error("Path not within root: {0}")]
    PathNotInRoot(String),

    /// Invalid root-relative path
    #[error("Invalid relative path: {0}")]
    InvalidRelativePath(String),
}
