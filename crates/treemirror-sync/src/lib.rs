//! treemirror sync - One-way tree reconciliation
//!
//! Provides:
//! - A full-tree diff-and-converge pass (source wins, destination follows)
//! - An exact byte-stream equality test
//! - A fixed-interval, non-reentrant pass scheduler
//!
//! ## Modules
//!
//! - [`comparator`] - Lock-step byte comparison of two readable streams
//! - [`engine`] - The reconcile pass: scan, forward pass, reverse pass
//! - [`filesystem`] - Local filesystem adapter over `tokio::fs`
//! - [`scheduler`] - Periodic pass driver with start/stop lifecycle

pub mod comparator;
pub mod engine;
pub mod filesystem;
pub mod scheduler;

use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a whole pass
///
/// Everything narrower than a root is reported as an
/// [`ItemError`](treemirror_core::domain::ItemError) inside the pass result.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The source root could not be listed at all
    #[error("Source root unavailable: {path}: {cause}")]
    SourceUnavailable { path: PathBuf, cause: String },

    /// The destination root could not be created or listed
    #[error("Destination root unavailable: {path}: {cause}")]
    DestinationUnavailable { path: PathBuf, cause: String },

    /// The scheduler was given settings it cannot run with
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A domain-level error propagated from treemirror-core
    #[error("Domain error: {0}")]
    DomainError(#[from] treemirror_core::domain::errors::DomainError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_display() {
        let err = SyncError::SourceUnavailable {
            path: PathBuf::from("/data/source"),
            cause: "No such file or directory".into(),
        };
        assert_eq!(
            err.to_string(),
            "Source root unavailable: /data/source: No such file or directory"
        );
    }

    #[test]
    fn test_sync_error_from_domain() {
        let domain = treemirror_core::domain::DomainError::InvalidPath("x".into());
        let err: SyncError = domain.into();
        assert!(matches!(err, SyncError::DomainError(_)));
    }
}
