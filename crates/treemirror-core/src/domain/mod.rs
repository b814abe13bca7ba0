//! Domain entities
//!
//! This module contains the pass-scoped types of a mirror pass:
//! - Validated path newtypes (absolute paths and root-relative keys)
//! - Filesystem entries discovered by a scan
//! - Actions derived from comparing the two trees
//! - Per-item errors and the pass summary
//! - Domain-specific error types

pub mod action;
pub mod entry;
pub mod errors;
pub mod newtypes;
pub mod pass;

// Re-export commonly used types
pub use action::Action;
pub use entry::{EntryKind, FileSystemEntry};
pub use errors::DomainError;
pub use newtypes::{RelativePath, SyncPath};
pub use pass::{ItemError, ItemErrorKind, ItemOperation, PassResult};
