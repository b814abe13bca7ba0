//! treemirror core - Domain types and ports for one-way tree mirroring
//!
//! This crate contains:
//! - **Domain types** - `SyncPath`, `RelativePath`, `FileSystemEntry`, `Action`, `PassResult`
//! - **Configuration** - `Config`, validation and a builder
//! - **Port definitions** - `ILocalFileSystem`, the filesystem boundary used by the comparator
//!
//! # Architecture
//!
//! The domain module is pure data with no I/O. The port trait is implemented
//! by the adapter in `treemirror-sync`, which keeps the reconcile pass testable
//! against fault-injecting filesystems.

pub mod config;
pub mod domain;
pub mod ports;
