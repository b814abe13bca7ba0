//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the reconcile pass depends on; their
//! implementations live in adapter crates.
//!
//! - [`ILocalFileSystem`] - Directory listing, byte streams and tree mutations

pub mod local_filesystem;

pub use local_filesystem::{
    ByteStream, DirEntry, DirListing, FileSystemState, ILocalFileSystem, ListingFailure,
};
