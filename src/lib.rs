//! Uniform file operations over three storage backends: the local disk,
//! a WebHDFS-speaking cluster filesystem, and flat S3-style object
//! storage.
//!
//! Paths carry their backend in the scheme (`/x` or `file://` local,
//! `hdfs://` cluster, `s3://` object store). [`FileSystemRegistry`] maps a
//! scheme to one lazily built adapter per process; every adapter speaks
//! the same [`FileSystem`] contract, and cross-backend `copy`/`mv` route
//! through the registry.

pub mod adapter;
pub mod client;
pub mod config;
mod copier;
pub mod error;
pub mod handle;
pub mod path;
pub mod registry;

pub use adapter::cluster::ClusterFileSystem;
pub use adapter::local::LocalFileSystem;
pub use adapter::object::ObjectStoreFileSystem;
pub use adapter::{BackendKind, DirEntry, EntryKind, FileSystem};
pub use config::{ClusterConfig, FsConfig, ObjectStoreConfig};
pub use error::{FsError, Result};
pub use handle::{FileHandle, OpenMode, with_open};
pub use path::{FsPath, Scheme};
pub use registry::{FileSystemRegistry, global, install_global};
