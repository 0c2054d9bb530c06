//! The common capability contract every backend adapter implements, plus the
//! listing types shared across backends.

pub mod cluster;
pub mod local;
pub mod object;

use async_trait::async_trait;

use crate::error::Result;
use crate::handle::{FileHandle, OpenMode};
use crate::path::FsPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Cluster,
    ObjectStore,
}

/// Inferred type of a listing entry. Object-store directories are inferred
/// from the listing delimiter, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub path: FsPath,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn file(path: FsPath) -> Self {
        DirEntry {
            path,
            kind: EntryKind::File,
        }
    }

    pub fn dir(path: FsPath) -> Self {
        DirEntry {
            path,
            kind: EntryKind::Dir,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// One configured connection to a storage backend.
///
/// Semantics shared by all implementations:
/// * `ls` of a plain file yields that single entry; `ls` of a missing path is
///   `NotFound`.
/// * `rm` removes exactly one file and refuses containers with `IsADirectory`;
///   `rm_r` removes recursively and, with `force`, treats per-entry `NotFound`
///   and backend failures as skippable.
/// * `cp`/`cp_r` overwrite existing destination files; `mv` renames atomically
///   where the backend can and degrades to copy-then-delete otherwise.
/// * every operation is one call, one result; recursive operations are not
///   atomic and are resumable by re-running them.
#[async_trait]
pub trait FileSystem: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// True iff the path resolves to an existing file, directory or bucket.
    async fn exists(&self, path: &FsPath) -> Result<bool>;

    /// True iff the path is a container: a native directory, or for the
    /// object store a non-object prefix with at least one key beneath it
    /// (or an existing bucket root).
    async fn is_dir(&self, path: &FsPath) -> Result<bool>;

    /// True iff the path resolves to a single addressable file/object.
    async fn is_file(&self, path: &FsPath) -> Result<bool>;

    /// Byte length of a file; for a directory, the recursive sum of the files
    /// beneath it.
    async fn size(&self, path: &FsPath) -> Result<u64>;

    /// Immediate children only, sorted; `NotFound` if the path is missing.
    async fn ls(&self, path: &FsPath) -> Result<Vec<DirEntry>>;

    /// All descendants, flattened preorder depth-first.
    async fn ls_r(&self, path: &FsPath) -> Result<Vec<DirEntry>>;

    /// Create the path and any missing ancestors; idempotent. On the object
    /// store this creates the bucket only, keys need no directories.
    async fn mkdir_p(&self, path: &FsPath) -> Result<()>;

    /// Remove one file.
    async fn rm(&self, path: &FsPath) -> Result<()>;

    /// Remove the path and everything beneath it. Missing paths are an error
    /// unless `force` is set.
    async fn rm_r(&self, path: &FsPath, force: bool) -> Result<()>;

    async fn mv(&self, src: &FsPath, dst: &FsPath) -> Result<()>;

    /// Copy one file; `IsADirectory` if `src` is a container.
    async fn cp(&self, src: &FsPath, dst: &FsPath) -> Result<()>;

    async fn cp_r(&self, src: &FsPath, dst: &FsPath) -> Result<()>;

    /// Open a read or write stream. Prefer [`crate::handle::with_open`] for
    /// scoped acquisition; otherwise the returned handle must be `close`d.
    async fn open(&self, path: &FsPath, mode: OpenMode) -> Result<FileHandle>;

    /// Transfer seam used when the copy source lives on the local disk
    /// (`src` must be a local path).
    async fn copy_from_local(&self, src: &FsPath, dst: &FsPath, recursive: bool) -> Result<()>;

    /// Transfer seam used when the copy destination lives on the local disk
    /// (`dst` must be a local path).
    async fn copy_to_local(&self, src: &FsPath, dst: &FsPath, recursive: bool) -> Result<()>;
}

impl std::fmt::Debug for dyn FileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystem")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

/// Deterministic listing order for every adapter.
pub(crate) fn sort_entries(entries: &mut [DirEntry]) {
    entries.sort_by(|a, b| a.path.path().cmp(b.path.path()));
}

/// Preorder depth-first expansion built from repeated `ls` calls, shared by
/// every adapter's `ls_r`.
pub(crate) async fn walk_preorder(fs: &dyn FileSystem, path: &FsPath) -> Result<Vec<DirEntry>> {
    let mut out = Vec::new();
    let mut pending = fs.ls(path).await?;
    pending.reverse();
    while let Some(entry) = pending.pop() {
        if entry.is_dir() {
            let mut children = fs.ls(&entry.path).await?;
            children.reverse();
            out.push(entry);
            pending.extend(children);
        } else {
            out.push(entry);
        }
    }
    Ok(out)
}
