//! Flat object-store adapter.
//!
//! The keyspace has no real directories: a "directory" is an existing
//! bucket root or a prefix with at least one key beneath it, inferred
//! through delimiter listings. When a key exists both as an object and as
//! a prefix, the object wins and the path counts as a file.
//!
//! Recursive copy and move list every key under the source, compute the
//! longest common `bucket/key` component prefix across the set, and rewrite
//! each key by replacing that prefix with the destination. A move deletes
//! no source key until every copy has landed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::adapter::local::{LocalFileSystem, resolve_into_dir};
use crate::adapter::{
    BackendKind, DirEntry, EntryKind, FileSystem, sort_entries, walk_preorder,
};
use crate::client::{ObjectBackend, ObjectClientFactory};
use crate::error::{FsError, Result};
use crate::handle::{FileHandle, OpenMode};
use crate::path::FsPath;

pub struct ObjectStoreFileSystem {
    factory: Arc<dyn ObjectClientFactory>,
    backends: Mutex<HashMap<String, Arc<dyn ObjectBackend>>>,
}

impl ObjectStoreFileSystem {
    pub fn new(factory: Arc<dyn ObjectClientFactory>) -> Self {
        ObjectStoreFileSystem {
            factory,
            backends: Mutex::new(HashMap::new()),
        }
    }

    /// Bucket-bound client, created on first use and cached.
    async fn backend(&self, bucket: &str) -> Result<Arc<dyn ObjectBackend>> {
        let mut cache = self.backends.lock().await;
        if let Some(backend) = cache.get(bucket) {
            return Ok(backend.clone());
        }
        let backend = self.factory.connect(bucket).await?;
        cache.insert(bucket.to_string(), backend.clone());
        Ok(backend)
    }

    /// Empty the bucket, then delete it. Outside the uniform contract
    /// because buckets are first-class only on this backend.
    pub async fn rm_bucket(&self, path: &FsPath) -> Result<()> {
        let backend = self.backend(path.authority()).await?;
        if !backend.bucket_exists().await? {
            return Err(FsError::not_found(path));
        }
        for object in backend.list("", None).await?.objects {
            backend.delete_object(&object.key).await?;
        }
        backend.delete_bucket().await
    }

    /// Server-side copy of one object. Returns the source key so `mv` can
    /// delete it afterwards.
    async fn copy_one(&self, src: &FsPath, dst: &FsPath) -> Result<String> {
        let dst_backend = self.backend(dst.authority()).await?;
        dst_backend.create_bucket().await?;
        let dst_key = match dst.path() {
            "" => src
                .file_name()
                .ok_or_else(|| FsError::invalid_path(src, "source has no file name"))?
                .to_string(),
            key => key.to_string(),
        };
        dst_backend
            .copy_object(src.authority(), src.path(), &dst_key)
            .await?;
        Ok(src.path().to_string())
    }

    /// Server-side copy of everything under `src`, rewriting the common
    /// prefix to `dst`. Returns the source keys copied.
    async fn copy_prefix(&self, src: &FsPath, dst: &FsPath) -> Result<Vec<String>> {
        let src_backend = self.backend(src.authority()).await?;
        let dst_backend = self.backend(dst.authority()).await?;
        dst_backend.create_bucket().await?;

        let prefix = match src.path() {
            "" => String::new(),
            key => format!("{key}/"),
        };
        let objects = src_backend.list(&prefix, None).await?.objects;
        let full: Vec<String> = objects
            .iter()
            .map(|o| format!("{}/{}", src.authority(), o.key))
            .collect();
        let common = common_prefix(&full);

        let mut copied = Vec::with_capacity(objects.len());
        for (object, full_path) in objects.iter().zip(&full) {
            let suffix = full_path[common.len()..].trim_start_matches('/');
            let dst_key = match dst.path() {
                "" => suffix.to_string(),
                key => format!("{key}/{suffix}"),
            };
            dst_backend
                .copy_object(src.authority(), &object.key, &dst_key)
                .await?;
            copied.push(object.key.clone());
        }
        Ok(copied)
    }
}

#[async_trait]
impl FileSystem for ObjectStoreFileSystem {
    fn kind(&self) -> BackendKind {
        BackendKind::ObjectStore
    }

    async fn exists(&self, path: &FsPath) -> Result<bool> {
        let backend = self.backend(path.authority()).await?;
        let key = path.path();
        if key.is_empty() {
            return backend.bucket_exists().await;
        }
        if backend.head_object(key).await?.is_some() {
            return Ok(true);
        }
        if !backend.bucket_exists().await? {
            return Ok(false);
        }
        has_children(backend.as_ref(), key).await
    }

    async fn is_dir(&self, path: &FsPath) -> Result<bool> {
        let backend = self.backend(path.authority()).await?;
        let key = path.path();
        if key.is_empty() {
            return backend.bucket_exists().await;
        }
        if backend.head_object(key).await?.is_some() {
            return Ok(false);
        }
        if !backend.bucket_exists().await? {
            return Ok(false);
        }
        has_children(backend.as_ref(), key).await
    }

    async fn is_file(&self, path: &FsPath) -> Result<bool> {
        let key = path.path();
        if key.is_empty() {
            return Ok(false);
        }
        let backend = self.backend(path.authority()).await?;
        Ok(backend.head_object(key).await?.is_some())
    }

    async fn size(&self, path: &FsPath) -> Result<u64> {
        let backend = self.backend(path.authority()).await?;
        let key = path.path();
        if !key.is_empty() {
            if let Some(len) = backend.head_object(key).await? {
                return Ok(len);
            }
        }
        if !backend.bucket_exists().await? {
            return Err(FsError::not_found(path));
        }
        let prefix = match key {
            "" => String::new(),
            key => format!("{key}/"),
        };
        let objects = backend.list(&prefix, None).await?.objects;
        if objects.is_empty() && !key.is_empty() {
            return Err(FsError::not_found(path));
        }
        Ok(objects.iter().map(|o| o.size).sum())
    }

    async fn ls(&self, path: &FsPath) -> Result<Vec<DirEntry>> {
        let backend = self.backend(path.authority()).await?;
        let key = path.path();
        if !key.is_empty() && backend.head_object(key).await?.is_some() {
            return Ok(vec![DirEntry::file(path.clone())]);
        }
        if !backend.bucket_exists().await? {
            return Err(FsError::not_found(path));
        }

        let prefix = match key {
            "" => String::new(),
            key => format!("{key}/"),
        };
        let listing = backend.list(&prefix, Some('/')).await?;
        if listing.is_empty() && !key.is_empty() {
            return Err(FsError::not_found(path));
        }

        let mut entries = Vec::new();
        for sub_prefix in listing.prefixes {
            entries.push(DirEntry::dir(path.with_path(sub_prefix)));
        }
        for object in listing.objects {
            // A zero-byte marker at the prefix itself is not a child.
            if object.key == prefix {
                continue;
            }
            entries.push(DirEntry::file(path.with_path(object.key)));
        }
        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn ls_r(&self, path: &FsPath) -> Result<Vec<DirEntry>> {
        walk_preorder(self, path).await
    }

    /// Keys need no parent directories, so this only ensures the bucket.
    async fn mkdir_p(&self, path: &FsPath) -> Result<()> {
        let backend = self.backend(path.authority()).await?;
        backend.create_bucket().await
    }

    async fn rm(&self, path: &FsPath) -> Result<()> {
        let backend = self.backend(path.authority()).await?;
        let key = path.path();
        if key.is_empty() {
            return Err(FsError::is_a_directory(path));
        }
        if backend.head_object(key).await?.is_none() {
            if backend.bucket_exists().await? && has_children(backend.as_ref(), key).await? {
                return Err(FsError::is_a_directory(path));
            }
            return Err(FsError::not_found(path));
        }
        backend.delete_object(key).await
    }

    async fn rm_r(&self, path: &FsPath, force: bool) -> Result<()> {
        let backend = self.backend(path.authority()).await?;
        if !backend.bucket_exists().await? {
            return if force {
                Ok(())
            } else {
                Err(FsError::not_found(path))
            };
        }

        let key = path.path();
        let mut doomed: Vec<String> = Vec::new();
        if key.is_empty() {
            // Bucket root: the keys go, the bucket stays.
            doomed.extend(
                backend
                    .list("", None)
                    .await?
                    .objects
                    .into_iter()
                    .map(|o| o.key),
            );
        } else {
            if backend.head_object(key).await?.is_some() {
                doomed.push(key.to_string());
            }
            doomed.extend(
                backend
                    .list(&format!("{key}/"), None)
                    .await?
                    .objects
                    .into_iter()
                    .map(|o| o.key),
            );
            if doomed.is_empty() {
                return if force {
                    Ok(())
                } else {
                    Err(FsError::not_found(path))
                };
            }
        }

        for key in &doomed {
            match backend.delete_object(key).await {
                Ok(()) => {}
                Err(err) if force && err.suppressed_by_force() => {
                    log::debug!("rm_r: skipping {key}: {err}");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    async fn mv(&self, src: &FsPath, dst: &FsPath) -> Result<()> {
        if src == dst {
            return Ok(());
        }
        let moved = if self.is_file(src).await? {
            vec![self.copy_one(src, dst).await?]
        } else if self.is_dir(src).await? {
            self.copy_prefix(src, dst).await?
        } else {
            return Err(FsError::not_found(src));
        };

        let src_backend = self.backend(src.authority()).await?;
        for key in &moved {
            src_backend.delete_object(key).await?;
        }
        Ok(())
    }

    async fn cp(&self, src: &FsPath, dst: &FsPath) -> Result<()> {
        if !self.is_file(src).await? {
            return Err(if self.is_dir(src).await? {
                FsError::is_a_directory(src)
            } else {
                FsError::not_found(src)
            });
        }
        self.copy_one(src, dst).await?;
        Ok(())
    }

    async fn cp_r(&self, src: &FsPath, dst: &FsPath) -> Result<()> {
        if self.is_file(src).await? {
            self.copy_one(src, dst).await?;
            return Ok(());
        }
        if !self.is_dir(src).await? {
            return Err(FsError::not_found(src));
        }
        self.copy_prefix(src, dst).await?;
        Ok(())
    }

    async fn open(&self, path: &FsPath, mode: OpenMode) -> Result<FileHandle> {
        let backend = self.backend(path.authority()).await?;
        let key = path.path();
        match mode {
            OpenMode::Read => {
                if key.is_empty() {
                    return Err(FsError::is_a_directory(path));
                }
                match backend.get_object(key).await? {
                    Some(data) => Ok(FileHandle::buffered_read(path.clone(), data)),
                    None => {
                        if backend.bucket_exists().await?
                            && has_children(backend.as_ref(), key).await?
                        {
                            Err(FsError::is_a_directory(path))
                        } else {
                            Err(FsError::not_found(path))
                        }
                    }
                }
            }
            OpenMode::Write => {
                if key.is_empty() {
                    return Err(FsError::invalid_path(path, "cannot write to a bucket root"));
                }
                FileHandle::object_write(path.clone(), backend, key.to_string())
            }
        }
    }

    async fn copy_from_local(&self, src: &FsPath, dst: &FsPath, recursive: bool) -> Result<()> {
        let local = LocalFileSystem::new();
        let backend = self.backend(dst.authority()).await?;
        backend.create_bucket().await?;

        if !local.is_dir(src).await? {
            if !local.is_file(src).await? {
                return Err(FsError::not_found(src));
            }
            let dst_key = match dst.path() {
                "" => src
                    .file_name()
                    .ok_or_else(|| FsError::invalid_path(src, "source has no file name"))?
                    .to_string(),
                key => key.to_string(),
            };
            return backend.put_object_from_file(&dst_key, src.local_path()).await;
        }
        if !recursive {
            return Err(FsError::is_a_directory(src));
        }

        for entry in local.ls_r(src).await? {
            if entry.kind != EntryKind::File {
                continue;
            }
            let rel = entry
                .path
                .path()
                .strip_prefix(src.path())
                .unwrap_or(entry.path.path())
                .trim_start_matches('/');
            let dst_key = match dst.path() {
                "" => rel.to_string(),
                key => format!("{key}/{rel}"),
            };
            backend
                .put_object_from_file(&dst_key, entry.path.local_path())
                .await?;
        }
        Ok(())
    }

    async fn copy_to_local(&self, src: &FsPath, dst: &FsPath, recursive: bool) -> Result<()> {
        let backend = self.backend(src.authority()).await?;
        let key = src.path();

        if !key.is_empty() && backend.head_object(key).await?.is_some() {
            let target = resolve_into_dir(src, dst).await?;
            return backend.get_object_to_file(key, target.local_path()).await;
        }
        if !recursive {
            let is_container = backend.bucket_exists().await?
                && (key.is_empty() || has_children(backend.as_ref(), key).await?);
            return Err(if is_container {
                FsError::is_a_directory(src)
            } else {
                FsError::not_found(src)
            });
        }
        if !backend.bucket_exists().await? {
            return Err(FsError::not_found(src));
        }

        let prefix = match key {
            "" => String::new(),
            key => format!("{key}/"),
        };
        let objects = backend.list(&prefix, None).await?.objects;
        if objects.is_empty() && !key.is_empty() {
            return Err(FsError::not_found(src));
        }
        tokio::fs::create_dir_all(dst.local_path())
            .await
            .map_err(|e| FsError::from_io(e, dst))?;
        for object in objects {
            let rel = object.key.strip_prefix(prefix.as_str()).unwrap_or(&object.key);
            let target = dst.join(rel);
            if let Some(parent) = target.local_path().parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| FsError::from_io(e, parent.display()))?;
            }
            backend
                .get_object_to_file(&object.key, target.local_path())
                .await?;
        }
        Ok(())
    }
}

async fn has_children(backend: &dyn ObjectBackend, key: &str) -> Result<bool> {
    let listing = backend.list(&format!("{key}/"), Some('/')).await?;
    Ok(!listing.is_empty())
}

/// Longest run of leading path components shared by every `bucket/key`
/// string. When nothing diverges (a single key, typically) the common part
/// is everything up to the final component.
fn common_prefix(paths: &[String]) -> String {
    if paths.is_empty() {
        return String::new();
    }
    let split: Vec<Vec<&str>> = paths.iter().map(|p| p.split('/').collect()).collect();
    let min_len = split.iter().map(|s| s.len()).min().unwrap_or(0);
    let divergence = (0..min_len)
        .find(|&i| split.iter().any(|s| s[i] != split[0][i]))
        .unwrap_or_else(|| min_len.saturating_sub(1));
    split[0][..divergence].join("/")
}
