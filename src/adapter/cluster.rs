//! Cluster filesystem adapter over the WebHDFS REST protocol.
//!
//! Paths may name a different namenode in their authority; each authority
//! gets its own lazily built client. File content moves whole-file: reads
//! fetch the complete object, writes create the remote file empty on open
//! and push appends, so partial content is visible while a writer is
//! active.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use crate::adapter::local::{LocalFileSystem, resolve_into_dir};
use crate::adapter::{
    BackendKind, DirEntry, EntryKind, FileSystem, sort_entries, walk_preorder,
};
use crate::client::webhdfs::{FileStatus, WebHdfsClient, WebHdfsError};
use crate::config::ClusterConfig;
use crate::error::{FsError, Result};
use crate::handle::{FileHandle, OpenMode};
use crate::path::FsPath;

pub struct ClusterFileSystem {
    config: ClusterConfig,
    clients: Mutex<HashMap<String, Arc<WebHdfsClient>>>,
}

impl ClusterFileSystem {
    pub fn new(config: ClusterConfig) -> Self {
        ClusterFileSystem {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Client for the path's namenode. An empty authority means the
    /// configured endpoint; any other authority gets its own client,
    /// reusing the configured user and timeout.
    async fn client_for(&self, path: &FsPath) -> Result<Arc<WebHdfsClient>> {
        let authority = path.authority().to_string();
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&authority) {
            return Ok(client.clone());
        }
        let config = if authority.is_empty() {
            self.config.clone()
        } else {
            ClusterConfig {
                endpoint: format!("http://{authority}"),
                user: self.config.user.clone(),
                timeout_secs: self.config.timeout_secs,
            }
        };
        let client = Arc::new(WebHdfsClient::new(&config).map_err(|e| translate(e, path))?);
        log::debug!(
            "cluster: new client for {}",
            if authority.is_empty() {
                &self.config.endpoint
            } else {
                &authority
            }
        );
        clients.insert(authority, client.clone());
        Ok(client)
    }

    async fn status_of(&self, path: &FsPath) -> Result<Option<FileStatus>> {
        let client = self.client_for(path).await?;
        client
            .status(path.path())
            .await
            .map_err(|e| translate(e, path))
    }

    async fn read_file(&self, path: &FsPath) -> Result<Bytes> {
        let client = self.client_for(path).await?;
        client
            .read(path.path())
            .await
            .map_err(|e| translate(e, path))?
            .ok_or_else(|| FsError::not_found(path))
    }

    async fn write_file(&self, path: &FsPath, data: Bytes) -> Result<()> {
        let client = self.client_for(path).await?;
        client
            .create(path.path(), data, true)
            .await
            .map_err(|e| translate(e, path))
    }

    /// Copy one file between two remote backends. The cluster adapter owns
    /// the cross-scheme seam: no backend pair needs a direct wire, the
    /// content stages through a local spool that is cleaned up afterwards.
    pub async fn cross_copy(
        &self,
        src_fs: &dyn FileSystem,
        src: &FsPath,
        dst_fs: &dyn FileSystem,
        dst: &FsPath,
    ) -> Result<()> {
        self.cross_transfer(src_fs, src, dst_fs, dst, false).await
    }

    /// Recursive form of [`ClusterFileSystem::cross_copy`].
    pub async fn cross_copy_r(
        &self,
        src_fs: &dyn FileSystem,
        src: &FsPath,
        dst_fs: &dyn FileSystem,
        dst: &FsPath,
    ) -> Result<()> {
        self.cross_transfer(src_fs, src, dst_fs, dst, true).await
    }

    async fn cross_transfer(
        &self,
        src_fs: &dyn FileSystem,
        src: &FsPath,
        dst_fs: &dyn FileSystem,
        dst: &FsPath,
        recursive: bool,
    ) -> Result<()> {
        let spool =
            tempfile::tempdir().map_err(|e| FsError::backend(format!("spool dir: {e}")))?;
        let staged_disk = spool.path().join(src.file_name().unwrap_or("staged"));
        let staged = FsPath::parse(staged_disk.to_str().ok_or_else(|| {
            FsError::invalid_path(staged_disk.display(), "spool path is not valid utf-8")
        })?)?;
        log::debug!("cross_copy: staging {src} -> {dst} via {staged}");
        src_fs.copy_to_local(src, &staged, recursive).await?;
        dst_fs.copy_from_local(&staged, dst, recursive).await
    }

    /// Concatenate every file directly under `src`, in listing order, into
    /// a single file at `dst`. Sub-directories are skipped.
    pub async fn merge(&self, src: &FsPath, dst: &FsPath) -> Result<()> {
        let entries = self.ls(src).await?;
        let dst_client = self.client_for(dst).await?;
        dst_client
            .create(dst.path(), Bytes::new(), true)
            .await
            .map_err(|e| translate(e, dst))?;
        for entry in entries {
            if entry.is_dir() {
                continue;
            }
            let data = self.read_file(&entry.path).await?;
            if !data.is_empty() {
                dst_client
                    .append(dst.path(), data)
                    .await
                    .map_err(|e| translate(e, dst))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FileSystem for ClusterFileSystem {
    fn kind(&self) -> BackendKind {
        BackendKind::Cluster
    }

    async fn exists(&self, path: &FsPath) -> Result<bool> {
        Ok(self.status_of(path).await?.is_some())
    }

    async fn is_dir(&self, path: &FsPath) -> Result<bool> {
        Ok(self.status_of(path).await?.is_some_and(|s| s.is_dir()))
    }

    async fn is_file(&self, path: &FsPath) -> Result<bool> {
        Ok(self.status_of(path).await?.is_some_and(|s| !s.is_dir()))
    }

    async fn size(&self, path: &FsPath) -> Result<u64> {
        let status = self
            .status_of(path)
            .await?
            .ok_or_else(|| FsError::not_found(path))?;
        if !status.is_dir() {
            return Ok(status.length);
        }
        let client = self.client_for(path).await?;
        let summary = client
            .content_summary(path.path())
            .await
            .map_err(|e| translate(e, path))?;
        Ok(summary.length)
    }

    async fn ls(&self, path: &FsPath) -> Result<Vec<DirEntry>> {
        let status = self
            .status_of(path)
            .await?
            .ok_or_else(|| FsError::not_found(path))?;
        if !status.is_dir() {
            return Ok(vec![DirEntry::file(path.clone())]);
        }
        let client = self.client_for(path).await?;
        let mut entries = Vec::new();
        for item in client
            .list(path.path())
            .await
            .map_err(|e| translate(e, path))?
        {
            let child = path.join(&item.path_suffix);
            entries.push(if item.is_dir() {
                DirEntry::dir(child)
            } else {
                DirEntry::file(child)
            });
        }
        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn ls_r(&self, path: &FsPath) -> Result<Vec<DirEntry>> {
        walk_preorder(self, path).await
    }

    async fn mkdir_p(&self, path: &FsPath) -> Result<()> {
        let client = self.client_for(path).await?;
        let made = client
            .mkdirs(path.path())
            .await
            .map_err(|e| translate(e, path))?;
        if made {
            Ok(())
        } else {
            Err(FsError::backend(format!("mkdirs {path} refused by namenode")))
        }
    }

    async fn rm(&self, path: &FsPath) -> Result<()> {
        match self.status_of(path).await? {
            None => Err(FsError::not_found(path)),
            Some(status) if status.is_dir() => Err(FsError::is_a_directory(path)),
            Some(_) => {
                let client = self.client_for(path).await?;
                let deleted = client
                    .delete(path.path(), false)
                    .await
                    .map_err(|e| translate(e, path))?;
                if deleted {
                    Ok(())
                } else {
                    Err(FsError::not_found(path))
                }
            }
        }
    }

    async fn rm_r(&self, path: &FsPath, force: bool) -> Result<()> {
        let client = self.client_for(path).await?;
        let deleted = client
            .delete(path.path(), true)
            .await
            .map_err(|e| translate(e, path));
        match deleted {
            Ok(true) => Ok(()),
            Ok(false) if force => Ok(()),
            Ok(false) => Err(FsError::not_found(path)),
            Err(err) if force && err.suppressed_by_force() => {
                log::debug!("rm_r: skipping {path}: {err}");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn mv(&self, src: &FsPath, dst: &FsPath) -> Result<()> {
        if src.authority() != dst.authority() {
            // Rename cannot span namenodes.
            self.cp_r(src, dst).await?;
            return self.rm_r(src, false).await;
        }
        let client = self.client_for(src).await?;
        let renamed = client
            .rename(src.path(), dst.path())
            .await
            .map_err(|e| translate(e, src))?;
        if renamed {
            Ok(())
        } else {
            Err(FsError::backend(format!(
                "rename {src} -> {dst} refused by namenode"
            )))
        }
    }

    async fn cp(&self, src: &FsPath, dst: &FsPath) -> Result<()> {
        let status = self
            .status_of(src)
            .await?
            .ok_or_else(|| FsError::not_found(src))?;
        if status.is_dir() {
            return Err(FsError::is_a_directory(src));
        }
        let data = self.read_file(src).await?;
        self.write_file(dst, data).await
    }

    async fn cp_r(&self, src: &FsPath, dst: &FsPath) -> Result<()> {
        let status = self
            .status_of(src)
            .await?
            .ok_or_else(|| FsError::not_found(src))?;
        if !status.is_dir() {
            let data = self.read_file(src).await?;
            return self.write_file(dst, data).await;
        }

        self.mkdir_p(dst).await?;
        for entry in self.ls_r(src).await? {
            let rel = entry
                .path
                .path()
                .strip_prefix(src.path())
                .unwrap_or(entry.path.path())
                .trim_start_matches('/');
            let target = dst.join(rel);
            if entry.is_dir() {
                self.mkdir_p(&target).await?;
            } else {
                let data = self.read_file(&entry.path).await?;
                self.write_file(&target, data).await?;
            }
        }
        Ok(())
    }

    async fn open(&self, path: &FsPath, mode: OpenMode) -> Result<FileHandle> {
        let client = self.client_for(path).await?;
        match mode {
            OpenMode::Read => {
                let status = self
                    .status_of(path)
                    .await?
                    .ok_or_else(|| FsError::not_found(path))?;
                if status.is_dir() {
                    return Err(FsError::is_a_directory(path));
                }
                let data = self.read_file(path).await?;
                Ok(FileHandle::buffered_read(path.clone(), data))
            }
            OpenMode::Write => {
                client
                    .create(path.path(), Bytes::new(), true)
                    .await
                    .map_err(|e| translate(e, path))?;
                Ok(FileHandle::cluster_write(
                    path.clone(),
                    client,
                    path.path().to_string(),
                ))
            }
        }
    }

    async fn copy_from_local(&self, src: &FsPath, dst: &FsPath, recursive: bool) -> Result<()> {
        let local = LocalFileSystem::new();
        if !local.is_dir(src).await? {
            if !local.is_file(src).await? {
                return Err(FsError::not_found(src));
            }
            let data = tokio::fs::read(src.local_path())
                .await
                .map_err(|e| FsError::from_io(e, src))?;
            return self.write_file(dst, Bytes::from(data)).await;
        }
        if !recursive {
            return Err(FsError::is_a_directory(src));
        }

        self.mkdir_p(dst).await?;
        for entry in local.ls_r(src).await? {
            let rel = entry
                .path
                .path()
                .strip_prefix(src.path())
                .unwrap_or(entry.path.path())
                .trim_start_matches('/');
            let target = dst.join(rel);
            if entry.is_dir() {
                self.mkdir_p(&target).await?;
            } else if entry.kind == EntryKind::File {
                let data = tokio::fs::read(entry.path.local_path())
                    .await
                    .map_err(|e| FsError::from_io(e, &entry.path))?;
                self.write_file(&target, Bytes::from(data)).await?;
            }
        }
        Ok(())
    }

    async fn copy_to_local(&self, src: &FsPath, dst: &FsPath, recursive: bool) -> Result<()> {
        let status = self
            .status_of(src)
            .await?
            .ok_or_else(|| FsError::not_found(src))?;
        if !status.is_dir() {
            let data = self.read_file(src).await?;
            let target = resolve_into_dir(src, dst).await?;
            return tokio::fs::write(target.local_path(), &data)
                .await
                .map_err(|e| FsError::from_io(e, &target));
        }
        if !recursive {
            return Err(FsError::is_a_directory(src));
        }

        tokio::fs::create_dir_all(dst.local_path())
            .await
            .map_err(|e| FsError::from_io(e, dst))?;
        for entry in self.ls_r(src).await? {
            let rel = entry
                .path
                .path()
                .strip_prefix(src.path())
                .unwrap_or(entry.path.path())
                .trim_start_matches('/');
            let target = dst.join(rel);
            if entry.is_dir() {
                tokio::fs::create_dir_all(target.local_path())
                    .await
                    .map_err(|e| FsError::from_io(e, &target))?;
            } else {
                let data = self.read_file(&entry.path).await?;
                tokio::fs::write(target.local_path(), &data)
                    .await
                    .map_err(|e| FsError::from_io(e, &target))?;
            }
        }
        Ok(())
    }
}

/// Attach the provoking path while mapping a transport error onto the crate
/// taxonomy. Unrecognized server exceptions keep their original message.
pub(crate) fn translate(err: WebHdfsError, path: impl Display) -> FsError {
    match &err {
        WebHdfsError::Remote { exception, message } => match exception.as_str() {
            "FileNotFoundException" => FsError::not_found(path),
            "PathIsNotEmptyDirectoryException" => FsError::is_a_directory(path),
            "FileAlreadyExistsException" => FsError::already_exists(path),
            _ => FsError::backend(format!("{exception}: {message}")),
        },
        _ => FsError::backend(err.to_string()),
    }
}
