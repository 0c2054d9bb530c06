//! Local disk adapter on `tokio::fs`.
//!
//! Unix copy conventions apply: copying or moving onto an existing
//! directory places the source inside it under its own name, and `mv`
//! degrades to copy-then-delete when the rename crosses a mount point.

use std::io;

use async_trait::async_trait;
use tokio::fs;

use crate::adapter::{BackendKind, DirEntry, EntryKind, FileSystem, sort_entries, walk_preorder};
use crate::error::{FsError, Result};
use crate::handle::{FileHandle, OpenMode};
use crate::path::FsPath;

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        LocalFileSystem
    }

    async fn copy_file(&self, src: &FsPath, dst: &FsPath) -> Result<()> {
        fs::copy(src.local_path(), dst.local_path())
            .await
            .map_err(|e| FsError::from_io(e, src))?;
        Ok(())
    }

    async fn copy_tree(&self, src: &FsPath, dst: &FsPath) -> Result<()> {
        fs::create_dir_all(dst.local_path())
            .await
            .map_err(|e| FsError::from_io(e, dst))?;
        let mut pending = vec![(src.clone(), dst.clone())];
        while let Some((from, to)) = pending.pop() {
            for entry in self.ls(&from).await? {
                let name = match entry.path.file_name() {
                    Some(name) => name.to_string(),
                    None => continue,
                };
                let next = to.join(&name);
                if entry.is_dir() {
                    fs::create_dir_all(next.local_path())
                        .await
                        .map_err(|e| FsError::from_io(e, &next))?;
                    pending.push((entry.path, next));
                } else {
                    self.copy_file(&entry.path, &next).await?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn exists(&self, path: &FsPath) -> Result<bool> {
        Ok(metadata_opt(path).await?.is_some())
    }

    async fn is_dir(&self, path: &FsPath) -> Result<bool> {
        Ok(metadata_opt(path).await?.is_some_and(|m| m.is_dir()))
    }

    async fn is_file(&self, path: &FsPath) -> Result<bool> {
        Ok(metadata_opt(path).await?.is_some_and(|m| m.is_file()))
    }

    async fn size(&self, path: &FsPath) -> Result<u64> {
        let meta = metadata_opt(path)
            .await?
            .ok_or_else(|| FsError::not_found(path))?;
        if !meta.is_dir() {
            return Ok(meta.len());
        }
        let mut total = 0;
        for entry in self.ls_r(path).await? {
            if entry.kind == EntryKind::File {
                if let Some(m) = metadata_opt(&entry.path).await? {
                    total += m.len();
                }
            }
        }
        Ok(total)
    }

    async fn ls(&self, path: &FsPath) -> Result<Vec<DirEntry>> {
        let meta = metadata_opt(path)
            .await?
            .ok_or_else(|| FsError::not_found(path))?;
        if !meta.is_dir() {
            return Ok(vec![DirEntry::file(path.clone())]);
        }
        let mut entries = Vec::new();
        let mut reader = fs::read_dir(path.local_path())
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        while let Some(item) = reader
            .next_entry()
            .await
            .map_err(|e| FsError::from_io(e, path))?
        {
            let name = item.file_name();
            let Some(name) = name.to_str() else {
                return Err(FsError::invalid_path(
                    item.path().display(),
                    "file name is not valid utf-8",
                ));
            };
            let kind = match item.file_type().await {
                Ok(t) if t.is_dir() => EntryKind::Dir,
                Ok(_) => EntryKind::File,
                Err(_) => EntryKind::Unknown,
            };
            entries.push(DirEntry {
                path: path.join(name),
                kind,
            });
        }
        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn ls_r(&self, path: &FsPath) -> Result<Vec<DirEntry>> {
        walk_preorder(self, path).await
    }

    async fn mkdir_p(&self, path: &FsPath) -> Result<()> {
        fs::create_dir_all(path.local_path())
            .await
            .map_err(|e| FsError::from_io(e, path))
    }

    async fn rm(&self, path: &FsPath) -> Result<()> {
        let meta = metadata_opt(path)
            .await?
            .ok_or_else(|| FsError::not_found(path))?;
        if meta.is_dir() {
            return Err(FsError::is_a_directory(path));
        }
        fs::remove_file(path.local_path())
            .await
            .map_err(|e| FsError::from_io(e, path))
    }

    async fn rm_r(&self, path: &FsPath, force: bool) -> Result<()> {
        let result = match metadata_opt(path).await? {
            None => Err(FsError::not_found(path)),
            Some(meta) if meta.is_dir() => fs::remove_dir_all(path.local_path())
                .await
                .map_err(|e| FsError::from_io(e, path)),
            Some(_) => fs::remove_file(path.local_path())
                .await
                .map_err(|e| FsError::from_io(e, path)),
        };
        match result {
            Err(err) if force && err.suppressed_by_force() => {
                log::debug!("rm_r: skipping {path}: {err}");
                Ok(())
            }
            other => other,
        }
    }

    async fn mv(&self, src: &FsPath, dst: &FsPath) -> Result<()> {
        let target = resolve_into_dir(src, dst).await?;
        match fs::rename(src.local_path(), target.local_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                log::debug!("mv: {src} -> {target} crosses devices, copying instead");
                let meta = metadata_opt(src)
                    .await?
                    .ok_or_else(|| FsError::not_found(src))?;
                if meta.is_dir() {
                    self.copy_tree(src, &target).await?;
                } else {
                    self.copy_file(src, &target).await?;
                }
                self.rm_r(src, false).await
            }
            Err(e) => Err(FsError::from_io(e, src)),
        }
    }

    async fn cp(&self, src: &FsPath, dst: &FsPath) -> Result<()> {
        let meta = metadata_opt(src)
            .await?
            .ok_or_else(|| FsError::not_found(src))?;
        if meta.is_dir() {
            return Err(FsError::is_a_directory(src));
        }
        let target = resolve_into_dir(src, dst).await?;
        self.copy_file(src, &target).await
    }

    async fn cp_r(&self, src: &FsPath, dst: &FsPath) -> Result<()> {
        let meta = metadata_opt(src)
            .await?
            .ok_or_else(|| FsError::not_found(src))?;
        let target = resolve_into_dir(src, dst).await?;
        if meta.is_dir() {
            self.copy_tree(src, &target).await
        } else {
            self.copy_file(src, &target).await
        }
    }

    async fn open(&self, path: &FsPath, mode: OpenMode) -> Result<FileHandle> {
        match mode {
            OpenMode::Read => {
                if metadata_opt(path).await?.is_some_and(|m| m.is_dir()) {
                    return Err(FsError::is_a_directory(path));
                }
                let file = fs::File::open(path.local_path())
                    .await
                    .map_err(|e| FsError::from_io(e, path))?;
                Ok(FileHandle::disk_read(path.clone(), file))
            }
            // Truncates an existing file. The parent directory has to exist
            // already, mirroring plain open(2).
            OpenMode::Write => {
                let file = fs::File::create(path.local_path())
                    .await
                    .map_err(|e| FsError::from_io(e, path))?;
                Ok(FileHandle::disk_write(path.clone(), file))
            }
        }
    }

    async fn copy_from_local(&self, src: &FsPath, dst: &FsPath, recursive: bool) -> Result<()> {
        if recursive {
            self.cp_r(src, dst).await
        } else {
            self.cp(src, dst).await
        }
    }

    async fn copy_to_local(&self, src: &FsPath, dst: &FsPath, recursive: bool) -> Result<()> {
        if recursive {
            self.cp_r(src, dst).await
        } else {
            self.cp(src, dst).await
        }
    }
}

async fn metadata_opt(path: &FsPath) -> Result<Option<std::fs::Metadata>> {
    match fs::metadata(path.local_path()).await {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FsError::from_io(e, path)),
    }
}

/// Unix target resolution: when `dst` is an existing directory the copy or
/// move lands inside it under the source's own name.
pub(crate) async fn resolve_into_dir(src: &FsPath, dst: &FsPath) -> Result<FsPath> {
    if metadata_opt(dst).await?.is_some_and(|m| m.is_dir()) {
        if let Some(name) = src.file_name() {
            return Ok(dst.join(name));
        }
    }
    Ok(dst.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path as StdPath;

    fn p(path: &StdPath) -> FsPath {
        FsPath::parse(path.to_str().unwrap()).unwrap()
    }

    async fn seed(dir: &StdPath) {
        fs::create_dir_all(dir.join("sub")).await.unwrap();
        fs::write(dir.join("a.txt"), b"aaa").await.unwrap();
        fs::write(dir.join("b.txt"), b"bb").await.unwrap();
        fs::write(dir.join("sub/c.txt"), b"c").await.unwrap();
    }

    #[tokio::test]
    async fn ls_is_sorted_and_typed() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path()).await;
        let fs = LocalFileSystem::new();

        let entries = fs.ls(&p(tmp.path())).await.unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|e| e.path.file_name().unwrap().to_string())
            .collect();
        assert_eq!(names, ["a.txt", "b.txt", "sub"]);
        assert!(!entries[0].is_dir());
        assert!(entries[2].is_dir());
    }

    #[tokio::test]
    async fn ls_of_file_is_the_file_and_missing_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path()).await;
        let fs = LocalFileSystem::new();

        let single = fs.ls(&p(&tmp.path().join("a.txt"))).await.unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].path, p(&tmp.path().join("a.txt")));

        let missing = fs.ls(&p(&tmp.path().join("nope"))).await;
        assert!(matches!(missing, Err(FsError::NotFound { .. })));
    }

    #[tokio::test]
    async fn ls_r_is_preorder() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path()).await;
        let fs = LocalFileSystem::new();

        let entries = fs.ls_r(&p(tmp.path())).await.unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|e| e.path.file_name().unwrap().to_string())
            .collect();
        assert_eq!(names, ["a.txt", "b.txt", "sub", "c.txt"]);
    }

    #[tokio::test]
    async fn size_of_directory_sums_recursively() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path()).await;
        let fs = LocalFileSystem::new();

        assert_eq!(fs.size(&p(&tmp.path().join("a.txt"))).await.unwrap(), 3);
        assert_eq!(fs.size(&p(tmp.path())).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn rm_refuses_directories() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path()).await;
        let fs = LocalFileSystem::new();

        let err = fs.rm(&p(&tmp.path().join("sub"))).await.unwrap_err();
        assert!(matches!(err, FsError::IsADirectory { .. }));

        fs.rm(&p(&tmp.path().join("a.txt"))).await.unwrap();
        assert!(!fs.exists(&p(&tmp.path().join("a.txt"))).await.unwrap());

        let err = fs.rm(&p(&tmp.path().join("a.txt"))).await.unwrap_err();
        assert!(matches!(err, FsError::NotFound { .. }));
    }

    #[tokio::test]
    async fn rm_r_force_swallows_missing() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path()).await;
        let fs = LocalFileSystem::new();

        fs.rm_r(&p(&tmp.path().join("sub")), false).await.unwrap();
        assert!(!fs.exists(&p(&tmp.path().join("sub"))).await.unwrap());

        let missing = p(&tmp.path().join("sub"));
        assert!(matches!(
            fs.rm_r(&missing, false).await,
            Err(FsError::NotFound { .. })
        ));
        fs.rm_r(&missing, true).await.unwrap();
    }

    #[tokio::test]
    async fn cp_into_existing_directory_lands_inside() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path()).await;
        let fs = LocalFileSystem::new();

        fs.cp(&p(&tmp.path().join("a.txt")), &p(&tmp.path().join("sub")))
            .await
            .unwrap();
        let copied = fs::read(tmp.path().join("sub/a.txt")).await.unwrap();
        assert_eq!(copied, b"aaa");

        let err = fs
            .cp(&p(&tmp.path().join("sub")), &p(&tmp.path().join("other")))
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::IsADirectory { .. }));
    }

    #[tokio::test]
    async fn cp_r_copies_the_tree() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path()).await;
        let fs = LocalFileSystem::new();

        let dst = tmp.path().join("copy");
        fs.cp_r(&p(tmp.path()), &p(&dst)).await.unwrap();
        assert_eq!(fs::read(dst.join("a.txt")).await.unwrap(), b"aaa");
        assert_eq!(fs::read(dst.join("sub/c.txt")).await.unwrap(), b"c");
    }

    #[tokio::test]
    async fn mv_renames_and_moves_into_directories() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path()).await;
        let fs = LocalFileSystem::new();

        fs.mv(
            &p(&tmp.path().join("a.txt")),
            &p(&tmp.path().join("renamed.txt")),
        )
        .await
        .unwrap();
        assert!(fs.exists(&p(&tmp.path().join("renamed.txt"))).await.unwrap());

        fs.mv(
            &p(&tmp.path().join("renamed.txt")),
            &p(&tmp.path().join("sub")),
        )
        .await
        .unwrap();
        assert_eq!(
            fs::read(tmp.path().join("sub/renamed.txt")).await.unwrap(),
            b"aaa"
        );
    }

    #[tokio::test]
    async fn open_read_refuses_directories_and_write_truncates() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path()).await;
        let fs = LocalFileSystem::new();

        let err = fs
            .open(&p(&tmp.path().join("sub")), OpenMode::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::IsADirectory { .. }));

        let path = p(&tmp.path().join("b.txt"));
        let mut handle = fs.open(&path, OpenMode::Write).await.unwrap();
        handle.write(b"replaced").await.unwrap();
        handle.close().await.unwrap();

        let mut handle = fs.open(&path, OpenMode::Read).await.unwrap();
        assert_eq!(handle.read_to_string().await.unwrap(), "replaced");
        handle.close().await.unwrap();

        // Writing under a missing parent is refused rather than created.
        let orphan = p(&tmp.path().join("no-such-dir/x.txt"));
        assert!(matches!(
            fs.open(&orphan, OpenMode::Write).await,
            Err(FsError::NotFound { .. })
        ));
    }
}
