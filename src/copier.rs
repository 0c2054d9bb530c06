//! Cross-backend transfer routing.
//!
//! Evaluated in order for every `copy`/`copy_r`:
//! 1. same scheme on both sides: the backend's own `cp`/`cp_r`
//! 2. local source: the destination backend's `copy_from_local`
//! 3. local destination: the source backend's `copy_to_local`
//! 4. two different remote schemes: the cluster adapter's cross-scheme
//!    copy, the one seam that can address both sides at once
//!
//! No backend pair implements a direct wire; rule 4 is what keeps that
//! affordable. A cross-scheme `mv` is a recursive copy followed by removal
//! of the source, and deletes nothing until the copy has fully landed.

use crate::error::Result;
use crate::registry::FileSystemRegistry;

pub(crate) async fn copy(
    registry: &FileSystemRegistry,
    src: &str,
    dst: &str,
    recursive: bool,
) -> Result<()> {
    let (src_fs, src_path) = registry.resolve(src).await?;
    let (dst_fs, dst_path) = registry.resolve(dst).await?;

    if src_path.scheme() == dst_path.scheme() {
        log::debug!("copy: {src_path} -> {dst_path} stays on one backend");
        return if recursive {
            src_fs.cp_r(&src_path, &dst_path).await
        } else {
            src_fs.cp(&src_path, &dst_path).await
        };
    }
    if src_path.is_local() {
        log::debug!("copy: uploading {src_path} -> {dst_path}");
        return dst_fs.copy_from_local(&src_path, &dst_path, recursive).await;
    }
    if dst_path.is_local() {
        log::debug!("copy: downloading {src_path} -> {dst_path}");
        return src_fs.copy_to_local(&src_path, &dst_path, recursive).await;
    }

    log::debug!("copy: routing {src_path} -> {dst_path} through the cluster adapter");
    let cluster = registry.cluster().await?;
    if recursive {
        cluster
            .cross_copy_r(src_fs.as_ref(), &src_path, dst_fs.as_ref(), &dst_path)
            .await
    } else {
        cluster
            .cross_copy(src_fs.as_ref(), &src_path, dst_fs.as_ref(), &dst_path)
            .await
    }
}

pub(crate) async fn mv(registry: &FileSystemRegistry, src: &str, dst: &str) -> Result<()> {
    let (src_fs, src_path) = registry.resolve(src).await?;
    let (_, dst_path) = registry.resolve(dst).await?;

    if src_path.scheme() == dst_path.scheme() {
        return src_fs.mv(&src_path, &dst_path).await;
    }
    log::debug!("mv: {src_path} -> {dst_path} crosses schemes, copy then delete");
    copy(registry, src, dst, true).await?;
    src_fs.rm_r(&src_path, false).await
}
