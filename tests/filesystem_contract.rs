//! The uniform capability contract, exercised identically against the local
//! and object-store backends, plus the registry's cross-backend routing.

use std::sync::Arc;

use spanfs::client::memory::MemoryObjectStore;
use spanfs::{
    FileSystem, FileSystemRegistry, FsConfig, FsError, FsPath, LocalFileSystem,
    ObjectStoreFileSystem, OpenMode, with_open,
};

fn p(s: &str) -> FsPath {
    FsPath::parse(s).unwrap()
}

async fn write_via_handle(fs: &dyn FileSystem, path: &FsPath, data: &[u8]) {
    let mut handle = fs.open(path, OpenMode::Write).await.unwrap();
    handle.write(data).await.unwrap();
    handle.close().await.unwrap();
}

async fn read_via_handle(fs: &dyn FileSystem, path: &FsPath) -> String {
    with_open(fs, path, OpenMode::Read, async |handle| {
        handle.read_to_string().await
    })
    .await
    .unwrap()
}

/// Every backend must pass this sequence unchanged.
async fn exercises_uniform_contract(fs: &dyn FileSystem, root: &FsPath) {
    let d = root.join("d");
    let f = d.join("f.txt");

    fs.mkdir_p(&d).await.unwrap();
    assert!(!fs.exists(&f).await.unwrap());
    write_via_handle(fs, &f, b"foobarbaz").await;
    assert!(fs.exists(&f).await.unwrap());
    assert_eq!(fs.size(&f).await.unwrap(), 9);
    assert!(fs.is_file(&f).await.unwrap());
    assert!(fs.is_dir(&d).await.unwrap());
    assert!(!fs.is_file(&d).await.unwrap());

    // Two immediate entries, three recursive.
    let shape = root.join("shape");
    let sub = shape.join("b");
    fs.mkdir_p(&sub).await.unwrap();
    write_via_handle(fs, &shape.join("a.txt"), b"a").await;
    write_via_handle(fs, &sub.join("c.txt"), b"c").await;
    assert_eq!(fs.ls(&shape).await.unwrap().len(), 2);
    assert_eq!(fs.ls_r(&shape).await.unwrap().len(), 3);
    assert!(matches!(
        fs.ls(&root.join("no-such")).await,
        Err(FsError::NotFound { .. })
    ));

    // cp leaves the source untouched.
    let copies = root.join("copies");
    fs.mkdir_p(&copies).await.unwrap();
    let copy = copies.join("f2.txt");
    fs.cp(&f, &copy).await.unwrap();
    assert_eq!(read_via_handle(fs, &copy).await, "foobarbaz");
    assert_eq!(read_via_handle(fs, &f).await, "foobarbaz");

    // mv carries the bytes and removes the source.
    let moved = root.join("moved.txt");
    fs.mv(&copy, &moved).await.unwrap();
    assert!(!fs.exists(&copy).await.unwrap());
    assert_eq!(read_via_handle(fs, &moved).await, "foobarbaz");

    // rm removes exactly one file and refuses containers.
    fs.rm(&moved).await.unwrap();
    assert!(!fs.exists(&moved).await.unwrap());
    assert!(matches!(
        fs.rm(&d).await,
        Err(FsError::IsADirectory { .. })
    ));

    // rm_r drops the tree; repeated removal needs force.
    fs.rm_r(&d, false).await.unwrap();
    assert!(!fs.exists(&d).await.unwrap());
    assert!(!fs.exists(&f).await.unwrap());
    assert!(matches!(
        fs.rm_r(&d, false).await,
        Err(FsError::NotFound { .. })
    ));
    fs.rm_r(&d, true).await.unwrap();

    // Line iterator: strict end-of-stream that stays exhausted. The write
    // goes through the scoped form, which commits on the way out.
    let lines = root.join("lines.txt");
    with_open(fs, &lines, OpenMode::Write, async |handle| {
        handle.write(b"first\nsecond\n").await
    })
    .await
    .unwrap();
    let mut handle = fs.open(&lines, OpenMode::Read).await.unwrap();
    assert_eq!(handle.path(), &lines);
    assert_eq!(handle.mode(), OpenMode::Read);
    assert_eq!(handle.read_line().await.unwrap(), "first");
    assert_eq!(handle.read_line().await.unwrap(), "second");
    assert!(matches!(
        handle.read_line().await,
        Err(FsError::EndOfStream { .. })
    ));
    assert!(matches!(
        handle.read_line().await,
        Err(FsError::EndOfStream { .. })
    ));
    handle.close().await.unwrap();
}

#[tokio::test]
async fn local_backend_honors_the_contract() {
    let tmp = tempfile::tempdir().unwrap();
    let fs = LocalFileSystem::new();
    let root = p(tmp.path().to_str().unwrap());
    exercises_uniform_contract(&fs, &root).await;
}

#[tokio::test]
async fn object_backend_honors_the_contract() {
    let fs = ObjectStoreFileSystem::new(Arc::new(MemoryObjectStore::new()));
    let root = p("s3://contract");
    fs.mkdir_p(&root).await.unwrap();
    exercises_uniform_contract(&fs, &root).await;
}

#[tokio::test]
async fn cross_backend_copy_round_trips() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = FileSystemRegistry::new(FsConfig::default())
        .with_object_factory(Arc::new(MemoryObjectStore::new()));

    let local_file = tmp.path().join("payload.txt");
    tokio::fs::write(&local_file, b"foobarbaz").await.unwrap();

    let remote = "s3://inbox/data/payload.txt";
    registry
        .copy(local_file.to_str().unwrap(), remote)
        .await
        .unwrap();

    let (fs, path) = registry.resolve(remote).await.unwrap();
    assert!(fs.exists(&path).await.unwrap());
    let text = with_open(fs.as_ref(), &path, OpenMode::Read, async |handle| {
        handle.read_to_string().await
    })
    .await
    .unwrap();
    assert_eq!(text, "foobarbaz");

    let returned = tmp.path().join("returned.txt");
    registry
        .copy(remote, returned.to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(tokio::fs::read(&returned).await.unwrap(), b"foobarbaz");
}

#[tokio::test]
async fn cross_scheme_mv_copies_then_removes_the_source() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = FileSystemRegistry::new(FsConfig::default())
        .with_object_factory(Arc::new(MemoryObjectStore::new()));

    let local_file = tmp.path().join("outbound.txt");
    tokio::fs::write(&local_file, b"ship it").await.unwrap();

    registry
        .mv(local_file.to_str().unwrap(), "s3://archive/outbound.txt")
        .await
        .unwrap();

    assert!(!local_file.exists());
    let (fs, path) = registry.resolve("s3://archive/outbound.txt").await.unwrap();
    let text = with_open(fs.as_ref(), &path, OpenMode::Read, async |handle| {
        handle.read_to_string().await
    })
    .await
    .unwrap();
    assert_eq!(text, "ship it");
}

#[tokio::test]
async fn recursive_object_copy_rewrites_the_prefix() {
    let registry = FileSystemRegistry::new(FsConfig::default())
        .with_object_factory(Arc::new(MemoryObjectStore::new()));

    let (fs, bucket) = registry.resolve("s3://work").await.unwrap();
    fs.mkdir_p(&bucket).await.unwrap();
    for (path, data) in [("s3://work/d/a.txt", "A"), ("s3://work/d/b/c.txt", "C")] {
        write_via_handle(fs.as_ref(), &p(path), data.as_bytes()).await;
    }

    registry.copy_r("s3://work/d", "s3://work/e").await.unwrap();

    assert!(fs.is_file(&p("s3://work/e/a.txt")).await.unwrap());
    assert!(fs.is_file(&p("s3://work/e/b/c.txt")).await.unwrap());
    let copied: Vec<_> = fs
        .ls_r(&p("s3://work/e"))
        .await
        .unwrap()
        .into_iter()
        .filter(|e| !e.is_dir())
        .map(|e| e.path.path().to_string())
        .collect();
    assert_eq!(copied, ["e/a.txt", "e/b/c.txt"]);
}

#[tokio::test]
async fn scheme_spellings_route_and_display_canonically() {
    let registry = FileSystemRegistry::new(FsConfig::default())
        .with_object_factory(Arc::new(MemoryObjectStore::new()));

    // The legacy object-store spelling is accepted and canonicalized.
    let (fs, path) = registry.resolve("s3n://legacy/k.txt").await.unwrap();
    assert_eq!(fs.kind(), spanfs::BackendKind::ObjectStore);
    assert_eq!(path.to_string(), "s3://legacy/k.txt");

    let (fs, path) = registry.resolve("file:///var/tmp/x").await.unwrap();
    assert_eq!(fs.kind(), spanfs::BackendKind::Local);
    assert_eq!(path.path(), "/var/tmp/x");
}
