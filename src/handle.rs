//! Open-file handles over the three backends.
//!
//! Reads are uniform: disk handles stream through a `BufReader`, remote
//! handles hold the whole object fetched at open. Writes differ per
//! backend. Disk writes go straight to the file. Cluster writes create the
//! remote file empty on open and push every `write` as an append, so data
//! becomes visible incrementally. Object-store writes spool into a named
//! temp file and upload the finished object on `close`; dropping the handle
//! without closing discards the upload and the temp file with it.

use std::sync::Arc;

use bytes::Bytes;
use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use crate::adapter::FileSystem;
use crate::adapter::cluster::translate;
use crate::client::ObjectBackend;
use crate::client::webhdfs::WebHdfsClient;
use crate::error::{FsError, Result};
use crate::path::FsPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

pub struct FileHandle {
    path: FsPath,
    state: State,
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

enum State {
    DiskRead(BufReader<File>),
    DiskWrite(File),
    Buffered(BufferedRead),
    ClusterWrite(ClusterAppend),
    ObjectWrite(ObjectSpool),
}

/// Whole-content read cursor for cluster and object handles. `pos` only
/// moves forward, so an exhausted handle stays exhausted.
struct BufferedRead {
    data: Bytes,
    pos: usize,
}

struct ClusterAppend {
    client: Arc<WebHdfsClient>,
    remote: String,
}

struct ObjectSpool {
    backend: Arc<dyn ObjectBackend>,
    key: String,
    spool: NamedTempFile,
    file: File,
}

impl FileHandle {
    pub(crate) fn disk_read(path: FsPath, file: File) -> Self {
        FileHandle {
            path,
            state: State::DiskRead(BufReader::new(file)),
        }
    }

    pub(crate) fn disk_write(path: FsPath, file: File) -> Self {
        FileHandle {
            path,
            state: State::DiskWrite(file),
        }
    }

    pub(crate) fn buffered_read(path: FsPath, data: Bytes) -> Self {
        FileHandle {
            path,
            state: State::Buffered(BufferedRead { data, pos: 0 }),
        }
    }

    pub(crate) fn cluster_write(path: FsPath, client: Arc<WebHdfsClient>, remote: String) -> Self {
        FileHandle {
            path,
            state: State::ClusterWrite(ClusterAppend { client, remote }),
        }
    }

    pub(crate) fn object_write(
        path: FsPath,
        backend: Arc<dyn ObjectBackend>,
        key: String,
    ) -> Result<Self> {
        let spool = NamedTempFile::new()
            .map_err(|e| FsError::backend(format!("spool file for {path}: {e}")))?;
        let reopened = spool
            .reopen()
            .map_err(|e| FsError::backend(format!("spool file for {path}: {e}")))?;
        Ok(FileHandle {
            path,
            state: State::ObjectWrite(ObjectSpool {
                backend,
                key,
                spool,
                file: File::from_std(reopened),
            }),
        })
    }

    pub fn path(&self) -> &FsPath {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        match self.state {
            State::DiskRead(_) | State::Buffered(_) => OpenMode::Read,
            State::DiskWrite(_) | State::ClusterWrite(_) | State::ObjectWrite(_) => OpenMode::Write,
        }
    }

    /// Everything from the current position to the end. Empty once the
    /// handle is exhausted.
    pub async fn read(&mut self) -> Result<Bytes> {
        match &mut self.state {
            State::DiskRead(reader) => {
                let mut buf = Vec::new();
                reader
                    .read_to_end(&mut buf)
                    .await
                    .map_err(|e| FsError::from_io(e, &self.path))?;
                Ok(Bytes::from(buf))
            }
            State::Buffered(cursor) => {
                let rest = cursor.data.slice(cursor.pos..);
                cursor.pos = cursor.data.len();
                Ok(rest)
            }
            _ => Err(write_only(&self.path)),
        }
    }

    pub async fn read_to_string(&mut self) -> Result<String> {
        let data = self.read().await?;
        String::from_utf8(data.to_vec())
            .map_err(|e| FsError::backend(format!("{}: invalid utf-8: {e}", self.path)))
    }

    /// Next line with the trailing newline stripped. Fails with
    /// [`FsError::EndOfStream`] once the content is exhausted, and keeps
    /// failing on every later call.
    pub async fn read_line(&mut self) -> Result<String> {
        match &mut self.state {
            State::DiskRead(reader) => {
                let mut line = String::new();
                let n = reader
                    .read_line(&mut line)
                    .await
                    .map_err(|e| FsError::from_io(e, &self.path))?;
                if n == 0 {
                    return Err(FsError::end_of_stream(&self.path));
                }
                Ok(trim_newline(line))
            }
            State::Buffered(cursor) => {
                if cursor.pos >= cursor.data.len() {
                    return Err(FsError::end_of_stream(&self.path));
                }
                let rest = &cursor.data[cursor.pos..];
                let (raw, advance) = match rest.iter().position(|&b| b == b'\n') {
                    Some(i) => (&rest[..i], i + 1),
                    None => (rest, rest.len()),
                };
                let line = std::str::from_utf8(raw)
                    .map_err(|e| FsError::backend(format!("{}: invalid utf-8: {e}", self.path)))?
                    .trim_end_matches('\r')
                    .to_string();
                cursor.pos += advance;
                Ok(line)
            }
            _ => Err(write_only(&self.path)),
        }
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.state {
            State::DiskWrite(file) => file
                .write_all(data)
                .await
                .map_err(|e| FsError::from_io(e, &self.path)),
            State::ClusterWrite(append) => append
                .client
                .append(&append.remote, Bytes::copy_from_slice(data))
                .await
                .map_err(|e| translate(e, &self.path)),
            State::ObjectWrite(spool) => spool
                .file
                .write_all(data)
                .await
                .map_err(|e| FsError::from_io(e, &self.path)),
            _ => Err(read_only(&self.path)),
        }
    }

    /// Finish the handle. For object-store writes this is the moment the
    /// spooled content becomes the object; read handles and cluster writes
    /// have nothing left to do.
    pub async fn close(mut self) -> Result<()> {
        match self.state {
            State::DiskRead(_) | State::Buffered(_) | State::ClusterWrite(_) => Ok(()),
            State::DiskWrite(mut file) => {
                file.flush()
                    .await
                    .map_err(|e| FsError::from_io(e, &self.path))
            }
            State::ObjectWrite(mut spool) => {
                spool
                    .file
                    .flush()
                    .await
                    .map_err(|e| FsError::from_io(e, &self.path))?;
                drop(spool.file);
                spool
                    .backend
                    .put_object_from_file(&spool.key, spool.spool.path())
                    .await
            }
        }
    }
}

/// Run `f` against a freshly opened handle and close it on every exit path.
pub async fn with_open<T, F>(
    fs: &dyn FileSystem,
    path: &FsPath,
    mode: OpenMode,
    f: F,
) -> Result<T>
where
    F: AsyncFnOnce(&mut FileHandle) -> Result<T>,
{
    let mut handle = fs.open(path, mode).await?;
    match f(&mut handle).await {
        Ok(value) => {
            handle.close().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(close_err) = handle.close().await {
                log::warn!("close after failed operation on {path}: {close_err}");
            }
            Err(err)
        }
    }
}

fn trim_newline(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    line
}

fn write_only(path: &FsPath) -> FsError {
    FsError::backend(format!("{path} is open for writing, not reading"))
}

fn read_only(path: &FsPath) -> FsError {
    FsError::backend(format!("{path} is open for reading, not writing"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffered(content: &'static str) -> FileHandle {
        let path = FsPath::parse("s3://bucket/data.txt").unwrap();
        FileHandle::buffered_read(path, Bytes::from_static(content.as_bytes()))
    }

    #[tokio::test]
    async fn buffered_lines_then_end_of_stream() {
        let mut handle = buffered("alpha\nbeta\n");
        assert_eq!(handle.read_line().await.unwrap(), "alpha");
        assert_eq!(handle.read_line().await.unwrap(), "beta");
        assert!(matches!(
            handle.read_line().await,
            Err(FsError::EndOfStream { .. })
        ));
        // Exhausted stays exhausted.
        assert!(matches!(
            handle.read_line().await,
            Err(FsError::EndOfStream { .. })
        ));
    }

    #[tokio::test]
    async fn buffered_final_line_without_newline() {
        let mut handle = buffered("one\ntwo");
        assert_eq!(handle.read_line().await.unwrap(), "one");
        assert_eq!(handle.read_line().await.unwrap(), "two");
        assert!(matches!(
            handle.read_line().await,
            Err(FsError::EndOfStream { .. })
        ));
    }

    #[tokio::test]
    async fn buffered_read_consumes_remainder() {
        let mut handle = buffered("head\ntail");
        assert_eq!(handle.read_line().await.unwrap(), "head");
        assert_eq!(&handle.read().await.unwrap()[..], b"tail");
        assert!(handle.read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn disk_write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("out.txt");
        let fs_path = FsPath::parse(file_path.to_str().unwrap()).unwrap();

        let file = File::create(&file_path).await.unwrap();
        let mut handle = FileHandle::disk_write(fs_path.clone(), file);
        assert_eq!(handle.mode(), OpenMode::Write);
        handle.write(b"line one\n").await.unwrap();
        handle.write(b"line two\n").await.unwrap();
        handle.close().await.unwrap();

        let file = File::open(&file_path).await.unwrap();
        let mut handle = FileHandle::disk_read(fs_path, file);
        assert_eq!(handle.read_line().await.unwrap(), "line one");
        assert_eq!(handle.read_to_string().await.unwrap(), "line two\n");
        assert!(matches!(
            handle.read_line().await,
            Err(FsError::EndOfStream { .. })
        ));
    }

    #[tokio::test]
    async fn reading_a_write_handle_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("w.txt");
        let fs_path = FsPath::parse(file_path.to_str().unwrap()).unwrap();
        let file = File::create(&file_path).await.unwrap();
        let mut handle = FileHandle::disk_write(fs_path, file);
        assert!(handle.read().await.is_err());
        assert!(handle.write(b"ok").await.is_ok());
        handle.close().await.unwrap();
    }
}
