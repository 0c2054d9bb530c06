//! Native storage clients wrapped by the adapters: the bucket-bound object
//! store trait with its S3 and in-memory implementations, and the WebHDFS
//! REST client.

pub mod memory;
pub mod s3;
pub mod webhdfs;

use std::path::Path as StdPath;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
}

/// One delimiter-listing result, pagination already exhausted.
#[derive(Debug, Default, Clone)]
pub struct Listing {
    /// Virtual sub-directories: common key prefixes, without the trailing
    /// delimiter.
    pub prefixes: Vec<String>,
    pub objects: Vec<ObjectMeta>,
}

impl Listing {
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty() && self.objects.is_empty()
    }
}

/// Raw object operations against one bucket. Implementations translate their
/// native errors into the crate taxonomy and map "no such key" onto `None`
/// where the signature allows it.
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    fn bucket(&self) -> &str;

    async fn bucket_exists(&self) -> Result<bool>;

    /// Create the bucket; succeeding when this client already owns it.
    async fn create_bucket(&self) -> Result<()>;

    /// Delete the bucket, which must already be empty.
    async fn delete_bucket(&self) -> Result<()>;

    /// Size of the object, `None` if the key does not exist.
    async fn head_object(&self, key: &str) -> Result<Option<u64>>;

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>>;

    /// Stream the object into a local file; `NotFound` if the key is missing.
    async fn get_object_to_file(&self, key: &str, dest: &StdPath) -> Result<()>;

    async fn put_object(&self, key: &str, data: Bytes) -> Result<()>;

    /// Upload a local file as one object (multipart for large files).
    async fn put_object_from_file(&self, key: &str, src: &StdPath) -> Result<()>;

    /// Server-side copy of `src_bucket/src_key` to `dst_key` in this bucket.
    async fn copy_object(&self, src_bucket: &str, src_key: &str, dst_key: &str) -> Result<()>;

    /// Deleting a missing key is not an error; callers that require existence
    /// check first.
    async fn delete_object(&self, key: &str) -> Result<()>;

    /// List keys under `prefix`, grouping by `delimiter` when given.
    async fn list(&self, prefix: &str, delimiter: Option<char>) -> Result<Listing>;
}

/// Builds bucket-bound clients on first use; the object-store adapter caches
/// one per bucket behind a mutex.
#[async_trait]
pub trait ObjectClientFactory: Send + Sync {
    async fn connect(&self, bucket: &str) -> Result<Arc<dyn ObjectBackend>>;
}
