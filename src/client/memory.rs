//! In-memory object store. Backs the test suites and doubles as a scratch
//! backend; semantics mirror the S3 client (flat keys, delimiter grouping,
//! explicit buckets).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path as StdPath;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use crate::client::{Listing, ObjectBackend, ObjectClientFactory, ObjectMeta};
use crate::error::{FsError, Result};

type BucketMap = HashMap<String, BTreeMap<String, Bytes>>;

/// Factory holding the shared bucket space. Clones hand out views of the same
/// storage.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    buckets: Arc<Mutex<BucketMap>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectClientFactory for MemoryObjectStore {
    async fn connect(&self, bucket: &str) -> Result<Arc<dyn ObjectBackend>> {
        Ok(Arc::new(MemoryBackend {
            bucket: bucket.to_string(),
            buckets: self.buckets.clone(),
        }))
    }
}

pub struct MemoryBackend {
    bucket: String,
    buckets: Arc<Mutex<BucketMap>>,
}

impl MemoryBackend {
    fn no_such_bucket(&self) -> FsError {
        FsError::backend(format!("NoSuchBucket: {}", self.bucket))
    }
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn bucket_exists(&self) -> Result<bool> {
        Ok(self.buckets.lock().await.contains_key(&self.bucket))
    }

    async fn create_bucket(&self) -> Result<()> {
        self.buckets
            .lock()
            .await
            .entry(self.bucket.clone())
            .or_default();
        Ok(())
    }

    async fn delete_bucket(&self) -> Result<()> {
        let mut buckets = self.buckets.lock().await;
        match buckets.get(&self.bucket) {
            Some(objects) if !objects.is_empty() => Err(FsError::backend(format!(
                "BucketNotEmpty: {}",
                self.bucket
            ))),
            Some(_) => {
                buckets.remove(&self.bucket);
                Ok(())
            }
            None => Err(self.no_such_bucket()),
        }
    }

    async fn head_object(&self, key: &str) -> Result<Option<u64>> {
        Ok(self
            .buckets
            .lock()
            .await
            .get(&self.bucket)
            .and_then(|objects| objects.get(key))
            .map(|data| data.len() as u64))
    }

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self
            .buckets
            .lock()
            .await
            .get(&self.bucket)
            .and_then(|objects| objects.get(key))
            .cloned())
    }

    async fn get_object_to_file(&self, key: &str, dest: &StdPath) -> Result<()> {
        let data = self
            .get_object(key)
            .await?
            .ok_or_else(|| FsError::not_found(format!("s3://{}/{key}", self.bucket)))?;
        tokio::fs::write(dest, &data)
            .await
            .map_err(|e| FsError::from_io(e, dest.display()))
    }

    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        let mut buckets = self.buckets.lock().await;
        let objects = buckets
            .get_mut(&self.bucket)
            .ok_or_else(|| self.no_such_bucket())?;
        objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn put_object_from_file(&self, key: &str, src: &StdPath) -> Result<()> {
        let data = tokio::fs::read(src)
            .await
            .map_err(|e| FsError::from_io(e, src.display()))?;
        self.put_object(key, Bytes::from(data)).await
    }

    async fn copy_object(&self, src_bucket: &str, src_key: &str, dst_key: &str) -> Result<()> {
        let mut buckets = self.buckets.lock().await;
        let data = buckets
            .get(src_bucket)
            .and_then(|objects| objects.get(src_key))
            .cloned()
            .ok_or_else(|| FsError::not_found(format!("s3://{src_bucket}/{src_key}")))?;
        let objects = buckets
            .get_mut(&self.bucket)
            .ok_or_else(|| self.no_such_bucket())?;
        objects.insert(dst_key.to_string(), data);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        if let Some(objects) = self.buckets.lock().await.get_mut(&self.bucket) {
            objects.remove(key);
        }
        Ok(())
    }

    async fn list(&self, prefix: &str, delimiter: Option<char>) -> Result<Listing> {
        let buckets = self.buckets.lock().await;
        let Some(objects) = buckets.get(&self.bucket) else {
            return Ok(Listing::default());
        };

        let mut listing = Listing::default();
        let mut seen_prefixes = BTreeSet::new();
        for (key, data) in objects.range(prefix.to_string()..) {
            let Some(rest) = key.strip_prefix(prefix) else {
                break;
            };
            match delimiter.and_then(|d| rest.find(d)) {
                Some(idx) => {
                    seen_prefixes.insert(format!("{prefix}{}", &rest[..idx]));
                }
                None => listing.objects.push(ObjectMeta {
                    key: key.clone(),
                    size: data.len() as u64,
                }),
            }
        }
        listing.prefixes = seen_prefixes.into_iter().collect();
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend(store: &MemoryObjectStore, bucket: &str) -> Arc<dyn ObjectBackend> {
        let b = store.connect(bucket).await.unwrap();
        b.create_bucket().await.unwrap();
        b
    }

    #[tokio::test]
    async fn delimiter_listing_groups_virtual_directories() {
        let store = MemoryObjectStore::new();
        let b = backend(&store, "main").await;
        for key in ["d/a.txt", "d/b/c.txt", "d/b/d.txt", "other.txt"] {
            b.put_object(key, Bytes::from_static(b"x")).await.unwrap();
        }

        let listing = b.list("d/", Some('/')).await.unwrap();
        assert_eq!(listing.prefixes, vec!["d/b".to_string()]);
        assert_eq!(
            listing.objects.iter().map(|o| o.key.as_str()).collect::<Vec<_>>(),
            vec!["d/a.txt"]
        );

        let flat = b.list("d/", None).await.unwrap();
        assert_eq!(flat.objects.len(), 3);
    }

    #[tokio::test]
    async fn copy_object_reaches_other_buckets() {
        let store = MemoryObjectStore::new();
        let src = backend(&store, "src").await;
        let dst = backend(&store, "dst").await;
        src.put_object("k", Bytes::from_static(b"payload"))
            .await
            .unwrap();

        dst.copy_object("src", "k", "moved/k").await.unwrap();
        let data = dst.get_object("moved/k").await.unwrap().unwrap();
        assert_eq!(&data[..], b"payload");
    }

    #[tokio::test]
    async fn put_without_bucket_fails() {
        let store = MemoryObjectStore::new();
        let b = store.connect("ghost").await.unwrap();
        let err = b
            .put_object("k", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::Backend { .. }));
    }
}
