//! S3 client on aws-sdk-s3: paginated listings, multipart upload with bounded
//! concurrency, retry with exponential delay, typed not-found mapping.

use std::path::Path as StdPath;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
};
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::{OnceCell, Semaphore};
use tokio::time::{Duration, sleep};

use crate::client::{Listing, ObjectBackend, ObjectClientFactory, ObjectMeta};
use crate::config::ObjectStoreConfig;
use crate::error::{FsError, Result};

/// Builds the shared SDK client on first use and hands out bucket-bound
/// backends.
pub struct S3ClientFactory {
    config: ObjectStoreConfig,
    client: OnceCell<Client>,
}

impl S3ClientFactory {
    pub fn new(config: ObjectStoreConfig) -> Self {
        S3ClientFactory {
            config,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&Client> {
        self.client
            .get_or_try_init(|| async {
                let credentials = aws_sdk_s3::config::Credentials::new(
                    self.config.access_key.clone(),
                    self.config.secret_key.clone(),
                    None,
                    None,
                    "spanfs",
                );
                let region = self
                    .config
                    .region
                    .clone()
                    .unwrap_or_else(|| "us-east-1".to_string());
                let mut loader = aws_config::ConfigLoader::default()
                    .credentials_provider(credentials)
                    .region(aws_config::Region::new(region));
                if let Some(endpoint) = &self.config.endpoint {
                    loader = loader.endpoint_url(endpoint);
                }
                let shared = loader.load().await;

                let mut builder = aws_sdk_s3::config::Builder::from(&shared);
                if self.config.endpoint.is_some() {
                    // Custom endpoints (MinIO etc.) rarely resolve
                    // virtual-host bucket names.
                    builder = builder.force_path_style(true);
                }
                Ok(Client::from_conf(builder.build()))
            })
            .await
    }
}

#[async_trait]
impl ObjectClientFactory for S3ClientFactory {
    async fn connect(&self, bucket: &str) -> Result<Arc<dyn ObjectBackend>> {
        let client = self.client().await?.clone();
        log::debug!("s3: new backend handle for bucket {bucket}");
        Ok(Arc::new(S3Backend {
            client,
            bucket: bucket.to_string(),
            config: self.config.clone(),
        }))
    }
}

pub struct S3Backend {
    client: Client,
    bucket: String,
    config: ObjectStoreConfig,
}

impl S3Backend {
    async fn with_retry<T, E, F, Fut>(&self, op_name: &'static str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt <= self.config.max_retries => {
                    let delay = self.config.initial_retry_delay_ms * 2u64.pow(attempt - 1);
                    log::warn!("s3: {op_name} attempt {attempt} failed ({err}), retrying in {delay}ms");
                    sleep(Duration::from_millis(delay)).await;
                }
                Err(err) => {
                    return Err(FsError::backend(format!(
                        "{op_name} failed after {attempt} attempts: {}",
                        DisplayErrorContext(err)
                    )));
                }
            }
        }
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
        semaphore: Arc<Semaphore>,
    ) -> Result<CompletedPart> {
        let _permit = semaphore
            .acquire()
            .await
            .map_err(|e| FsError::backend(format!("upload_part semaphore: {e}")))?;
        let response = self
            .with_retry("upload_part", || {
                self.client
                    .upload_part()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(data.clone()))
                    .send()
            })
            .await?;
        Ok(CompletedPart::builder()
            .part_number(part_number)
            .set_e_tag(response.e_tag().map(|t| t.to_string()))
            .build())
    }

    async fn multipart_put(&self, key: &str, data: Bytes) -> Result<()> {
        let upload_id = self.create_upload(key).await?;

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut uploads = Vec::new();
        let mut offset = 0usize;
        let mut part_number = 1i32;
        while offset < data.len() {
            let end = (offset + self.config.part_size).min(data.len());
            uploads.push(self.upload_part(
                key,
                &upload_id,
                part_number,
                data.slice(offset..end),
                semaphore.clone(),
            ));
            offset = end;
            part_number += 1;
        }

        match futures::future::try_join_all(uploads).await {
            Ok(parts) => self.complete_upload(key, &upload_id, parts).await,
            Err(err) => {
                self.abort_upload(key, &upload_id).await;
                Err(err)
            }
        }
    }

    async fn create_upload(&self, key: &str) -> Result<String> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| backend_err("create_multipart_upload", e))?;
        created
            .upload_id()
            .map(|id| id.to_string())
            .ok_or_else(|| FsError::backend("create_multipart_upload returned no upload id"))
    }

    async fn complete_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<()> {
        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| backend_err("complete_multipart_upload", e))?;
        Ok(())
    }

    async fn abort_upload(&self, key: &str, upload_id: &str) {
        let aborted = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await;
        if let Err(err) = aborted {
            log::warn!(
                "s3: abort_multipart_upload for {key} failed: {}",
                DisplayErrorContext(err)
            );
        }
    }
}

#[async_trait]
impl ObjectBackend for S3Backend {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn bucket_exists(&self) -> Result<bool> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(backend_err("head_bucket", err)),
        }
    }

    async fn create_bucket(&self) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(&self.bucket);
        match self.config.region.as_deref() {
            Some(region) if region != "us-east-1" => {
                request = request.create_bucket_configuration(
                    CreateBucketConfiguration::builder()
                        .location_constraint(BucketLocationConstraint::from(region))
                        .build(),
                );
            }
            _ => {}
        }
        match request.send().await {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_bucket_already_owned_by_you()) =>
            {
                Ok(())
            }
            Err(err) => Err(backend_err("create_bucket", err)),
        }
    }

    async fn delete_bucket(&self) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| backend_err("delete_bucket", e))?;
        Ok(())
    }

    async fn head_object(&self, key: &str) -> Result<Option<u64>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(out) => Ok(Some(out.content_length().unwrap_or(0).max(0) as u64)),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(None),
            Err(err) => Err(backend_err("head_object", err)),
        }
    }

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>> {
        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(out) => {
                let data = out
                    .body
                    .collect()
                    .await
                    .map_err(|e| FsError::backend(format!("get_object body: {e}")))?;
                Ok(Some(data.into_bytes()))
            }
            Err(err) if is_missing_key(&err) => Ok(None),
            Err(err) => Err(backend_err("get_object", err)),
        }
    }

    async fn get_object_to_file(&self, key: &str, dest: &StdPath) -> Result<()> {
        let out = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(out) => out,
            Err(err) if is_missing_key(&err) => {
                return Err(FsError::not_found(format!("s3://{}/{key}", self.bucket)));
            }
            Err(err) => return Err(backend_err("get_object", err)),
        };

        let mut reader = out.body.into_async_read();
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| FsError::from_io(e, dest.display()))?;
        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| FsError::from_io(e, dest.display()))?;
        Ok(())
    }

    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        if data.len() > self.config.part_size {
            return self.multipart_put(key, data).await;
        }
        self.with_retry("put_object", || {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(ByteStream::from(data.clone()))
                .send()
        })
        .await?;
        Ok(())
    }

    async fn put_object_from_file(&self, key: &str, src: &StdPath) -> Result<()> {
        let len = tokio::fs::metadata(src)
            .await
            .map_err(|e| FsError::from_io(e, src.display()))?
            .len() as usize;
        if len <= self.config.part_size {
            let data = tokio::fs::read(src)
                .await
                .map_err(|e| FsError::from_io(e, src.display()))?;
            return self.put_object(key, Bytes::from(data)).await;
        }

        // Parts are read and uploaded one at a time, so spooled uploads never
        // hold more than one part in memory.
        let upload_id = self.create_upload(key).await?;
        let mut file = match tokio::fs::File::open(src).await {
            Ok(f) => f,
            Err(e) => {
                self.abort_upload(key, &upload_id).await;
                return Err(FsError::from_io(e, src.display()));
            }
        };
        let semaphore = Arc::new(Semaphore::new(1));
        let mut parts = Vec::new();
        let mut part_number = 1i32;
        let mut remaining = len;
        while remaining > 0 {
            let chunk = remaining.min(self.config.part_size);
            let mut buf = vec![0u8; chunk];
            if let Err(e) = file.read_exact(&mut buf).await {
                self.abort_upload(key, &upload_id).await;
                return Err(FsError::from_io(e, src.display()));
            }
            match self
                .upload_part(
                    key,
                    &upload_id,
                    part_number,
                    Bytes::from(buf),
                    semaphore.clone(),
                )
                .await
            {
                Ok(part) => parts.push(part),
                Err(err) => {
                    self.abort_upload(key, &upload_id).await;
                    return Err(err);
                }
            }
            remaining -= chunk;
            part_number += 1;
        }
        self.complete_upload(key, &upload_id, parts).await
    }

    async fn copy_object(&self, src_bucket: &str, src_key: &str, dst_key: &str) -> Result<()> {
        self.with_retry("copy_object", || {
            self.client
                .copy_object()
                .copy_source(format!("{src_bucket}/{src_key}"))
                .bucket(&self.bucket)
                .key(dst_key)
                .send()
        })
        .await?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| backend_err("delete_object", e))?;
        Ok(())
    }

    async fn list(&self, prefix: &str, delimiter: Option<char>) -> Result<Listing> {
        let mut listing = Listing::default();
        let mut token: Option<String> = None;
        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(token.take());
            if let Some(d) = delimiter {
                request = request.delimiter(d.to_string());
            }
            let page = request
                .send()
                .await
                .map_err(|e| backend_err("list_objects_v2", e))?;

            for common in page.common_prefixes() {
                if let Some(p) = common.prefix() {
                    let trimmed = match delimiter {
                        Some(d) => p.trim_end_matches(d),
                        None => p,
                    };
                    listing.prefixes.push(trimmed.to_string());
                }
            }
            for object in page.contents() {
                if let Some(key) = object.key() {
                    listing.objects.push(ObjectMeta {
                        key: key.to_string(),
                        size: object.size().unwrap_or(0).max(0) as u64,
                    });
                }
            }

            match page.next_continuation_token() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }
        listing.prefixes.sort();
        listing.prefixes.dedup();
        Ok(listing)
    }
}

fn backend_err<E>(op: &str, err: E) -> FsError
where
    E: std::error::Error + Send + Sync + 'static,
{
    FsError::backend(format!("{op}: {}", DisplayErrorContext(err)))
}

fn is_missing_key<R>(
    err: &aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::get_object::GetObjectError, R>,
) -> bool {
    match err.as_service_error() {
        Some(service) => service.is_no_such_key() || service.code() == Some("NoSuchBucket"),
        None => false,
    }
}
