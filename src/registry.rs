//! Scheme-to-backend registry.
//!
//! One adapter per scheme per process, built on first use behind a mutex.
//! The registry is also the orchestration point for cross-backend `copy`,
//! `copy_r` and `mv`, which route through [`crate::copier`].

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio::sync::Mutex;

use crate::adapter::FileSystem;
use crate::adapter::cluster::ClusterFileSystem;
use crate::adapter::local::LocalFileSystem;
use crate::adapter::object::ObjectStoreFileSystem;
use crate::client::ObjectClientFactory;
use crate::client::s3::S3ClientFactory;
use crate::config::FsConfig;
use crate::copier;
use crate::error::{FsError, Result};
use crate::path::{FsPath, Scheme};

pub struct FileSystemRegistry {
    config: FsConfig,
    object_factory: Option<Arc<dyn ObjectClientFactory>>,
    local: Mutex<Option<Arc<LocalFileSystem>>>,
    cluster: Mutex<Option<Arc<ClusterFileSystem>>>,
    object: Mutex<Option<Arc<ObjectStoreFileSystem>>>,
}

impl FileSystemRegistry {
    pub fn new(config: FsConfig) -> Self {
        FileSystemRegistry {
            config,
            object_factory: None,
            local: Mutex::new(None),
            cluster: Mutex::new(None),
            object: Mutex::new(None),
        }
    }

    /// Swap the object-store client factory, e.g. for
    /// [`crate::client::memory::MemoryObjectStore`] in tests. Call before
    /// the object backend is first used.
    pub fn with_object_factory(mut self, factory: Arc<dyn ObjectClientFactory>) -> Self {
        self.object_factory = Some(factory);
        self
    }

    /// The adapter registered for `scheme`, created on first request.
    pub async fn get(&self, scheme: Scheme) -> Result<Arc<dyn FileSystem>> {
        match scheme {
            Scheme::Local => {
                let fs: Arc<dyn FileSystem> = self.local().await;
                Ok(fs)
            }
            Scheme::Cluster => {
                let fs: Arc<dyn FileSystem> = self.cluster().await?;
                Ok(fs)
            }
            Scheme::ObjectStore => {
                let fs: Arc<dyn FileSystem> = self.object_store().await?;
                Ok(fs)
            }
        }
    }

    /// Parse `input` and pair it with the backend its scheme routes to.
    pub async fn resolve(&self, input: &str) -> Result<(Arc<dyn FileSystem>, FsPath)> {
        let path = FsPath::parse(input)?;
        let fs = self.get(path.scheme()).await?;
        Ok((fs, path))
    }

    pub async fn local(&self) -> Arc<LocalFileSystem> {
        let mut cell = self.local.lock().await;
        cell.get_or_insert_with(|| Arc::new(LocalFileSystem::new()))
            .clone()
    }

    /// The cluster adapter; fails if no cluster endpoint is configured.
    pub async fn cluster(&self) -> Result<Arc<ClusterFileSystem>> {
        let mut cell = self.cluster.lock().await;
        if let Some(fs) = cell.as_ref() {
            return Ok(fs.clone());
        }
        let config = self.config.cluster.clone().ok_or_else(|| {
            FsError::backend("no cluster endpoint configured (set WEBHDFS_URL or FsConfig.cluster)")
        })?;
        log::info!("registry: cluster backend at {}", config.endpoint);
        let fs = Arc::new(ClusterFileSystem::new(config));
        *cell = Some(fs.clone());
        Ok(fs)
    }

    /// The object-store adapter; fails if neither credentials nor a custom
    /// factory are configured.
    pub async fn object_store(&self) -> Result<Arc<ObjectStoreFileSystem>> {
        let mut cell = self.object.lock().await;
        if let Some(fs) = cell.as_ref() {
            return Ok(fs.clone());
        }
        let factory: Arc<dyn ObjectClientFactory> = match &self.object_factory {
            Some(factory) => factory.clone(),
            None => {
                let config = self.config.object_store.clone().ok_or_else(|| {
                    FsError::backend(
                        "no object-store credentials configured (set AWS_ACCESS_KEY_ID and \
                         AWS_SECRET_ACCESS_KEY or FsConfig.object_store)",
                    )
                })?;
                log::info!("registry: object-store backend ready");
                Arc::new(S3ClientFactory::new(config))
            }
        };
        let fs = Arc::new(ObjectStoreFileSystem::new(factory));
        *cell = Some(fs.clone());
        Ok(fs)
    }

    /// Copy one file across any pair of backends. Same-scheme pairs use the
    /// backend's own copy, pairs with a local side use the remote backend's
    /// transfer seam, and fully remote pairs stage through the cluster
    /// adapter.
    pub async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        copier::copy(self, src, dst, false).await
    }

    /// Recursive cross-backend copy.
    pub async fn copy_r(&self, src: &str, dst: &str) -> Result<()> {
        copier::copy(self, src, dst, true).await
    }

    /// Move across backends: a same-scheme rename where possible, otherwise
    /// recursive copy followed by removal of the source.
    pub async fn mv(&self, src: &str, dst: &str) -> Result<()> {
        copier::mv(self, src, dst).await
    }
}

static GLOBAL: OnceCell<FileSystemRegistry> = OnceCell::new();

/// Install the process-wide registry. The first call wins; later calls get
/// the already-installed instance back.
pub fn install_global(config: FsConfig) -> &'static FileSystemRegistry {
    GLOBAL.get_or_init(|| FileSystemRegistry::new(config))
}

/// The process-wide registry, built from the environment if nothing was
/// installed explicitly.
pub fn global() -> &'static FileSystemRegistry {
    GLOBAL.get_or_init(|| FileSystemRegistry::new(FsConfig::from_env()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::BackendKind;

    #[tokio::test]
    async fn adapters_are_cached_per_scheme() {
        let registry = FileSystemRegistry::new(FsConfig::default());
        let a = registry.local().await;
        let b = registry.local().await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn unconfigured_backends_fail_on_first_use_only() {
        let registry = FileSystemRegistry::new(FsConfig::default());

        let (fs, path) = registry.resolve("/tmp/anything").await.unwrap();
        assert_eq!(fs.kind(), BackendKind::Local);
        assert_eq!(path.scheme(), Scheme::Local);

        let err = registry.resolve("hdfs:///logs/app").await.unwrap_err();
        assert!(matches!(err, FsError::Backend { .. }));
        let err = registry.resolve("s3://bucket/key").await.unwrap_err();
        assert!(matches!(err, FsError::Backend { .. }));
    }

    #[tokio::test]
    async fn unknown_scheme_is_rejected_at_resolution() {
        let registry = FileSystemRegistry::new(FsConfig::default());
        let err = registry.resolve("ftp://host/file").await.unwrap_err();
        assert!(matches!(err, FsError::UnknownScheme { .. }));
    }

    #[tokio::test]
    async fn configured_cluster_backend_is_handed_out() {
        let config = FsConfig {
            cluster: Some(crate::config::ClusterConfig::new("http://localhost:9870")),
            ..FsConfig::default()
        };
        let registry = FileSystemRegistry::new(config);

        let fs = registry.get(Scheme::Cluster).await.unwrap();
        assert_eq!(fs.kind(), BackendKind::Cluster);
        let typed = registry.cluster().await.unwrap();
        assert_eq!(typed.kind(), BackendKind::Cluster);
    }
}
