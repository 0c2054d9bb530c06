//! Backend configuration, supplied explicitly to the registry.
//!
//! Nothing here is read implicitly at operation time; `from_env` is the one
//! place environment variables are consulted, and callers may just as well
//! build the structs by hand.

use std::env;

/// Settings for every backend the registry may construct. A `None` section
/// leaves that backend unconfigured: requesting it fails, other schemes stay
/// usable.
#[derive(Debug, Clone, Default)]
pub struct FsConfig {
    pub object_store: Option<ObjectStoreConfig>,
    pub cluster: Option<ClusterConfig>,
}

impl FsConfig {
    /// Read the conventional environment variables:
    /// `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_REGION`,
    /// `AWS_ENDPOINT_URL` for the object store and `WEBHDFS_URL`,
    /// `WEBHDFS_USER`, `WEBHDFS_TIMEOUT_SECS` for the cluster.
    pub fn from_env() -> Self {
        let object_store = match (
            env::var("AWS_ACCESS_KEY_ID"),
            env::var("AWS_SECRET_ACCESS_KEY"),
        ) {
            (Ok(access_key), Ok(secret_key)) => Some(ObjectStoreConfig {
                region: env::var("AWS_REGION")
                    .or_else(|_| env::var("AWS_DEFAULT_REGION"))
                    .ok(),
                endpoint: env::var("AWS_ENDPOINT_URL").ok(),
                ..ObjectStoreConfig::new(access_key, secret_key)
            }),
            _ => None,
        };

        let cluster = env::var("WEBHDFS_URL").ok().map(|endpoint| ClusterConfig {
            user: env::var("WEBHDFS_USER").ok(),
            timeout_secs: env::var("WEBHDFS_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok()),
            ..ClusterConfig::new(endpoint)
        });

        FsConfig {
            object_store,
            cluster,
        }
    }
}

/// S3-compatible object store access. A custom `endpoint` (MinIO and friends)
/// switches the client to path-style addressing.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    /// Uploads larger than this go through multipart, in parts of this size.
    pub part_size: usize,
    /// Concurrent in-flight parts during a multipart upload.
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub initial_retry_delay_ms: u64,
}

impl ObjectStoreConfig {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        ObjectStoreConfig {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: None,
            endpoint: None,
            part_size: 8 * 1024 * 1024,
            max_concurrency: 8,
            max_retries: 3,
            initial_retry_delay_ms: 100,
        }
    }
}

/// WebHDFS endpoint of the cluster namespace, e.g. `http://namenode:9870`.
/// The timeout is handed through to the HTTP client untouched.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub endpoint: String,
    pub user: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl ClusterConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        ClusterConfig {
            endpoint: endpoint.into(),
            user: None,
            timeout_secs: None,
        }
    }
}
