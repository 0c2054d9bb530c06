//! WebHDFS REST client.
//!
//! Speaks the namenode's `/webhdfs/v1` JSON protocol over reqwest. Data
//! transfers (OPEN, CREATE, APPEND) use `noredirect=true`: the namenode
//! answers with the datanode URL in a JSON body and we issue the data
//! request ourselves, which keeps request bodies off the redirect path.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use serde::Deserialize;
use thiserror::Error;

use crate::config::ClusterConfig;

#[derive(Debug, Error)]
pub enum WebHdfsError {
    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error),
    /// Server-side failure decoded from a `RemoteException` envelope. The
    /// exception name is the Java class without its package, e.g.
    /// `FileNotFoundException`.
    #[error("{exception}: {message}")]
    Remote { exception: String, message: String },
    #[error("protocol: {0}")]
    Protocol(String),
}

impl WebHdfsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, WebHdfsError::Remote { exception, .. } if exception == "FileNotFoundException")
    }

    pub fn exception(&self) -> Option<&str> {
        match self {
            WebHdfsError::Remote { exception, .. } => Some(exception),
            _ => None,
        }
    }
}

pub type WebHdfsResult<T> = std::result::Result<T, WebHdfsError>;

/// One entry from GETFILESTATUS or LISTSTATUS. Only the fields the adapters
/// consume; unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatus {
    /// Name relative to the listed directory. Empty for GETFILESTATUS.
    #[serde(default)]
    pub path_suffix: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub length: u64,
    #[serde(default)]
    pub modification_time: u64,
}

impl FileStatus {
    pub fn is_dir(&self) -> bool {
        self.kind == "DIRECTORY"
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSummary {
    #[serde(default)]
    pub directory_count: u64,
    #[serde(default)]
    pub file_count: u64,
    /// Total bytes under the path, recursively.
    #[serde(default)]
    pub length: u64,
}

#[derive(Deserialize)]
struct FileStatusResponse {
    #[serde(rename = "FileStatus")]
    file_status: FileStatus,
}

// LISTSTATUS of an empty directory comes back with a null or absent entry
// array on some server versions, so both levels tolerate null.
#[derive(Deserialize)]
struct FileStatusesResponse {
    #[serde(rename = "FileStatuses", default)]
    file_statuses: Option<FileStatuses>,
}

#[derive(Default, Deserialize)]
struct FileStatuses {
    #[serde(rename = "FileStatus", default)]
    file_status: Option<Vec<FileStatus>>,
}

#[derive(Deserialize)]
struct ContentSummaryResponse {
    #[serde(rename = "ContentSummary")]
    content_summary: ContentSummary,
}

#[derive(Deserialize)]
struct BooleanResponse {
    boolean: bool,
}

#[derive(Deserialize)]
struct LocationResponse {
    #[serde(rename = "Location")]
    location: String,
}

#[derive(Deserialize)]
struct RemoteExceptionResponse {
    #[serde(rename = "RemoteException")]
    remote_exception: RemoteExceptionBody,
}

#[derive(Deserialize)]
struct RemoteExceptionBody {
    exception: String,
    #[serde(default)]
    message: String,
}

pub struct WebHdfsClient {
    http: reqwest::Client,
    base: String,
    user: Option<String>,
}

impl WebHdfsClient {
    pub fn new(config: &ClusterConfig) -> WebHdfsResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(WebHdfsClient {
            http: builder.build()?,
            base: config.endpoint.trim_end_matches('/').to_string(),
            user: config.user.clone(),
        })
    }

    /// GETFILESTATUS. `None` when the path does not exist.
    pub async fn status(&self, path: &str) -> WebHdfsResult<Option<FileStatus>> {
        let result: WebHdfsResult<FileStatusResponse> = self
            .request_json(Method::GET, path, &[("op", "GETFILESTATUS")])
            .await;
        match result {
            Ok(response) => Ok(Some(response.file_status)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// LISTSTATUS. Directory entries in server order; empty for an empty
    /// directory. Listing a plain file yields that file's own status.
    pub async fn list(&self, path: &str) -> WebHdfsResult<Vec<FileStatus>> {
        let response: FileStatusesResponse = self
            .request_json(Method::GET, path, &[("op", "LISTSTATUS")])
            .await?;
        Ok(response
            .file_statuses
            .and_then(|s| s.file_status)
            .unwrap_or_default())
    }

    /// GETCONTENTSUMMARY, the recursive byte count used for directory sizes.
    pub async fn content_summary(&self, path: &str) -> WebHdfsResult<ContentSummary> {
        let response: ContentSummaryResponse = self
            .request_json(Method::GET, path, &[("op", "GETCONTENTSUMMARY")])
            .await?;
        Ok(response.content_summary)
    }

    pub async fn mkdirs(&self, path: &str) -> WebHdfsResult<bool> {
        let response: BooleanResponse = self
            .request_json(Method::PUT, path, &[("op", "MKDIRS")])
            .await?;
        Ok(response.boolean)
    }

    /// RENAME. The namenode reports refusals (missing destination parent,
    /// destination in use) as `{"boolean": false}` rather than an exception.
    pub async fn rename(&self, src: &str, dst: &str) -> WebHdfsResult<bool> {
        let response: BooleanResponse = self
            .request_json(Method::PUT, src, &[("op", "RENAME"), ("destination", dst)])
            .await?;
        Ok(response.boolean)
    }

    /// DELETE. `false` means the path was already absent.
    pub async fn delete(&self, path: &str, recursive: bool) -> WebHdfsResult<bool> {
        let recursive = if recursive { "true" } else { "false" };
        let response: BooleanResponse = self
            .request_json(
                Method::DELETE,
                path,
                &[("op", "DELETE"), ("recursive", recursive)],
            )
            .await?;
        Ok(response.boolean)
    }

    /// OPEN: fetch the whole file. `None` when it does not exist.
    pub async fn read(&self, path: &str) -> WebHdfsResult<Option<Bytes>> {
        let location = match self
            .data_location(Method::GET, path, &[("op", "OPEN"), ("noredirect", "true")])
            .await
        {
            Ok(location) => location,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        let response = Self::checked(self.http.get(&location).send().await?).await?;
        Ok(Some(response.bytes().await?))
    }

    /// CREATE: write a complete file in one shot.
    pub async fn create(&self, path: &str, data: Bytes, overwrite: bool) -> WebHdfsResult<()> {
        let overwrite = if overwrite { "true" } else { "false" };
        let location = self
            .data_location(
                Method::PUT,
                path,
                &[
                    ("op", "CREATE"),
                    ("noredirect", "true"),
                    ("overwrite", overwrite),
                ],
            )
            .await?;
        Self::checked(self.http.put(&location).body(data).send().await?).await?;
        Ok(())
    }

    /// APPEND to an existing file.
    pub async fn append(&self, path: &str, data: Bytes) -> WebHdfsResult<()> {
        let location = self
            .data_location(
                Method::POST,
                path,
                &[("op", "APPEND"), ("noredirect", "true")],
            )
            .await?;
        Self::checked(self.http.post(&location).body(data).send().await?).await?;
        Ok(())
    }

    // First leg of a two-step data operation: ask the namenode where the
    // data request should go.
    async fn data_location(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
    ) -> WebHdfsResult<String> {
        let response = self.send(method, path, params).await?;
        let body: LocationResponse = response
            .json()
            .await
            .map_err(|e| WebHdfsError::Protocol(format!("missing Location in response: {e}")))?;
        Ok(body.location)
    }

    async fn request_json<T>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
    ) -> WebHdfsResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self.send(method, path, params).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
    ) -> WebHdfsResult<reqwest::Response> {
        let url = format!("{}/webhdfs/v1{}", self.base, path);
        let mut request = self.http.request(method, &url).query(params);
        if let Some(user) = &self.user {
            request = request.query(&[("user.name", user.as_str())]);
        }
        Self::checked(request.send().await?).await
    }

    async fn checked(response: reqwest::Response) -> WebHdfsResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<RemoteExceptionResponse>(&body) {
            Ok(envelope) => Err(WebHdfsError::Remote {
                exception: envelope.remote_exception.exception,
                message: envelope.remote_exception.message,
            }),
            Err(_) => Err(WebHdfsError::Protocol(format!("HTTP {status}: {body}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_payload_with_null_entries_is_empty() {
        let payload = r#"{"FileStatuses":{"FileStatus":null}}"#;
        let response: FileStatusesResponse = serde_json::from_str(payload).unwrap();
        let entries = response
            .file_statuses
            .and_then(|s| s.file_status)
            .unwrap_or_default();
        assert!(entries.is_empty());
    }

    #[test]
    fn file_status_decodes_server_fields() {
        let payload = r#"{
            "FileStatus": {
                "accessTime": 0,
                "blockSize": 134217728,
                "group": "supergroup",
                "length": 24930,
                "modificationTime": 1320171722771,
                "owner": "webuser",
                "pathSuffix": "a.patch",
                "permission": "644",
                "replication": 1,
                "type": "FILE"
            }
        }"#;
        let response: FileStatusResponse = serde_json::from_str(payload).unwrap();
        let status = response.file_status;
        assert_eq!(status.path_suffix, "a.patch");
        assert_eq!(status.length, 24930);
        assert!(!status.is_dir());
    }

    #[test]
    fn remote_exception_envelope_decodes() {
        let payload = r#"{
            "RemoteException": {
                "exception": "FileNotFoundException",
                "javaClassName": "java.io.FileNotFoundException",
                "message": "File does not exist: /no/such"
            }
        }"#;
        let envelope: RemoteExceptionResponse = serde_json::from_str(payload).unwrap();
        let err = WebHdfsError::Remote {
            exception: envelope.remote_exception.exception,
            message: envelope.remote_exception.message,
        };
        assert!(err.is_not_found());
        assert_eq!(err.exception(), Some("FileNotFoundException"));
    }
}
