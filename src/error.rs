use std::fmt::Display;
use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FsError>;

/// Error taxonomy shared by every backend adapter. Native client errors are
/// translated into these kinds at the adapter boundary; the original message
/// is preserved inside `Backend`.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file or directory: {path}")]
    NotFound { path: String },

    #[error("is a directory: {path}")]
    IsADirectory { path: String },

    #[error("already exists: {path}")]
    AlreadyExists { path: String },

    #[error("unknown scheme `{scheme}` in `{path}`")]
    UnknownScheme { scheme: String, path: String },

    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },

    /// End-of-stream signal raised by the line iterator of a read handle once
    /// it is exhausted.
    #[error("end of stream: {path}")]
    EndOfStream { path: String },

    #[error("{message}")]
    Backend { message: String },
}

impl FsError {
    pub fn not_found(path: impl Display) -> Self {
        FsError::NotFound {
            path: path.to_string(),
        }
    }

    pub fn is_a_directory(path: impl Display) -> Self {
        FsError::IsADirectory {
            path: path.to_string(),
        }
    }

    pub fn already_exists(path: impl Display) -> Self {
        FsError::AlreadyExists {
            path: path.to_string(),
        }
    }

    pub fn invalid_path(path: impl Display, reason: impl Into<String>) -> Self {
        FsError::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub fn end_of_stream(path: impl Display) -> Self {
        FsError::EndOfStream {
            path: path.to_string(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        FsError::Backend {
            message: message.into(),
        }
    }

    /// Map an `io::Error` raised for `path` into the taxonomy.
    pub(crate) fn from_io(err: io::Error, path: impl Display) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::not_found(path),
            io::ErrorKind::IsADirectory => Self::is_a_directory(path),
            io::ErrorKind::AlreadyExists => Self::already_exists(path),
            _ => Self::backend(format!("{path}: {err}")),
        }
    }

    /// A force removal suppresses these kinds for the affected entry and the
    /// batch continues.
    pub fn suppressed_by_force(&self) -> bool {
        matches!(self, FsError::NotFound { .. } | FsError::Backend { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound { .. })
    }
}
