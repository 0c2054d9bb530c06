//! Path resolution: a path string becomes `(scheme, authority, key_or_path)`.
//!
//! Strings without a scheme prefix resolve to the local backend. The object
//! store accepts two spellings (`s3://`, `s3n://`) that are treated
//! identically; the first path segment is the bucket and the remainder is the
//! object key.

use std::fmt;
use std::path::Path as StdPath;
use std::str::FromStr;

use crate::error::{FsError, Result};

/// Closed set of recognized backends; scheme-to-adapter mapping is an
/// enumerated lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Local,
    Cluster,
    ObjectStore,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Local => "file",
            Scheme::Cluster => "hdfs",
            Scheme::ObjectStore => "s3",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed form of a path string.
///
/// * local: `authority` is empty, `path` is the POSIX path as given
/// * cluster: `authority` is the optional `host:port` namespace, `path` is absolute
/// * object store: `authority` is the bucket, `path` is the key with no
///   leading slash and no empty segments (empty key addresses the bucket root)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FsPath {
    scheme: Scheme,
    authority: String,
    path: String,
}

impl FsPath {
    pub fn parse(input: &str) -> Result<FsPath> {
        if input.is_empty() {
            return Err(FsError::invalid_path(input, "empty path"));
        }

        let Some((scheme, rest)) = input.split_once("://") else {
            return Ok(FsPath {
                scheme: Scheme::Local,
                authority: String::new(),
                path: normalize_posix(input),
            });
        };

        match scheme {
            "file" => {
                // Authority is ignored for the local backend.
                let path = match rest.find('/') {
                    Some(idx) => &rest[idx..],
                    None => "/",
                };
                Ok(FsPath {
                    scheme: Scheme::Local,
                    authority: String::new(),
                    path: normalize_posix(path),
                })
            }
            "hdfs" => {
                let (authority, path) = if let Some(stripped) = rest.strip_prefix('/') {
                    (String::new(), format!("/{stripped}"))
                } else {
                    match rest.split_once('/') {
                        Some((host, tail)) => (host.to_string(), format!("/{tail}")),
                        None => (rest.to_string(), "/".to_string()),
                    }
                };
                Ok(FsPath {
                    scheme: Scheme::Cluster,
                    authority,
                    path: normalize_posix(&path),
                })
            }
            "s3" | "s3n" => {
                if rest.is_empty() || rest.starts_with('/') {
                    return Err(FsError::invalid_path(input, "empty bucket name"));
                }
                let mut segments = rest.split('/').filter(|s| !s.is_empty());
                let bucket = match segments.next() {
                    Some(b) => b.to_string(),
                    None => return Err(FsError::invalid_path(input, "empty bucket name")),
                };
                let key = segments.collect::<Vec<_>>().join("/");
                Ok(FsPath {
                    scheme: Scheme::ObjectStore,
                    authority: bucket,
                    path: key,
                })
            }
            other => Err(FsError::UnknownScheme {
                scheme: other.to_string(),
                path: input.to_string(),
            }),
        }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// The hierarchical path (local/cluster) or the object key (object store).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_local(&self) -> bool {
        self.scheme == Scheme::Local
    }

    /// Object-store path with an empty key, addressing the bucket itself.
    pub fn is_bucket_root(&self) -> bool {
        self.scheme == Scheme::ObjectStore && self.path.is_empty()
    }

    /// View of a local path suitable for `tokio::fs` calls.
    pub fn local_path(&self) -> &StdPath {
        StdPath::new(&self.path)
    }

    /// Append one or more `/`-separated components.
    pub fn join(&self, name: &str) -> FsPath {
        let name = name.trim_matches('/');
        let path = if self.path.is_empty() {
            name.to_string()
        } else if self.path.ends_with('/') {
            format!("{}{}", self.path, name)
        } else {
            format!("{}/{}", self.path, name)
        };
        FsPath {
            scheme: self.scheme,
            authority: self.authority.clone(),
            path,
        }
    }

    /// Containing path, if any. The parent of a single-segment object key is
    /// the bucket root; the bucket root and a filesystem root have no parent.
    pub fn parent(&self) -> Option<FsPath> {
        if self.scheme == Scheme::ObjectStore {
            if self.path.is_empty() {
                return None;
            }
            let parent_key = match self.path.rsplit_once('/') {
                Some((head, _)) => head.to_string(),
                None => String::new(),
            };
            return Some(FsPath {
                scheme: self.scheme,
                authority: self.authority.clone(),
                path: parent_key,
            });
        }
        if self.path == "/" {
            return None;
        }
        match self.path.rsplit_once('/') {
            Some(("", _)) => Some(FsPath {
                scheme: self.scheme,
                authority: self.authority.clone(),
                path: "/".to_string(),
            }),
            Some((head, _)) => Some(FsPath {
                scheme: self.scheme,
                authority: self.authority.clone(),
                path: head.to_string(),
            }),
            None => None,
        }
    }

    /// Final path component, if the path has one.
    pub fn file_name(&self) -> Option<&str> {
        self.path.rsplit('/').find(|s| !s.is_empty())
    }

    pub(crate) fn with_path(&self, path: impl Into<String>) -> FsPath {
        FsPath {
            scheme: self.scheme,
            authority: self.authority.clone(),
            path: path.into(),
        }
    }
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            Scheme::Local => f.write_str(&self.path),
            Scheme::Cluster => write!(f, "hdfs://{}{}", self.authority, self.path),
            Scheme::ObjectStore => {
                if self.path.is_empty() {
                    write!(f, "s3://{}", self.authority)
                } else {
                    write!(f, "s3://{}/{}", self.authority, self.path)
                }
            }
        }
    }
}

impl FromStr for FsPath {
    type Err = FsError;

    fn from_str(s: &str) -> Result<FsPath> {
        FsPath::parse(s)
    }
}

/// Trim trailing slashes (keeping a bare root) so `d/` and `d` address the
/// same entry.
fn normalize_posix(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_path_defaults_to_local() {
        let p = FsPath::parse("/tmp/test_dir").unwrap();
        assert_eq!(p.scheme(), Scheme::Local);
        assert_eq!(p.authority(), "");
        assert_eq!(p.path(), "/tmp/test_dir");

        let rel = FsPath::parse("spec/tmp/file.txt").unwrap();
        assert_eq!(rel.scheme(), Scheme::Local);
        assert_eq!(rel.path(), "spec/tmp/file.txt");
    }

    #[test]
    fn file_scheme_is_local_and_drops_authority() {
        let p = FsPath::parse("file:///var/data").unwrap();
        assert_eq!(p.scheme(), Scheme::Local);
        assert_eq!(p.path(), "/var/data");

        let with_host = FsPath::parse("file://ignored/var/data").unwrap();
        assert_eq!(with_host.path(), "/var/data");
    }

    #[test]
    fn hdfs_paths_split_optional_authority() {
        let p = FsPath::parse("hdfs://namenode:9870/tmp/x").unwrap();
        assert_eq!(p.scheme(), Scheme::Cluster);
        assert_eq!(p.authority(), "namenode:9870");
        assert_eq!(p.path(), "/tmp/x");

        let bare = FsPath::parse("hdfs:///tmp/x").unwrap();
        assert_eq!(bare.authority(), "");
        assert_eq!(bare.path(), "/tmp/x");
    }

    #[test]
    fn object_store_spellings_are_identical() {
        for raw in ["s3://bucket/a/b.txt", "s3n://bucket/a/b.txt"] {
            let p = FsPath::parse(raw).unwrap();
            assert_eq!(p.scheme(), Scheme::ObjectStore);
            assert_eq!(p.authority(), "bucket");
            assert_eq!(p.path(), "a/b.txt");
            assert_eq!(p.to_string(), "s3://bucket/a/b.txt");
        }
    }

    #[test]
    fn object_store_squeezes_empty_segments() {
        let p = FsPath::parse("s3://bucket//a///b/").unwrap();
        assert_eq!(p.path(), "a/b");
    }

    #[test]
    fn bucket_root_has_empty_key() {
        for raw in ["s3://bucket", "s3://bucket/"] {
            let p = FsPath::parse(raw).unwrap();
            assert!(p.is_bucket_root());
            assert_eq!(p.to_string(), "s3://bucket");
        }
    }

    #[test]
    fn empty_bucket_is_invalid() {
        assert!(matches!(
            FsPath::parse("s3:///key"),
            Err(FsError::InvalidPath { .. })
        ));
        assert!(matches!(
            FsPath::parse("s3://"),
            Err(FsError::InvalidPath { .. })
        ));
        assert!(matches!(
            FsPath::parse(""),
            Err(FsError::InvalidPath { .. })
        ));
    }

    #[test]
    fn unrecognized_scheme_is_rejected() {
        match FsPath::parse("gopher://hole/f") {
            Err(FsError::UnknownScheme { scheme, .. }) => assert_eq!(scheme, "gopher"),
            other => panic!("expected UnknownScheme, got {other:?}"),
        }
    }

    #[test]
    fn display_round_trips() {
        for raw in ["/tmp/a", "hdfs://nn:9870/a/b", "s3://b/k1/k2", "s3://b"] {
            let p = FsPath::parse(raw).unwrap();
            assert_eq!(FsPath::parse(&p.to_string()).unwrap(), p);
        }
    }

    #[test]
    fn join_and_parent_are_inverse_enough() {
        let dir = FsPath::parse("s3://b/d").unwrap();
        let child = dir.join("c.txt");
        assert_eq!(child.path(), "d/c.txt");
        assert_eq!(child.parent().unwrap(), dir);
        assert_eq!(child.file_name(), Some("c.txt"));

        let root_child = FsPath::parse("s3://b/top").unwrap();
        assert!(root_child.parent().unwrap().is_bucket_root());

        let local = FsPath::parse("/a").unwrap();
        assert_eq!(local.parent().unwrap().path(), "/");
        assert_eq!(FsPath::parse("/").unwrap().parent(), None);
    }

    #[test]
    fn trailing_slash_is_normalized() {
        assert_eq!(FsPath::parse("d/").unwrap().path(), "d");
        assert_eq!(FsPath::parse("hdfs:///tmp/d/").unwrap().path(), "/tmp/d");
    }
}
