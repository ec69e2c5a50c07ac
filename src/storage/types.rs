//! Storage Data Types
//!
//! Defines the path type used inside the cluster's filesystem, the listing entry,
//! and the `StorageService` contract every storage backend implements.

use crate::error::StorageError;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

pub const SEPARATOR: char = '/';

/// A path inside the cluster's filesystem.
///
/// Always normalized: no empty segments and no trailing separator. Relative paths
/// are allowed and are resolved by the storage service against its working
/// directory (see `StorageService::qualify`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterPath(String);

impl ClusterPath {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref();
        let joined = raw
            .split(SEPARATOR)
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect::<Vec<_>>()
            .join("/");

        if raw.starts_with(SEPARATOR) {
            Self(format!("/{}", joined))
        } else {
            Self(joined)
        }
    }

    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_absolute(&self) -> bool {
        self.0.starts_with(SEPARATOR)
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Final path segment; empty for the root and for the empty relative path.
    pub fn name(&self) -> &str {
        self.0.rsplit(SEPARATOR).next().unwrap_or("")
    }

    pub fn parent(&self) -> Option<ClusterPath> {
        if self.is_root() || self.0.is_empty() {
            return None;
        }
        match self.0.rfind(SEPARATOR) {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self(String::new())),
        }
    }

    /// Appends `child` below this path. A leading separator on `child` does not
    /// make it absolute: the result always stays under `self`.
    pub fn join(&self, child: impl AsRef<str>) -> ClusterPath {
        let child = Self::new(child.as_ref().trim_start_matches(SEPARATOR));
        if child.0.is_empty() {
            return self.clone();
        }
        if self.0.is_empty() {
            child
        } else if self.is_root() {
            Self(format!("/{}", child.0))
        } else {
            Self(format!("{}/{}", self.0, child.0))
        }
    }

    /// Appends every component of a relative local path.
    pub fn join_local(&self, relative: &Path) -> ClusterPath {
        relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .fold(self.clone(), |acc, segment| acc.join(segment))
    }

    /// True if `self` equals `ancestor` or lies below it.
    pub fn starts_with(&self, ancestor: &ClusterPath) -> bool {
        if ancestor.is_root() {
            return self.is_absolute();
        }
        self == ancestor
            || self
                .0
                .strip_prefix(ancestor.as_str())
                .is_some_and(|rest| rest.starts_with(SEPARATOR))
    }
}

impl fmt::Display for ClusterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClusterPath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// One entry returned by `StorageService::list_children`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatus {
    pub path: ClusterPath,
    pub is_dir: bool,
    /// Length in bytes; zero for directories.
    pub len: u64,
}

/// Contract of the storage service backing the cluster.
///
/// Paths may be relative; implementations resolve them against their working
/// directory. Listings are returned in the service's listing order, which callers
/// treat as authoritative.
pub trait StorageService: Send + Sync {
    /// Address of the service's name endpoint, e.g. `dfs://127.0.0.1:40123`.
    fn uri(&self) -> String;

    /// Local directory where the service keeps its data blocks.
    fn data_directory(&self) -> PathBuf;

    fn exists(&self, path: &ClusterPath) -> Result<bool, StorageError>;

    fn is_file(&self, path: &ClusterPath) -> Result<bool, StorageError>;

    /// Immediate children of a directory, in listing order. Listing a file
    /// returns that file's own status.
    fn list_children(&self, path: &ClusterPath) -> Result<Vec<FileStatus>, StorageError>;

    /// Creates the directory and any missing ancestors. Existing directories are not an error.
    fn mkdirs(&self, path: &ClusterPath) -> Result<(), StorageError>;

    /// Copies a local file into the cluster, overwriting any existing file.
    fn copy_from_local(&self, local: &Path, remote: &ClusterPath) -> Result<(), StorageError>;

    /// Writes `data` to `path`, creating ancestors and overwriting any existing file.
    fn create(&self, path: &ClusterPath, data: &[u8]) -> Result<(), StorageError>;

    fn open(&self, path: &ClusterPath) -> Result<Box<dyn Read + Send>, StorageError>;

    /// Canonical absolute form of `path`.
    fn qualify(&self, path: &ClusterPath) -> ClusterPath;

    fn shutdown(&self) -> anyhow::Result<()>;
}
