//! Error types for the cluster fixture
//!
//! Two layers:
//! - `StorageError` is what a storage service reports for a single operation
//! - `FixtureError` is what callers of the fixture see; every variant names the
//!   phase that failed (startup, import, traversal, processing, teardown)
//!
//! Service start/stop and compute job handlers use `anyhow::Result`; those errors
//! are boxed into the matching `FixtureError` variant so the chain is preserved.

use crate::storage::types::ClusterPath;
use std::path::PathBuf;
use thiserror::Error;

/// Boxed source error carried by fixture variants that wrap arbitrary failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used by the fixture API
pub type Result<T> = std::result::Result<T, FixtureError>;

/// Errors surfaced by the fixture to test code
#[derive(Error, Debug)]
pub enum FixtureError {
    /// A startup stage failed; the fixture is unusable and must be discarded
    #[error("Cluster startup failed during {stage}: {source}")]
    Startup {
        stage: &'static str,
        #[source]
        source: BoxError,
    },

    /// Traversal or processing was requested against a missing root
    #[error("Path does not exist: {path}")]
    PathNotFound { path: ClusterPath },

    /// Copying a file or creating a directory during seeding failed
    #[error("Failed to import '{}' into '{remote}': {source}", .local.display())]
    Import {
        local: PathBuf,
        remote: ClusterPath,
        #[source]
        source: StorageError,
    },

    /// A visitor, a line callback or a file read failed
    #[error("Processing failed at '{path}': {source}")]
    Processing {
        path: ClusterPath,
        #[source]
        source: BoxError,
    },

    /// Removing a generated artifact directory failed during stop
    #[error("Failed to remove artifact directory '{}': {source}", .path.display())]
    Teardown {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The storage service failed while listing or probing during traversal
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl FixtureError {
    pub(crate) fn startup(stage: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Startup {
            stage,
            source: source.into(),
        }
    }

    pub(crate) fn processing(path: &ClusterPath, source: impl Into<BoxError>) -> Self {
        Self::Processing {
            path: path.clone(),
            source: source.into(),
        }
    }

    /// Returns true if this is a missing-root error
    pub fn is_path_not_found(&self) -> bool {
        matches!(self, Self::PathNotFound { .. })
    }
}

/// Errors reported by a storage service for a single operation
#[derive(Error, Debug)]
pub enum StorageError {
    /// Path not found
    #[error("Path not found: '{path}'")]
    NotFound { path: ClusterPath },

    /// A directory operation targeted a file
    #[error("Not a directory: '{path}'")]
    NotADirectory { path: ClusterPath },

    /// A file operation targeted a directory
    #[error("Is a directory: '{path}'")]
    IsADirectory { path: ClusterPath },

    /// An ancestor of the target exists as a file
    #[error("Parent path '{parent}' is a file")]
    ParentIsFile { parent: ClusterPath },

    /// The service has been shut down
    #[error("Storage service is shut down")]
    Closed,

    /// I/O errors against the service's local block directory
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
