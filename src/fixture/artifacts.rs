//! Generated artifact directories.
//!
//! Running a cluster leaves three directories behind: the configured log
//! directory, the build directory the storage service works under, and the
//! project-level `logs` directory next to it. Stop removes all three.

use crate::error::{FixtureError, Result};

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Number of levels between the storage data directory and the build directory
/// (`<build>/test/data/dfs/data`).
const BUILD_DIR_DEPTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifacts {
    pub log_directory: PathBuf,
    pub build_directory: PathBuf,
    pub project_logs: PathBuf,
}

impl GeneratedArtifacts {
    /// Derives the artifact locations from the running storage service's data
    /// directory. Fails if the data directory is too shallow to have a build
    /// directory above it.
    pub fn discover(log_directory: &Path, data_directory: &Path) -> anyhow::Result<Self> {
        let build_directory = data_directory
            .ancestors()
            .nth(BUILD_DIR_DEPTH)
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No build directory {} levels above data directory {}",
                    BUILD_DIR_DEPTH,
                    data_directory.display()
                )
            })?
            .to_path_buf();

        let project_logs = build_directory
            .parent()
            .map(|project| project.join("logs"))
            .ok_or_else(|| {
                anyhow::anyhow!("Build directory {} has no parent", build_directory.display())
            })?;

        Ok(Self {
            log_directory: log_directory.to_path_buf(),
            build_directory,
            project_logs,
        })
    }

    pub fn directories(&self) -> [&Path; 3] {
        [
            self.log_directory.as_path(),
            self.build_directory.as_path(),
            self.project_logs.as_path(),
        ]
    }

    /// Removes every artifact directory. Missing directories are skipped.
    ///
    /// Every directory is attempted even if an earlier one fails; the first
    /// failure is returned. On success returns the directories actually removed.
    pub fn purge(&self) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        let mut first_error = None;

        for dir in self.directories() {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => {
                    tracing::debug!("Removed artifact directory {}", dir.display());
                    removed.push(dir.to_path_buf());
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::trace!("Artifact directory {} already gone", dir.display());
                }
                Err(e) => {
                    tracing::error!("Failed to remove artifact directory {}: {}", dir.display(), e);
                    first_error.get_or_insert(FixtureError::Teardown {
                        path: dir.to_path_buf(),
                        source: e,
                    });
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }
}
