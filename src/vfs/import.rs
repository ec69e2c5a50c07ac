//! Local tree import.
//!
//! Mirrors a local directory into the cluster under a remote root. Every
//! directory is created before any of its children is imported; children are
//! taken in file-name order. Existing remote files are overwritten.

use crate::error::{FixtureError, Result, StorageError};
use crate::storage::types::{ClusterPath, StorageService};

use std::path::{Path, PathBuf};

/// What an import created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    /// Qualified remote root.
    pub root: ClusterPath,
    pub directories: usize,
    pub files: usize,
    pub bytes: u64,
}

/// Copies the tree at `local_root` into `remote_root`.
///
/// A failure aborts whatever has not been imported yet; entries already
/// copied stay in place.
pub fn import_tree(
    storage: &dyn StorageService,
    local_root: &Path,
    remote_root: &ClusterPath,
) -> Result<ImportSummary> {
    let mut summary = ImportSummary {
        root: storage.qualify(remote_root),
        directories: 0,
        files: 0,
        bytes: 0,
    };

    let mut stack: Vec<(PathBuf, ClusterPath)> =
        vec![(local_root.to_path_buf(), remote_root.clone())];

    while let Some((local, remote)) = stack.pop() {
        let import_error = |source: StorageError| FixtureError::Import {
            local: local.clone(),
            remote: remote.clone(),
            source,
        };

        let metadata = std::fs::metadata(&local).map_err(|e| import_error(e.into()))?;

        if metadata.is_dir() {
            storage.mkdirs(&remote).map_err(import_error)?;
            let qualified = storage.qualify(&remote);
            tracing::debug!("Imported directory {} -> {}", local.display(), qualified);
            summary.directories += 1;

            let mut children = std::fs::read_dir(&local)
                .and_then(|entries| entries.collect::<std::io::Result<Vec<_>>>())
                .map_err(|e| import_error(e.into()))?;
            children.sort_by_key(|entry| entry.file_name());

            // Reversed so the first child is popped first.
            for child in children.into_iter().rev() {
                let name = child.file_name().to_string_lossy().into_owned();
                stack.push((child.path(), remote.join(name)));
            }
        } else {
            storage
                .copy_from_local(&local, &remote)
                .map_err(import_error)?;
            let qualified = storage.qualify(&remote);
            tracing::debug!(
                "Imported file {} -> {} ({} bytes)",
                local.display(),
                qualified,
                metadata.len()
            );
            summary.files += 1;
            summary.bytes += metadata.len();
        }
    }

    tracing::info!(
        "Imported {} into {} ({} directories, {} files, {} bytes)",
        local_root.display(),
        summary.root,
        summary.directories,
        summary.files,
        summary.bytes
    );

    Ok(summary)
}
