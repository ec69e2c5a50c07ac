//! Path traversal.
//!
//! `process_paths` hands every visible immediate child of a root to the visitor;
//! `process_paths_recursive` walks depth-first in listing order and hands over
//! every visible file. A hidden directory is never expanded, so nothing below
//! it is delivered.

use super::filter::is_hidden;
use crate::error::{FixtureError, Result};
use crate::storage::types::{ClusterPath, FileStatus, StorageService};

use std::ops::ControlFlow;

fn ensure_exists(storage: &dyn StorageService, root: &ClusterPath) -> Result<()> {
    if storage.exists(root)? {
        Ok(())
    } else {
        Err(FixtureError::PathNotFound { path: root.clone() })
    }
}

/// Shallow walk shared by the path and line entry points.
pub(crate) fn walk_children<F>(
    storage: &dyn StorageService,
    root: &ClusterPath,
    mut on_entry: F,
) -> Result<ControlFlow<()>>
where
    F: FnMut(&FileStatus) -> Result<ControlFlow<()>>,
{
    ensure_exists(storage, root)?;

    for child in storage.list_children(root)? {
        if is_hidden(&child.path) {
            tracing::trace!("Skipping hidden path {}", child.path);
            continue;
        }
        if on_entry(&child)?.is_break() {
            return Ok(ControlFlow::Break(()));
        }
    }

    Ok(ControlFlow::Continue(()))
}

/// Depth-first walk shared by the path and line entry points.
pub(crate) fn walk_tree<F>(
    storage: &dyn StorageService,
    root: &ClusterPath,
    mut on_file: F,
) -> Result<ControlFlow<()>>
where
    F: FnMut(&FileStatus) -> Result<ControlFlow<()>>,
{
    ensure_exists(storage, root)?;

    let mut stack = if storage.is_file(root)? {
        // Listing a file yields the file itself.
        storage.list_children(root)?
    } else {
        vec![FileStatus {
            path: storage.qualify(root),
            is_dir: true,
            len: 0,
        }]
    };
    stack.retain(|entry| entry.is_dir || !is_hidden(&entry.path));

    while let Some(entry) = stack.pop() {
        if !entry.is_dir {
            if on_file(&entry)?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
            continue;
        }

        let children = storage.list_children(&entry.path)?;
        // Reversed so the first listed child is popped first.
        stack.extend(
            children
                .into_iter()
                .rev()
                .filter(|child| !is_hidden(&child.path)),
        );
    }

    Ok(ControlFlow::Continue(()))
}

/// Invokes `visitor` once per visible immediate child of `root`, in listing order.
///
/// Subdirectories are delivered but not expanded. Returns `Break` if the visitor
/// stopped the walk.
///
/// # Errors
/// * `PathNotFound` if `root` does not exist; the visitor is not called.
/// * `Processing` if the visitor fails.
pub fn process_paths<F>(
    storage: &dyn StorageService,
    root: &ClusterPath,
    mut visitor: F,
) -> Result<ControlFlow<()>>
where
    F: FnMut(&FileStatus) -> anyhow::Result<ControlFlow<()>>,
{
    walk_children(storage, root, |entry| {
        visitor(entry).map_err(|e| FixtureError::processing(&entry.path, e))
    })
}

/// Invokes `visitor` once per visible file at or below `root`, depth-first in
/// listing order. A file `root` is delivered itself unless its name is hidden.
///
/// # Errors
/// * `PathNotFound` if `root` does not exist; the visitor is not called.
/// * `Processing` if the visitor fails.
pub fn process_paths_recursive<F>(
    storage: &dyn StorageService,
    root: &ClusterPath,
    mut visitor: F,
) -> Result<ControlFlow<()>>
where
    F: FnMut(&FileStatus) -> anyhow::Result<ControlFlow<()>>,
{
    walk_tree(storage, root, |entry| {
        visitor(entry).map_err(|e| FixtureError::processing(&entry.path, e))
    })
}
