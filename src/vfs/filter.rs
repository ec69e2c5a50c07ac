use crate::storage::types::ClusterPath;

/// Leaf-name prefix marking framework-internal paths (job output markers,
/// logs, temporary directories).
pub const RESERVED_PREFIX: char = '_';

/// True if the final segment of `path` starts with the reserved prefix.
/// Only the leaf is examined: `/_tmp/data.txt` is not hidden, `/data/_SUCCESS` is.
pub fn is_hidden(path: &ClusterPath) -> bool {
    path.name().starts_with(RESERVED_PREFIX)
}
