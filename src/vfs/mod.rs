//! Virtual Filesystem Operations
//!
//! Seeding and inspecting the cluster's storage from test code.
//!
//! ## Submodules
//! - **`filter`**: The hidden-path rule shared by every traversal.
//! - **`import`**: Mirrors a local directory tree into the cluster.
//! - **`visit`**: Shallow and depth-first traversal with per-path visitors.
//! - **`lines`**: Line-by-line processing of the files a traversal delivers.
//!
//! Visitors and line callbacks return `ControlFlow`: `Continue(())` keeps going,
//! `Break(())` stops the traversal early without an error. Both traversals walk
//! with an explicit stack, so tree depth is not bounded by the call stack.

pub mod filter;
pub mod import;
pub mod lines;
pub mod visit;

pub use filter::{RESERVED_PREFIX, is_hidden};
pub use import::{ImportSummary, import_tree};
pub use lines::{process_data, process_data_recursive};
pub use visit::{process_paths, process_paths_recursive};

#[cfg(test)]
mod tests;
