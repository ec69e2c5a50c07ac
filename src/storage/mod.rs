//! Cluster Storage Module
//!
//! The filesystem the fixture seeds and traverses.
//!
//! ## Core Concepts
//! - **Paths**: `ClusterPath` is a normalized `/`-separated path; relative paths are
//!   resolved against the service's working directory (`/user/<name>`).
//! - **Contract**: `StorageService` is the seam every storage backend implements.
//! - **In-process backend**: `MiniDfs` keeps the namespace in memory and file
//!   contents as block files spread over its data nodes' directories.

pub mod memory;
pub mod types;
