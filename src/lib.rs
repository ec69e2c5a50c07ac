//! Ephemeral Cluster Test Fixture
//!
//! Gives test code a realistic, disposable storage-and-compute cluster and a
//! convenient way to seed and inspect its contents.
//!
//! ## Architecture Modules
//!
//! - **`fixture`**: Cluster lifecycle. Starts the services, persists the merged
//!   configuration, seeds the storage from a local tree and stops everything within
//!   a fixed time bound, purging generated artifact directories.
//! - **`vfs`**: Import of local trees and filtered traversal / line processing over
//!   the cluster filesystem. Names starting with `_` are hidden from every traversal.
//! - **`storage`**: The `StorageService` contract and the in-process `MiniDfs`.
//! - **`compute`**: The `ComputeService` contract and the in-process `MiniJobTracker`
//!   running registered job handlers against the storage service.
//! - **`script`**: The script engine handle built once the cluster is up.
//! - **`config`**: Fixture settings and the persisted cluster configuration.
//! - **`error`**: `FixtureError` and `StorageError`.

pub mod compute;
pub mod config;
pub mod error;
pub mod fixture;
pub mod script;
pub mod storage;
pub mod vfs;

pub use config::{ClusterConfiguration, FixtureConfig};
pub use error::{FixtureError, StorageError};
pub use fixture::{ClusterBackend, ClusterEndpoints, ClusterHandle, MiniClusterBackend};
pub use storage::types::{ClusterPath, FileStatus, StorageService};
