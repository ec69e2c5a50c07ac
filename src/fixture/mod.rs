//! Cluster Fixture Module
//!
//! Provisions a disposable storage-and-compute cluster for a test, seeds it from
//! a local directory and tears it down within a fixed bound.
//!
//! ## Lifecycle
//! 1. **Start**: `ClusterHandle::start` brings up the services through a
//!    `ClusterBackend`, persists the merged configuration and imports the local root.
//! 2. **Use**: traversal and line processing over the seeded tree, job submission.
//! 3. **Stop**: `ClusterHandle::stop` runs the service teardown on its own thread,
//!    waits at most the configured bound, then purges the generated artifact
//!    directories regardless of how teardown went.
//!
//! ## Submodules
//! - **`backend`**: How services are started; `MiniClusterBackend` runs them in-process.
//! - **`artifacts`**: Discovery and removal of the directories a run leaves behind.
//! - **`shutdown`**: The cancellable teardown unit and the bounded-wait coordinator.
//! - **`lifecycle`**: `ClusterHandle` and `ClusterEndpoints`.

pub mod artifacts;
pub mod backend;
pub mod lifecycle;
pub mod shutdown;

pub use artifacts::GeneratedArtifacts;
pub use backend::{ClusterBackend, MiniClusterBackend};
pub use lifecycle::{ClusterEndpoints, ClusterHandle};
pub use shutdown::{
    PendingTeardown, ShutdownCoordinator, ShutdownReport, TeardownOutcome, TeardownSummary,
    TeardownUnit,
};
