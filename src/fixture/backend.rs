//! Cluster backends.
//!
//! A backend knows how to bring up the storage service and the compute service
//! bound to it. `MiniClusterBackend` runs both in-process; tests substitute their
//! own backend to inject failures or slow shutdowns.

use crate::compute::registry::JobHandlerRegistry;
use crate::compute::tracker::{ComputeService, MiniJobTracker};
use crate::config::ClusterConfiguration;
use crate::storage::memory::MiniDfs;
use crate::storage::types::StorageService;

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Starts the services a `ClusterHandle` owns.
pub trait ClusterBackend: Send + Sync {
    fn start_storage(
        &self,
        configuration: &ClusterConfiguration,
        data_nodes: usize,
    ) -> Result<Arc<dyn StorageService>>;

    /// Starts the compute service bound to `storage`. Called from within the
    /// tokio runtime that drives `ClusterHandle::start`.
    fn start_compute(
        &self,
        storage: Arc<dyn StorageService>,
        configuration: &ClusterConfiguration,
        workers: usize,
    ) -> Result<Arc<dyn ComputeService>>;
}

/// In-process backend: a `MiniDfs` laid out under `base_dir` and a
/// `MiniJobTracker` running jobs from `handlers`.
///
/// `base_dir` has no default. The storage working tree lives at
/// `<base_dir>/build/...` and stop removes that build directory together with
/// `<base_dir>/logs`, so it must point at a disposable location.
pub struct MiniClusterBackend {
    base_dir: PathBuf,
    handlers: Arc<JobHandlerRegistry>,
}

impl MiniClusterBackend {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            handlers: JobHandlerRegistry::new(),
        }
    }

    pub fn with_handlers(mut self, handlers: Arc<JobHandlerRegistry>) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Registry consulted by the compute workers.
    pub fn handlers(&self) -> &Arc<JobHandlerRegistry> {
        &self.handlers
    }
}

impl ClusterBackend for MiniClusterBackend {
    fn start_storage(
        &self,
        configuration: &ClusterConfiguration,
        data_nodes: usize,
    ) -> Result<Arc<dyn StorageService>> {
        let dfs = MiniDfs::start(&self.base_dir, configuration, data_nodes)?;
        Ok(dfs)
    }

    fn start_compute(
        &self,
        storage: Arc<dyn StorageService>,
        _configuration: &ClusterConfiguration,
        workers: usize,
    ) -> Result<Arc<dyn ComputeService>> {
        let userlogs = self.base_dir.join("logs").join("userlogs");
        let tracker = MiniJobTracker::start(storage, self.handlers.clone(), workers, Some(userlogs))?;
        Ok(tracker)
    }
}
