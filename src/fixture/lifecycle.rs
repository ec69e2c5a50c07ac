//! Cluster lifecycle.
//!
//! `ClusterHandle::start` brings the services up, derives and persists the
//! cluster configuration, builds the script engine, discovers the generated
//! artifact directories and seeds the storage service from the local root.
//! `ClusterHandle::stop` consumes the handle, so a stopped cluster cannot be
//! used or stopped again.
//!
//! ## Startup stages
//! Each stage failing aborts startup with `FixtureError::Startup` naming it:
//! `storage`, `compute`, `configuration`, `artifacts`, `import`. Services that
//! already started are not torn down.

use super::artifacts::GeneratedArtifacts;
use super::backend::ClusterBackend;
use super::shutdown::{ShutdownCoordinator, ShutdownReport, TeardownUnit};
use crate::compute::tracker::{ComputeService, wait_for_job};
use crate::compute::types::{Job, JobId, JobStatus};
use crate::config::*;
use crate::error::{FixtureError, Result};
use crate::script::{ExecMode, ScriptEngine};
use crate::storage::types::{ClusterPath, FileStatus, StorageService};
use crate::vfs::{self, ImportSummary};

use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const ENV_COMPUTE_ADDRESS: &str = "CLUSTER_COMPUTE_ADDRESS";
pub const ENV_STORAGE_ADDRESS: &str = "CLUSTER_STORAGE_ADDRESS";
pub const ENV_CONFIG_PATH: &str = "CLUSTER_CONFIG_PATH";

/// Where out-of-process tooling finds the running cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEndpoints {
    /// Storage service URI, e.g. `dfs://127.0.0.1:40123`.
    pub storage_address: String,
    pub compute_address: String,
    /// The persisted cluster configuration.
    pub config_path: PathBuf,
}

impl ClusterEndpoints {
    /// Key/value pairs for a child process environment.
    pub fn as_env(&self) -> Vec<(&'static str, String)> {
        vec![
            (ENV_COMPUTE_ADDRESS, self.compute_address.clone()),
            (ENV_STORAGE_ADDRESS, self.storage_address.clone()),
            (ENV_CONFIG_PATH, self.config_path.to_string_lossy().into_owned()),
        ]
    }
}

/// A running cluster seeded from `FixtureConfig::local_root`.
pub struct ClusterHandle {
    config: FixtureConfig,
    storage: Arc<dyn StorageService>,
    compute: Arc<dyn ComputeService>,
    configuration: ClusterConfiguration,
    endpoints: ClusterEndpoints,
    script_engine: Arc<ScriptEngine>,
    artifacts: GeneratedArtifacts,
    import: ImportSummary,
}

impl ClusterHandle {
    pub async fn start(config: FixtureConfig, backend: &dyn ClusterBackend) -> Result<Self> {
        let started = Instant::now();
        tracing::info!(
            "Starting cluster ({} data nodes, {} task trackers) for {}",
            config.data_nodes,
            config.task_trackers,
            config.local_root.display()
        );

        let remote_root = config
            .local_root
            .file_name()
            .map(|name| ClusterPath::new(&name.to_string_lossy()))
            .ok_or_else(|| {
                FixtureError::startup(
                    "import",
                    format!("import root {} has no final segment", config.local_root.display()),
                )
            })?;

        let start_configuration = config.start_configuration();

        let storage = backend
            .start_storage(&start_configuration, config.data_nodes)
            .map_err(|e| FixtureError::startup("storage", e))?;
        tracing::info!("Storage service up at {}", storage.uri());

        let compute = backend
            .start_compute(storage.clone(), &start_configuration, config.task_trackers)
            .map_err(|e| FixtureError::startup("compute", e))?;
        tracing::info!(
            "Compute service up at {} with {} workers",
            compute.address(),
            compute.worker_count()
        );

        let configuration = Self::derive_configuration(&config, storage.as_ref(), compute.as_ref());
        configuration
            .write_to(&config.config_path)
            .map_err(|e| FixtureError::startup("configuration", e))?;
        tracing::info!(
            "Cluster configuration ({} entries) written to {}",
            configuration.len(),
            config.config_path.display()
        );

        let endpoints = ClusterEndpoints {
            storage_address: storage.uri(),
            compute_address: compute.address(),
            config_path: config.config_path.clone(),
        };

        let script_engine = Arc::new(ScriptEngine::new(ExecMode::Cluster, &configuration));

        let artifacts = GeneratedArtifacts::discover(&config.log_directory, &storage.data_directory())
            .map_err(|e| FixtureError::startup("artifacts", e))?;
        tracing::debug!("Generated artifacts: {:?}", artifacts);

        let import = vfs::import_tree(storage.as_ref(), &config.local_root, &remote_root)
            .map_err(|e| FixtureError::startup("import", e))?;

        tracing::info!(
            "Cluster ready in {:?}, seeded {} ({} files)",
            started.elapsed(),
            import.root,
            import.files
        );

        Ok(Self {
            config,
            storage,
            compute,
            configuration,
            endpoints,
            script_engine,
            artifacts,
            import,
        })
    }

    /// Derived values, then the fixed overrides, then the caller's overrides.
    fn derive_configuration(
        config: &FixtureConfig,
        storage: &dyn StorageService,
        compute: &dyn ComputeService,
    ) -> ClusterConfiguration {
        let mut configuration = ClusterConfiguration::new();
        configuration.set(KEY_DEFAULT_FS, storage.uri());
        configuration.set(KEY_JOB_TRACKER, compute.address());
        configuration.set(KEY_LOG_DIR, config.log_directory.to_string_lossy());

        configuration.set(KEY_SUBMIT_REPLICATION, "1");
        configuration.set(KEY_DATANODE_ADDRESS, EPHEMERAL_BIND_ADDRESS);
        configuration.set(KEY_DATANODE_HTTP_ADDRESS, EPHEMERAL_BIND_ADDRESS);

        configuration.merge(&config.overrides);
        configuration
    }

    pub fn config(&self) -> &FixtureConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn StorageService> {
        &self.storage
    }

    pub fn compute(&self) -> &Arc<dyn ComputeService> {
        &self.compute
    }

    pub fn configuration(&self) -> &ClusterConfiguration {
        &self.configuration
    }

    pub fn endpoints(&self) -> &ClusterEndpoints {
        &self.endpoints
    }

    pub fn script_engine(&self) -> &Arc<ScriptEngine> {
        &self.script_engine
    }

    pub fn artifacts(&self) -> &GeneratedArtifacts {
        &self.artifacts
    }

    /// Qualified remote root the local root was imported into.
    pub fn remote_root(&self) -> &ClusterPath {
        &self.import.root
    }

    /// `relative` resolved under the remote root.
    pub fn remote_path(&self, relative: &str) -> ClusterPath {
        self.import.root.join(relative)
    }

    pub fn import_summary(&self) -> &ImportSummary {
        &self.import
    }

    pub fn process_paths<F>(&self, root: &ClusterPath, visitor: F) -> Result<ControlFlow<()>>
    where
        F: FnMut(&FileStatus) -> anyhow::Result<ControlFlow<()>>,
    {
        vfs::process_paths(self.storage.as_ref(), root, visitor)
    }

    pub fn process_paths_recursive<F>(&self, root: &ClusterPath, visitor: F) -> Result<ControlFlow<()>>
    where
        F: FnMut(&FileStatus) -> anyhow::Result<ControlFlow<()>>,
    {
        vfs::process_paths_recursive(self.storage.as_ref(), root, visitor)
    }

    pub fn process_data<F>(&self, root: &ClusterPath, on_line: F) -> Result<ControlFlow<()>>
    where
        F: FnMut(&str) -> anyhow::Result<ControlFlow<()>>,
    {
        vfs::process_data(self.storage.as_ref(), root, on_line)
    }

    pub fn process_data_recursive<F>(&self, root: &ClusterPath, on_line: F) -> Result<ControlFlow<()>>
    where
        F: FnMut(&str) -> anyhow::Result<ControlFlow<()>>,
    {
        vfs::process_data_recursive(self.storage.as_ref(), root, on_line)
    }

    pub fn submit(&self, job: Job) -> anyhow::Result<JobId> {
        self.compute.submit(job)
    }

    /// Polls the compute service until `job_id` finishes or `timeout` elapses.
    pub async fn wait_for_job(&self, job_id: &JobId, timeout: Duration) -> anyhow::Result<JobStatus> {
        wait_for_job(self.compute.as_ref(), job_id, timeout).await
    }

    /// Tears the cluster down within `FixtureConfig::teardown_timeout` and
    /// removes the generated artifact directories.
    ///
    /// Teardown runs script engine, compute, then storage. Its failures and a
    /// missed bound are reported in the `ShutdownReport`, not returned.
    ///
    /// # Errors
    /// * `Teardown` if an artifact directory could not be removed.
    pub async fn stop(self) -> Result<ShutdownReport> {
        let Self {
            config,
            storage,
            compute,
            script_engine,
            artifacts,
            ..
        } = self;

        let unit = TeardownUnit::new()
            .step("script-engine", move || script_engine.shutdown())
            .step("compute", move || compute.shutdown())
            .step("storage", move || storage.shutdown());

        ShutdownCoordinator::new(config.teardown_timeout)
            .shutdown(unit, &artifacts)
            .await
    }
}
