//! Configuration types for the cluster fixture
//!
//! This module defines:
//! - `FixtureConfig`: what test code supplies up front (import root, artifact and
//!   configuration locations, cluster sizing, teardown bound, overrides)
//! - `ClusterConfiguration`: the key/value configuration the running cluster is
//!   described by, persisted for out-of-process tooling

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Address of the storage service's name endpoint
pub const KEY_DEFAULT_FS: &str = "fs.default.name";
/// Address of the compute service's job tracker
pub const KEY_JOB_TRACKER: &str = "mapred.job.tracker";
/// Replication factor used for submitted job files
pub const KEY_SUBMIT_REPLICATION: &str = "mapred.submit.replication";
pub const KEY_DATANODE_ADDRESS: &str = "dfs.datanode.address";
pub const KEY_DATANODE_HTTP_ADDRESS: &str = "dfs.datanode.http.address";
/// Directory the services write their logs to
pub const KEY_LOG_DIR: &str = "hadoop.log.dir";
/// User whose home directory is the storage working directory
pub const KEY_USER_NAME: &str = "user.name";

/// Bind address that lets the OS pick a free port
pub const EPHEMERAL_BIND_ADDRESS: &str = "0.0.0.0:0";

pub const DEFAULT_LOG_DIRECTORY: &str = "/tmp/ephemeral-cluster/logs";
pub const DEFAULT_CONFIG_PATH: &str = "/tmp/ephemeral-cluster-site.json";
pub const DEFAULT_DATA_NODES: usize = 2;
pub const DEFAULT_TASK_TRACKERS: usize = 2;
pub const DEFAULT_TEARDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the fixture needs before `start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureConfig {
    /// Local directory mirrored into the cluster on start
    pub local_root: PathBuf,

    /// Directory the services log to; purged on stop
    pub log_directory: PathBuf,

    /// Where the merged cluster configuration is written
    pub config_path: PathBuf,

    pub data_nodes: usize,

    /// Worker count of the compute service
    pub task_trackers: usize,

    /// Upper bound on waiting for cluster teardown during stop
    pub teardown_timeout: Duration,

    /// Caller overrides; applied last so they win over derived values
    pub overrides: BTreeMap<String, String>,
}

impl FixtureConfig {
    pub fn new(local_root: impl Into<PathBuf>) -> Self {
        Self {
            local_root: local_root.into(),
            log_directory: PathBuf::from(DEFAULT_LOG_DIRECTORY),
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            data_nodes: DEFAULT_DATA_NODES,
            task_trackers: DEFAULT_TASK_TRACKERS,
            teardown_timeout: DEFAULT_TEARDOWN_TIMEOUT,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_log_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_directory = dir.into();
        self
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    pub fn with_data_nodes(mut self, count: usize) -> Self {
        self.data_nodes = count;
        self
    }

    pub fn with_task_trackers(mut self, count: usize) -> Self {
        self.task_trackers = count;
        self
    }

    pub fn with_teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout = timeout;
        self
    }

    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// Configuration handed to the services when they start: the caller's
    /// overrides plus the log directory.
    pub fn start_configuration(&self) -> ClusterConfiguration {
        let mut conf = ClusterConfiguration::new();
        conf.set(KEY_LOG_DIR, self.log_directory.to_string_lossy());
        conf.merge(&self.overrides);
        conf
    }
}

/// Key/value description of a running cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfiguration {
    entries: BTreeMap<String, String>,
}

impl ClusterConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|value| value.trim().parse().ok())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Copies every entry of `overrides` in, replacing existing keys.
    pub fn merge<'a, I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (key, value) in overrides {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flattened copy of the entries, for consumers that take plain properties.
    pub fn to_properties(&self) -> BTreeMap<String, String> {
        self.entries.clone()
    }

    /// Writes the configuration as pretty JSON, creating the parent directory.
    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::debug!("Wrote {} configuration entries to {}", self.len(), path.display());
        Ok(())
    }

    pub fn read_from(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl<'a> IntoIterator for &'a ClusterConfiguration {
    type Item = (&'a String, &'a String);
    type IntoIter = std::collections::btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
