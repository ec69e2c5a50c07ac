//! Script engine handle.
//!
//! The fixture builds one engine once the cluster is running and hands it to
//! callers unchanged; how scripts are executed is up to the engine's consumer.

use crate::config::{ClusterConfiguration, KEY_DEFAULT_FS, KEY_JOB_TRACKER};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Where scripts run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecMode {
    /// In the calling process, without the cluster.
    Local,
    /// Against the cluster's compute service.
    Cluster,
}

#[derive(Debug)]
pub struct ScriptEngine {
    mode: ExecMode,
    properties: BTreeMap<String, String>,
    shut_down: AtomicBool,
}

impl ScriptEngine {
    pub fn new(mode: ExecMode, configuration: &ClusterConfiguration) -> Self {
        tracing::debug!(
            "Script engine in {:?} mode (fs={:?}, tracker={:?})",
            mode,
            configuration.get(KEY_DEFAULT_FS),
            configuration.get(KEY_JOB_TRACKER)
        );
        Self {
            mode,
            properties: configuration.to_properties(),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) -> anyhow::Result<()> {
        if !self.shut_down.swap(true, Ordering::SeqCst) {
            tracing::info!("Script engine shut down");
        }
        Ok(())
    }
}
