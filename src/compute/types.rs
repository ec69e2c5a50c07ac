use crate::storage::types::StorageService;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Unique identifier for a job submitted to the compute service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

impl JobId {
    /// Generates a new random UUID v4-based JobId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle state of a job in the tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    /// Submitted but not yet picked up by any worker.
    Pending,
    /// A worker is executing it.
    Running,
    Completed,
    /// The handler returned an `Err`, or no handler was registered under its name.
    Failed { error: String },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed { .. })
    }
}

/// A unit of work: which registered handler to run, and its input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub handler: String,
    pub payload: serde_json::Value,
}

impl Job {
    pub fn new(handler: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            handler: handler.into(),
            payload,
        }
    }
}

/// The tracker's record of a submitted job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEntry {
    pub job: Job,
    pub status: JobStatus,
    /// Index of the worker running (or that ran) the job.
    pub assigned_to: Option<usize>,
    /// Timestamp (ms) when the job was submitted.
    pub created_at: u64,
}

/// What a handler receives when its job runs.
#[derive(Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub payload: serde_json::Value,
    /// The storage service the compute service is bound to.
    pub storage: Arc<dyn StorageService>,
}

/// Helper to get the current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
