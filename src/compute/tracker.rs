//! Job Tracker Implementation
//!
//! Single-node compute service bound to a storage service. Jobs go into a local
//! table; a fixed pool of workers polls it for `Pending` jobs.
//!
//! ## Responsibilities
//! - **Submission**: recording jobs as `Pending`.
//! - **Claiming**: a worker flips a job to `Running` under the entry lock, so two
//!   workers never run the same job.
//! - **Execution**: invoking the handler from the `JobHandlerRegistry` with the
//!   bound storage service.
//! - **User logs**: one log file per finished job under the user log directory.

use super::registry::JobHandlerRegistry;
use super::types::*;
use crate::storage::types::StorageService;

use anyhow::{Context, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::io::Write;
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Contract of the compute service running on top of the storage service.
pub trait ComputeService: Send + Sync {
    /// Address of the job tracker endpoint, e.g. `127.0.0.1:40124`.
    fn address(&self) -> String;

    fn worker_count(&self) -> usize;

    fn submit(&self, job: Job) -> Result<JobId>;

    fn status(&self, job_id: &JobId) -> Option<JobStatus>;

    fn shutdown(&self) -> Result<()>;
}

/// Polls `compute` until the job reaches a terminal status or `timeout` elapses.
pub async fn wait_for_job(
    compute: &dyn ComputeService,
    job_id: &JobId,
    timeout: Duration,
) -> Result<JobStatus> {
    let poll = async {
        loop {
            match compute.status(job_id) {
                Some(status) if status.is_finished() => return Ok(status),
                Some(_) => tokio::time::sleep(STATUS_POLL_INTERVAL).await,
                None => return Err(anyhow::anyhow!("Unknown job {}", job_id.0)),
            }
        }
    };

    tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| anyhow::anyhow!("Job {} did not finish within {:?}", job_id.0, timeout))?
}

pub struct MiniJobTracker {
    jobs: Arc<DashMap<JobId, JobEntry>>,
    handlers: Arc<JobHandlerRegistry>,
    storage: Arc<dyn StorageService>,
    worker_count: usize,
    address: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    userlog_dir: Option<PathBuf>,
}

impl MiniJobTracker {
    /// Starts the tracker and spawns its workers on the current tokio runtime.
    pub fn start(
        storage: Arc<dyn StorageService>,
        handlers: Arc<JobHandlerRegistry>,
        worker_count: usize,
        userlog_dir: Option<PathBuf>,
    ) -> Result<Arc<Self>> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("job tracker must be started inside a tokio runtime")?;

        if let Some(dir) = &userlog_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating user log directory {}", dir.display()))?;
        }

        let listener = TcpListener::bind("127.0.0.1:0").context("binding job tracker endpoint")?;
        let address = listener.local_addr()?;
        let worker_count = worker_count.max(1);

        let tracker = Arc::new(Self {
            jobs: Arc::new(DashMap::new()),
            handlers,
            storage,
            worker_count,
            address,
            listener: Mutex::new(Some(listener)),
            workers: Mutex::new(Vec::with_capacity(worker_count)),
            running: AtomicBool::new(true),
            userlog_dir,
        });

        let mut workers = tracker.workers.lock();
        for worker_id in 0..worker_count {
            let tracker = tracker.clone();
            workers.push(runtime.spawn(async move {
                tracker.worker_loop(worker_id).await;
            }));
        }
        drop(workers);

        tracing::info!(
            "Job tracker started at {} with {} workers (storage {})",
            address,
            worker_count,
            tracker.storage.uri()
        );

        Ok(tracker)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Polls until the job finishes or `timeout` elapses.
    pub async fn wait_for(&self, job_id: &JobId, timeout: Duration) -> Result<JobStatus> {
        wait_for_job(self, job_id, timeout).await
    }

    /// Counts of (pending, running, completed, failed) jobs.
    pub fn status_counts(&self) -> (usize, usize, usize, usize) {
        let mut pending = 0;
        let mut running = 0;
        let mut completed = 0;
        let mut failed = 0;

        for entry in self.jobs.iter() {
            match entry.status {
                JobStatus::Pending => pending += 1,
                JobStatus::Running => running += 1,
                JobStatus::Completed => completed += 1,
                JobStatus::Failed { .. } => failed += 1,
            }
        }

        (pending, running, completed, failed)
    }

    /// The main loop for a single worker.
    ///
    /// 1. Fetches pending jobs, oldest first.
    /// 2. Attempts to claim one.
    /// 3. If claimed, runs it and records the outcome.
    async fn worker_loop(&self, worker_id: usize) {
        tracing::debug!("Worker {} started", worker_id);

        while self.is_running() {
            let jobs = self.pending_jobs();

            let mut claimed = None;
            for (job_id, entry) in jobs {
                if self.try_claim_job(&job_id, worker_id) {
                    claimed = Some((job_id, entry.job));
                    break;
                }
                tracing::trace!("Job {} already claimed by another worker", job_id.0);
            }

            let Some((job_id, job)) = claimed else {
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
                continue;
            };

            tracing::info!(
                "Worker {} claimed job {} (handler: {})",
                worker_id,
                job_id.0,
                job.handler
            );

            let ctx = JobContext {
                job_id: job_id.clone(),
                payload: job.payload.clone(),
                storage: self.storage.clone(),
            };
            let result = self.handlers.execute(&job, ctx).await;
            self.complete_job(&job_id, result);
        }

        tracing::debug!("Worker {} stopped", worker_id);
    }

    fn pending_jobs(&self) -> Vec<(JobId, JobEntry)> {
        let mut jobs: Vec<(JobId, JobEntry)> = self
            .jobs
            .iter()
            .filter(|entry| entry.value().status == JobStatus::Pending)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        jobs.sort_by_key(|(_, entry)| entry.created_at);
        jobs
    }

    fn try_claim_job(&self, job_id: &JobId, worker_id: usize) -> bool {
        match self.jobs.get_mut(job_id) {
            Some(mut entry) if entry.status == JobStatus::Pending => {
                entry.status = JobStatus::Running;
                entry.assigned_to = Some(worker_id);
                true
            }
            _ => false,
        }
    }

    fn complete_job(&self, job_id: &JobId, result: Result<()>) {
        let status = match result {
            Ok(()) => JobStatus::Completed,
            Err(e) => {
                tracing::error!("Job {} failed: {:#}", job_id.0, e);
                JobStatus::Failed {
                    error: format!("{:#}", e),
                }
            }
        };

        if let Some(mut entry) = self.jobs.get_mut(job_id) {
            entry.status = status.clone();
        }
        self.write_userlog(job_id, &status);
    }

    fn write_userlog(&self, job_id: &JobId, status: &JobStatus) {
        let Some(dir) = &self.userlog_dir else {
            return;
        };
        let written = std::fs::File::create(dir.join(format!("{}.log", job_id.0)))
            .and_then(|mut file| writeln!(file, "{:?}", status));
        if let Err(e) = written {
            tracing::debug!("Failed to write user log for job {}: {}", job_id.0, e);
        }
    }
}

impl ComputeService for MiniJobTracker {
    fn address(&self) -> String {
        self.address.to_string()
    }

    fn worker_count(&self) -> usize {
        self.worker_count
    }

    fn submit(&self, job: Job) -> Result<JobId> {
        if !self.is_running() {
            return Err(anyhow::anyhow!("Job tracker at {} is shut down", self.address));
        }

        let job_id = JobId::new();
        tracing::debug!("Submitting job {} (handler: {})", job_id.0, job.handler);
        self.jobs.insert(
            job_id.clone(),
            JobEntry {
                job,
                status: JobStatus::Pending,
                assigned_to: None,
                created_at: now_ms(),
            },
        );
        Ok(job_id)
    }

    fn status(&self, job_id: &JobId) -> Option<JobStatus> {
        self.jobs.get(job_id).map(|entry| entry.status.clone())
    }

    fn shutdown(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            tracing::debug!("Job tracker already shut down");
            return Ok(());
        }
        for worker in self.workers.lock().drain(..) {
            worker.abort();
        }
        self.listener.lock().take();
        tracing::info!("Job tracker at {} shut down", self.address);
        Ok(())
    }
}
