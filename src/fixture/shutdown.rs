//! Bounded-time shutdown.
//!
//! Service teardown runs as a `TeardownUnit` on its own OS thread, so a service
//! that blocks in `shutdown` cannot stall the caller's runtime. The coordinator
//! waits for the unit at most `timeout`, then purges the generated artifact
//! directories whether or not the unit has finished.
//!
//! ## Races
//! A unit that outlives the bound keeps running while its services' directories
//! are deleted underneath it. The coordinator does not cancel it: the report
//! carries the still-running unit as `TeardownOutcome::TimedOut`, and the caller
//! decides whether to cancel the remaining steps or wait for them.

use super::artifacts::GeneratedArtifacts;
use crate::error::Result;

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

pub const TEARDOWN_THREAD_NAME: &str = "cluster-teardown";

type TeardownStep = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Ordered teardown steps, run one after another on a dedicated thread.
///
/// Every step is attempted even if an earlier one failed or panicked. Once the
/// unit is cancelled, steps that have not started are skipped.
#[derive(Default)]
pub struct TeardownUnit {
    steps: Vec<(&'static str, TeardownStep)>,
}

impl TeardownUnit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step<F>(mut self, name: &'static str, step: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.steps.push((name, Box::new(step)));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Starts the unit on the `cluster-teardown` thread.
    pub fn launch(self) -> std::io::Result<PendingTeardown> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = oneshot::channel();

        let flag = cancelled.clone();
        std::thread::Builder::new()
            .name(TEARDOWN_THREAD_NAME.to_string())
            .spawn(move || {
                let summary = self.run(&flag);
                // The receiver is gone if nobody waits for the unit anymore.
                let _ = done_tx.send(summary);
            })?;

        Ok(PendingTeardown {
            cancelled,
            done: done_rx,
        })
    }

    fn run(self, cancelled: &AtomicBool) -> TeardownSummary {
        let mut summary = TeardownSummary::default();

        for (name, step) in self.steps {
            if cancelled.load(Ordering::SeqCst) {
                tracing::warn!("Teardown cancelled, skipping {}", name);
                summary.skipped.push(name);
                continue;
            }

            tracing::debug!("Teardown step {} starting", name);
            match catch_unwind(AssertUnwindSafe(step)) {
                Ok(Ok(())) => {
                    tracing::info!("Teardown step {} finished", name);
                    summary.completed.push(name);
                }
                Ok(Err(e)) => {
                    tracing::error!("Teardown step {} failed: {:#}", name, e);
                    summary.failed.push(StepFailure {
                        step: name,
                        error: format!("{:#}", e),
                    });
                }
                Err(payload) => {
                    let error = panic_message(payload.as_ref());
                    tracing::error!("Teardown step {} panicked: {}", name, error);
                    summary.failed.push(StepFailure { step: name, error });
                }
            }
        }

        summary
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {}", message)
    } else {
        "panic with non-string payload".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: &'static str,
    pub error: String,
}

/// What a finished unit did, step by step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownSummary {
    pub completed: Vec<&'static str>,
    pub failed: Vec<StepFailure>,
    /// Steps that never started because the unit was cancelled.
    pub skipped: Vec<&'static str>,
}

impl TeardownSummary {
    /// True if every step ran and succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// A launched unit that has not been awaited to completion.
#[derive(Debug)]
pub struct PendingTeardown {
    cancelled: Arc<AtomicBool>,
    done: oneshot::Receiver<TeardownSummary>,
}

impl PendingTeardown {
    /// Skips every step that has not started yet. A step already running is
    /// not interrupted.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            tracing::info!("Cancelling remaining teardown steps");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Waits for the unit to finish. `None` if the teardown thread died
    /// without reporting.
    pub async fn wait(self) -> Option<TeardownSummary> {
        self.done.await.ok()
    }
}

#[derive(Debug)]
pub enum TeardownOutcome {
    /// The unit finished within the bound.
    Finished(TeardownSummary),
    /// The bound elapsed; the unit is still running.
    TimedOut(PendingTeardown),
    /// The unit could not be launched or stopped reporting.
    Abandoned { reason: String },
}

impl TeardownOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }
}

/// Result of a successful stop: what happened to the services and which
/// artifact directories were removed.
#[derive(Debug)]
pub struct ShutdownReport {
    pub teardown: TeardownOutcome,
    pub purged: Vec<PathBuf>,
    pub elapsed: Duration,
}

pub struct ShutdownCoordinator {
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `unit` with the configured bound, then purges `artifacts`.
    ///
    /// Failures inside the unit are reported in the returned outcome, never as
    /// an error.
    ///
    /// # Errors
    /// * `Teardown` if an artifact directory could not be removed.
    pub async fn shutdown(
        &self,
        unit: TeardownUnit,
        artifacts: &GeneratedArtifacts,
    ) -> Result<ShutdownReport> {
        let started = Instant::now();
        tracing::info!(
            "Shutting down cluster ({} teardown steps, bound {:?})",
            unit.len(),
            self.timeout
        );

        let teardown = match unit.launch() {
            Ok(pending) => self.wait_bounded(pending).await,
            Err(e) => {
                tracing::error!("Failed to launch teardown thread: {}", e);
                TeardownOutcome::Abandoned {
                    reason: format!("failed to launch teardown thread: {}", e),
                }
            }
        };

        // Runs even if the unit is still going.
        let purged = artifacts.purge()?;
        let elapsed = started.elapsed();

        tracing::info!(
            "Cluster shut down in {:?} (teardown finished: {}, {} artifact directories removed)",
            elapsed,
            teardown.is_finished(),
            purged.len()
        );

        Ok(ShutdownReport {
            teardown,
            purged,
            elapsed,
        })
    }

    async fn wait_bounded(&self, mut pending: PendingTeardown) -> TeardownOutcome {
        match tokio::time::timeout(self.timeout, &mut pending.done).await {
            Ok(Ok(summary)) => {
                if !summary.is_clean() {
                    tracing::warn!(
                        "Teardown finished with {} failed step(s)",
                        summary.failed.len()
                    );
                }
                TeardownOutcome::Finished(summary)
            }
            Ok(Err(_)) => TeardownOutcome::Abandoned {
                reason: "teardown thread exited without reporting".to_string(),
            },
            Err(_) => {
                tracing::warn!(
                    "Teardown did not finish within {:?}; purging artifacts while it runs",
                    self.timeout
                );
                TeardownOutcome::TimedOut(pending)
            }
        }
    }
}
