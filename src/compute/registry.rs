//! Job Handler Registry
//!
//! Maps job names (e.g. "copy_lines") to async closures, so the compute service
//! stays generic and tests can plug in whatever work they need.

use super::types::*;

use anyhow::Result;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type-erased async job handler.
pub type JobHandlerFn =
    Arc<dyn Fn(JobContext) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// Registry holding the mapping between job names and their implementation.
#[derive(Default)]
pub struct JobHandlerRegistry {
    handlers: DashMap<String, JobHandlerFn>,
}

impl JobHandlerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `handler` under `handler_name`, replacing any previous one.
    pub fn register<F, Fut>(&self, handler_name: &str, handler: F)
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handler_fn: JobHandlerFn = Arc::new(move |ctx: JobContext| {
            Box::pin(handler(ctx)) as Pin<Box<dyn Future<Output = Result<()>> + Send>>
        });

        self.handlers.insert(handler_name.to_string(), handler_fn);

        tracing::info!("Registered job handler: {}", handler_name);
    }

    /// Looks up the handler named by `job` and runs it.
    ///
    /// # Returns
    /// * `Err` if the handler failed or no handler exists for the name.
    pub async fn execute(&self, job: &Job, ctx: JobContext) -> Result<()> {
        // Clone out of the map so no shard lock is held across the await.
        let handler_fn = self
            .handlers
            .get(&job.handler)
            .map(|entry| entry.value().clone());

        match handler_fn {
            Some(handler_fn) => {
                tracing::debug!(
                    "Executing job {} with handler '{}'",
                    ctx.job_id.0,
                    job.handler
                );
                handler_fn(ctx).await
            }
            None => {
                let error = format!("Unknown job handler: {}", job.handler);
                tracing::error!("{}", error);
                Err(anyhow::anyhow!(error))
            }
        }
    }

    pub fn list_handlers(&self) -> Vec<String> {
        self.handlers
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn has_handler(&self, handler_name: &str) -> bool {
        self.handlers.contains_key(handler_name)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}
