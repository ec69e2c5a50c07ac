//! Compute Module Tests
//!
//! ## Test Scopes
//! - **Registry**: Verifies job registration, lookup, and execution mechanics.
//! - **Tracker**: Runs jobs end to end against an in-process storage service.

#[cfg(test)]
mod tests {
    use crate::compute::registry::JobHandlerRegistry;
    use crate::compute::tracker::{ComputeService, MiniJobTracker};
    use crate::compute::types::{Job, JobContext, JobId, JobStatus};
    use crate::config::ClusterConfiguration;
    use crate::storage::memory::MiniDfs;
    use crate::storage::types::{ClusterPath, StorageService};
    use std::io::Read;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn test_storage(base: &std::path::Path) -> Arc<dyn StorageService> {
        let mut conf = ClusterConfiguration::new();
        conf.set(crate::config::KEY_USER_NAME, "tester");
        MiniDfs::start(base, &conf, 1).unwrap()
    }

    fn test_context(storage: Arc<dyn StorageService>, payload: serde_json::Value) -> JobContext {
        JobContext {
            job_id: JobId::new(),
            payload,
            storage,
        }
    }

    // ============================================================
    // REGISTRY
    // ============================================================

    #[tokio::test]
    async fn test_registry_register_and_execute() {
        // ARRANGE
        let dir = tempfile::tempdir().unwrap();
        let storage = test_storage(dir.path());
        let registry = JobHandlerRegistry::new();
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        registry.register("count", move |_ctx| {
            let count = call_count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        assert!(registry.has_handler("count"));
        assert_eq!(registry.handler_count(), 1);

        // ACT
        let job = Job::new("count", serde_json::json!({}));
        let result = registry
            .execute(&job, test_context(storage, serde_json::json!({})))
            .await;

        // ASSERT
        assert!(result.is_ok());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_registry_unknown_handler_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = test_storage(dir.path());
        let registry = JobHandlerRegistry::new();

        let job = Job::new("missing", serde_json::json!({}));
        let result = registry
            .execute(&job, test_context(storage, serde_json::json!({})))
            .await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Unknown job handler"));
    }

    #[test]
    fn test_job_id_is_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn test_job_status_finished() {
        assert!(!JobStatus::Pending.is_finished());
        assert!(!JobStatus::Running.is_finished());
        assert!(JobStatus::Completed.is_finished());
        assert!(
            JobStatus::Failed {
                error: "boom".to_string()
            }
            .is_finished()
        );
    }

    // ============================================================
    // TRACKER
    // ============================================================

    #[tokio::test]
    async fn test_tracker_runs_job_against_storage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = test_storage(dir.path());
        let registry = JobHandlerRegistry::new();

        registry.register("write_marker", |ctx: JobContext| async move {
            let target = ctx.payload["path"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("Missing path"))?;
            ctx.storage.create(&ClusterPath::new(target), b"done\n")?;
            Ok(())
        });

        let userlogs = dir.path().join("logs").join("userlogs");
        let tracker =
            MiniJobTracker::start(storage.clone(), registry, 2, Some(userlogs.clone())).unwrap();
        assert_eq!(tracker.worker_count(), 2);

        let job_id = tracker
            .submit(Job::new(
                "write_marker",
                serde_json::json!({"path": "/out/_SUCCESS"}),
            ))
            .unwrap();

        let status = tracker
            .wait_for(&job_id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Completed);

        let mut content = String::new();
        storage
            .open(&ClusterPath::new("/out/_SUCCESS"))
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "done\n");
        assert!(userlogs.join(format!("{}.log", job_id.0)).exists());

        tracker.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_tracker_records_failed_job() {
        let dir = tempfile::tempdir().unwrap();
        let storage = test_storage(dir.path());
        let registry = JobHandlerRegistry::new();
        registry.register("explode", |_ctx| async { Err(anyhow::anyhow!("Intentional error")) });

        let tracker = MiniJobTracker::start(storage, registry, 1, None).unwrap();
        let job_id = tracker
            .submit(Job::new("explode", serde_json::json!({})))
            .unwrap();

        let status = tracker
            .wait_for(&job_id, Duration::from_secs(5))
            .await
            .unwrap();
        match status {
            JobStatus::Failed { error } => assert!(error.contains("Intentional error")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(tracker.status_counts(), (0, 0, 0, 1));
    }

    #[tokio::test]
    async fn test_tracker_rejects_jobs_after_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let storage = test_storage(dir.path());
        let tracker = MiniJobTracker::start(storage, JobHandlerRegistry::new(), 1, None).unwrap();

        tracker.shutdown().unwrap();
        // A second shutdown is a no-op.
        tracker.shutdown().unwrap();

        assert!(!tracker.is_running());
        assert!(tracker.submit(Job::new("any", serde_json::json!({}))).is_err());
    }
}
