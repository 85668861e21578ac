//! In-process job store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use reel_models::{Job, JobId, JobUpdate, RenderRequest};

use crate::error::{JobsError, JobsResult};
use crate::store::{cleanup_threshold, is_expired, JobStore};

/// Jobs held in a map; everything is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a prepared record as-is, replacing any job with the same ID.
    pub async fn insert(&self, job: Job) {
        self.jobs.write().await.insert(job.id.clone(), job);
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, request: RenderRequest) -> JobsResult<Job> {
        let job = Job::new(request);
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(JobsError::AlreadyExists(job.id));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn get(&self, id: &JobId) -> JobsResult<Option<Job>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn update(&self, id: &JobId, update: JobUpdate) -> JobsResult<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| JobsError::NotFound(id.clone()))?;
        job.apply(update)?;
        Ok(job.clone())
    }

    async fn delete(&self, id: &JobId) -> JobsResult<()> {
        if self.jobs.write().await.remove(id).is_none() {
            debug!(job_id = %id, "Delete of unknown job ignored");
        }
        Ok(())
    }

    async fn cleanup(&self, max_age: Duration) -> JobsResult<usize> {
        let Some(threshold) = cleanup_threshold(Utc::now(), max_age) else {
            return Ok(0);
        };

        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !is_expired(job, threshold));
        Ok(before - jobs.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use chrono::TimeDelta;
    use reel_models::{JobResult, JobStatus, TransitionError};

    fn request() -> RenderRequest {
        RenderRequest::new("aje", "x", "post", "default")
    }

    fn result() -> JobResult {
        JobResult {
            video_url: "http://localhost:8000/videos/a.mp4".to_string(),
            thumbnail_url: None,
        }
    }

    /// A job that reached `status` two days ago.
    fn aged_job(status: JobStatus) -> Job {
        let then = Utc::now() - TimeDelta::days(2);
        let mut job = Job::with_id(JobId::new(), request(), then);
        if status != JobStatus::Pending {
            job.apply_at(JobUpdate::processing("Starting recorder"), then)
                .unwrap();
        }
        match status {
            JobStatus::Completed => job.apply_at(JobUpdate::completed(result()), then).unwrap(),
            JobStatus::Failed => job.apply_at(JobUpdate::failed("boom"), then).unwrap(),
            _ => {}
        }
        job
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryJobStore::new();
        let job = store.create(request()).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.created_at, job.updated_at);

        let fetched = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(fetched, job);
        assert!(store.get(&JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_generates_unique_ids() {
        let store = MemoryJobStore::new();
        let a = store.create(request()).await.unwrap();
        let b = store.create(request()).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_update_merges_and_bumps_timestamp() {
        let store = MemoryJobStore::new();
        let job = store.create(request()).await.unwrap();

        let updated = store
            .update(&job.id, JobUpdate::processing("Starting recorder"))
            .await
            .unwrap();
        assert_eq!(updated.status, JobStatus::Processing);
        assert!(updated.updated_at >= job.updated_at);

        let updated = store
            .update(&job.id, JobUpdate::progress("Capturing frame 1/250", 15))
            .await
            .unwrap();
        assert_eq!(updated.progress.as_deref(), Some("Capturing frame 1/250"));
        assert_eq!(updated.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_update_unknown_job() {
        let store = MemoryJobStore::new();
        let err = store
            .update(&JobId::new(), JobUpdate::processing("x"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_rejects_transition_out_of_terminal() {
        let store = MemoryJobStore::new();
        let job = aged_job(JobStatus::Failed);
        store.insert(job.clone()).await;

        let err = store
            .update(&job.id, JobUpdate::completed(result()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JobsError::Transition(TransitionError::AlreadyTerminal(JobStatus::Failed))
        ));
        assert_eq!(store.get(&job.id).await.unwrap().unwrap(), job);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryJobStore::new();
        let job = store.create(request()).await.unwrap();
        store.delete(&job.id).await.unwrap();
        store.delete(&job.id).await.unwrap();
        assert!(store.get(&job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_only_removes_old_terminal_jobs() {
        let store = MemoryJobStore::new();
        let pending = aged_job(JobStatus::Pending);
        let processing = aged_job(JobStatus::Processing);
        let completed = aged_job(JobStatus::Completed);
        let failed = aged_job(JobStatus::Failed);
        for job in [&pending, &processing, &completed, &failed] {
            store.insert(job.clone()).await;
        }
        let fresh = store.create(request()).await.unwrap();
        store
            .update(&fresh.id, JobUpdate::processing("Starting recorder"))
            .await
            .unwrap();
        store.update(&fresh.id, JobUpdate::failed("boom")).await.unwrap();

        let removed = store.cleanup(Duration::from_secs(86_400)).await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get(&pending.id).await.unwrap().is_some());
        assert!(store.get(&processing.id).await.unwrap().is_some());
        assert!(store.get(&fresh.id).await.unwrap().is_some());
        assert!(store.get(&completed.id).await.unwrap().is_none());
        assert!(store.get(&failed.id).await.unwrap().is_none());

        assert_eq!(store.cleanup(Duration::from_secs(86_400)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_updates_across_jobs() {
        let store = Arc::new(MemoryJobStore::new());
        let mut ids = Vec::new();
        for _ in 0..8 {
            ids.push(store.create(request()).await.unwrap().id);
        }

        let tasks: Vec<_> = ids
            .iter()
            .cloned()
            .map(|id| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .update(&id, JobUpdate::processing("Starting recorder"))
                        .await
                        .unwrap();
                    for pct in [20u8, 40, 60] {
                        store
                            .update(&id, JobUpdate::progress("Capturing", pct))
                            .await
                            .unwrap();
                    }
                    store
                        .update(&id, JobUpdate::completed(result()))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        for id in &ids {
            let job = store.get(id).await.unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Completed);
            assert_eq!(job.progress_percent, Some(100));
        }
    }
}
