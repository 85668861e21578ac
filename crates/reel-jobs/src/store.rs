//! Job store contract and backend selection.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::info;

use reel_firestore::FirestoreClient;
use reel_models::{Job, JobId, JobUpdate, RenderRequest};

use crate::error::{JobsError, JobsResult};
use crate::firestore::FirestoreJobStore;
use crate::memory::MemoryJobStore;

/// Collection used when `JOB_NAMESPACE` is unset.
pub const DEFAULT_NAMESPACE: &str = "render_jobs";

/// Bookkeeping for render jobs.
///
/// Every job has a single writer (its processor) and any number of readers,
/// so implementations need no compare-and-swap. Updates are merged with
/// [`Job::apply`], which enforces the status lifecycle.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Backend name for logs and readiness checks.
    fn backend(&self) -> &'static str;

    /// Store a new pending job.
    async fn create(&self, request: RenderRequest) -> JobsResult<Job>;

    /// Current record, or `None` if unknown.
    async fn get(&self, id: &JobId) -> JobsResult<Option<Job>>;

    /// Merge `update` into the record and return the result.
    async fn update(&self, id: &JobId, update: JobUpdate) -> JobsResult<Job>;

    /// Remove a record. Removing an unknown job succeeds.
    async fn delete(&self, id: &JobId) -> JobsResult<()>;

    /// Remove completed and failed jobs last updated more than `max_age` ago.
    /// Returns the number removed.
    async fn cleanup(&self, max_age: Duration) -> JobsResult<usize>;
}

/// Cut-off for [`JobStore::cleanup`]; `None` when `max_age` reaches before the epoch of `DateTime`.
pub(crate) fn cleanup_threshold(now: DateTime<Utc>, max_age: Duration) -> Option<DateTime<Utc>> {
    TimeDelta::from_std(max_age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
}

/// Whether cleanup may remove `job`.
pub(crate) fn is_expired(job: &Job, threshold: DateTime<Utc>) -> bool {
    job.is_terminal() && job.updated_at < threshold
}

/// Available job store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// Process memory, lost on restart
    #[default]
    Memory,
    /// Firestore collection
    Firestore,
}

impl FromStr for StoreBackend {
    type Err = JobsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "" => Ok(Self::Memory),
            "firestore" => Ok(Self::Firestore),
            other => Err(JobsError::config_error(format!(
                "unknown JOB_STORE '{}' (expected 'memory' or 'firestore')",
                other
            ))),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Firestore => write!(f, "firestore"),
        }
    }
}

/// Job store selection.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Firestore collection holding the jobs
    pub namespace: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl StoreConfig {
    /// Load from `JOB_STORE` and `JOB_NAMESPACE`.
    pub fn from_env() -> JobsResult<Self> {
        let backend = match std::env::var("JOB_STORE") {
            Ok(value) => value.parse()?,
            Err(_) => StoreBackend::default(),
        };
        let namespace = std::env::var("JOB_NAMESPACE")
            .ok()
            .filter(|ns| !ns.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        Ok(Self { backend, namespace })
    }
}

/// Construct the configured backend. Called once at startup.
pub async fn build_store(config: &StoreConfig) -> JobsResult<Arc<dyn JobStore>> {
    let store: Arc<dyn JobStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryJobStore::new()),
        StoreBackend::Firestore => {
            let client = FirestoreClient::from_env()
                .await
                .map_err(|e| JobsError::persistence(format!("Firestore client: {}", e)))?;
            Arc::new(FirestoreJobStore::new(client, config.namespace.clone()))
        }
    };

    info!(
        backend = store.backend(),
        namespace = %config.namespace,
        "Job store initialized"
    );
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::{JobResult, JobStatus};
    use serial_test::serial;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!(
            " Firestore ".parse::<StoreBackend>().unwrap(),
            StoreBackend::Firestore
        );
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    #[serial]
    fn test_store_config_from_env() {
        std::env::remove_var("JOB_STORE");
        std::env::remove_var("JOB_NAMESPACE");
        let config = StoreConfig::from_env().unwrap();
        assert_eq!(config.backend, StoreBackend::Memory);
        assert_eq!(config.namespace, "render_jobs");

        std::env::set_var("JOB_STORE", "firestore");
        std::env::set_var("JOB_NAMESPACE", "staging_jobs");
        let config = StoreConfig::from_env().unwrap();
        assert_eq!(config.backend, StoreBackend::Firestore);
        assert_eq!(config.namespace, "staging_jobs");

        std::env::set_var("JOB_STORE", "sqlite");
        assert!(StoreConfig::from_env().is_err());

        std::env::remove_var("JOB_STORE");
        std::env::remove_var("JOB_NAMESPACE");
    }

    #[test]
    fn test_expiry_only_for_old_terminal_jobs() {
        let now = Utc::now();
        let threshold = cleanup_threshold(now, Duration::from_secs(3600)).unwrap();
        let old = now - TimeDelta::hours(2);

        let mut job = Job::with_id(
            JobId::new(),
            RenderRequest::new("aje", "x", "post", "default"),
            old,
        );
        assert!(!is_expired(&job, threshold), "pending jobs never expire");

        job.apply_at(JobUpdate::processing("Starting recorder"), old).unwrap();
        assert!(!is_expired(&job, threshold), "processing jobs never expire");

        job.apply_at(
            JobUpdate::completed(JobResult {
                video_url: "http://localhost/videos/a.mp4".to_string(),
                thumbnail_url: None,
            }),
            old,
        )
        .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(is_expired(&job, threshold));

        job.updated_at = now;
        assert!(!is_expired(&job, threshold));
    }

    #[test]
    fn test_threshold_saturates() {
        assert!(cleanup_threshold(Utc::now(), Duration::MAX).is_none());
    }

    #[tokio::test]
    async fn test_build_memory_store() {
        let store = build_store(&StoreConfig::default()).await.unwrap();
        assert_eq!(store.backend(), "memory");
    }
}
