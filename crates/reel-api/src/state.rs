//! Application state.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use reel_jobs::{build_store, JobProcessor, JobStore, ProcessorConfig, StoreConfig};
use reel_media::{Recorder, RecorderConfig};
use reel_storage::{ArtifactStore, R2ArtifactStore};

use crate::config::ApiConfig;

/// Shared application state, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: Arc<dyn JobStore>,
    pub processor: Arc<JobProcessor>,
    /// R2 store, when configured; otherwise artifacts are served locally
    pub storage: Option<Arc<R2ArtifactStore>>,
    /// FFmpeg executable checked by the readiness probe
    pub ffmpeg_path: PathBuf,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        processor: Arc<JobProcessor>,
        storage: Option<Arc<R2ArtifactStore>>,
        ffmpeg_path: PathBuf,
    ) -> Self {
        Self {
            config,
            jobs: Arc::clone(processor.store()),
            processor,
            storage,
            ffmpeg_path,
        }
    }

    /// Create application state from environment variables.
    pub async fn from_env(config: ApiConfig) -> anyhow::Result<Self> {
        let store_config = StoreConfig::from_env()?;
        let jobs = build_store(&store_config).await?;
        info!(backend = %jobs.backend(), namespace = %store_config.namespace, "Job store ready");

        let recorder_config = RecorderConfig::from_env();
        let ffmpeg_path = recorder_config.encoder.ffmpeg_path.clone();
        let recorder = Arc::new(Recorder::from_config(recorder_config));

        let storage = match R2ArtifactStore::from_env() {
            Ok(store) => {
                info!(bucket = %store.client().bucket(), "Artifact store configured");
                Some(Arc::new(store))
            }
            Err(e) => {
                info!("Artifact store not configured, serving videos locally: {}", e);
                None
            }
        };
        let artifacts = storage
            .clone()
            .map(|store| store as Arc<dyn ArtifactStore>);

        let processor = JobProcessor::new(
            ProcessorConfig::from_env(config.port),
            jobs,
            recorder,
            artifacts,
        )?;

        Ok(Self::new(config, Arc::new(processor), storage, ffmpeg_path))
    }
}
