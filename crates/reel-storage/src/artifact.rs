//! Artifact store capability.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use reel_models::encoding::{THUMBNAIL_CONTENT_TYPE, VIDEO_CONTENT_TYPE};

use crate::client::{R2Client, R2Config, MAX_PRESIGN_TTL};
use crate::error::{StorageError, StorageResult};

/// Uploads finished artifacts and returns where they can be fetched.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `name` (for example `videos/{job_id}.mp4`).
    async fn put(&self, bytes: Vec<u8>, name: &str) -> StorageResult<String>;
}

/// MIME type for an artifact name, by extension.
pub fn content_type_for(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "mp4" => VIDEO_CONTENT_TYPE,
        Some(ext) if ext == "jpg" || ext == "jpeg" => THUMBNAIL_CONTENT_TYPE,
        Some(ext) if ext == "png" => "image/png",
        _ => "application/octet-stream",
    }
}

/// [`ArtifactStore`] on an R2 bucket.
#[derive(Clone)]
pub struct R2ArtifactStore {
    client: R2Client,
    public_url: Option<String>,
    key_prefix: String,
    presign_ttl: Duration,
}

impl R2ArtifactStore {
    pub fn new(config: &R2Config) -> Self {
        Self {
            client: R2Client::new(config),
            public_url: config
                .public_url
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_string()),
            key_prefix: config.key_prefix.clone(),
            presign_ttl: MAX_PRESIGN_TTL,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(&R2Config::from_env()?))
    }

    pub fn client(&self) -> &R2Client {
        &self.client
    }

    /// Object key for an artifact name.
    pub fn key_for(&self, name: &str) -> StorageResult<String> {
        let name = name.trim_start_matches('/');
        if name.is_empty() || name.split('/').any(|part| part == "..") {
            return Err(StorageError::InvalidKey(name.to_string()));
        }
        Ok(format!("{}{}", self.key_prefix, name))
    }

    async fn url_for(&self, key: &str) -> StorageResult<String> {
        match &self.public_url {
            Some(base) => Ok(format!("{}/{}", base, key)),
            None => self.client.presign_get(key, self.presign_ttl).await,
        }
    }
}

#[async_trait]
impl ArtifactStore for R2ArtifactStore {
    async fn put(&self, bytes: Vec<u8>, name: &str) -> StorageResult<String> {
        let key = self.key_for(name)?;
        self.client
            .upload_bytes(bytes, &key, content_type_for(name))
            .await?;
        let url = self.url_for(&key).await?;
        debug!("Artifact {} available at {}", key, url);
        Ok(url)
    }
}
