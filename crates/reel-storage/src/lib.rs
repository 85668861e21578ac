//! Artifact storage for rendered videos.
//!
//! Provides the [`ArtifactStore`] capability used by the job processor and an
//! S3-compatible implementation for Cloudflare R2.

pub mod artifact;
pub mod client;
pub mod error;

pub use artifact::{content_type_for, ArtifactStore, R2ArtifactStore};
pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
