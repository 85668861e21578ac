//! Shared data models for the reel video service.
//!
//! This crate provides:
//! - Render jobs and their status lifecycle
//! - Render requests (article descriptors)
//! - Recorder progress reporting
//! - Encoding defaults shared by the recorder and the artifact store

pub mod encoding;
pub mod job;
pub mod job_status;
pub mod progress;
pub mod request;

// Re-export common types
pub use job::{Job, JobId, JobResult, JobSnapshot, JobUpdate, TransitionError};
pub use job_status::JobStatus;
pub use progress::{RecorderPhase, RecorderProgress};
pub use request::RenderRequest;
