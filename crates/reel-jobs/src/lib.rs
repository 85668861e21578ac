//! Render job lifecycle.
//!
//! This crate provides:
//! - The [`JobStore`] contract with in-memory and Firestore backends
//! - The background [`JobProcessor`] that turns a job into a recording
//! - The periodic [`CleanupScheduler`] for expired terminal jobs

pub mod cleanup;
pub mod error;
pub mod firestore;
pub mod logging;
pub mod memory;
pub mod processor;
pub mod progress;
pub mod store;
pub mod target;

pub use cleanup::{CleanupConfig, CleanupHandle, CleanupScheduler};
pub use error::{JobsError, JobsResult};
pub use firestore::FirestoreJobStore;
pub use logging::JobLogger;
pub use memory::MemoryJobStore;
pub use processor::{JobProcessor, ProcessorConfig, VideoRecorder};
pub use progress::ProgressBridge;
pub use store::{build_store, JobStore, StoreBackend, StoreConfig};
pub use target::TargetResolver;
