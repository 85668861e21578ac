//! Firestore REST API client.
//!
//! This crate provides:
//! - Document CRUD, batch writes and structured queries
//! - Service account / ADC authentication via gcp_auth, or the local emulator
//! - Token caching, retry with backoff, tracing spans and metrics

pub mod client;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod token_cache;
pub mod types;


pub use client::{FirestoreClient, FirestoreConfig, MAX_BATCH_WRITES};
pub use error::{FirestoreError, FirestoreResult};
pub use retry::RetryConfig;
pub use types::{
    CollectionSelector, CompositeFilter, Document, FieldFilter, FieldReference, Filter,
    FromFirestoreValue, StructuredQuery, ToFirestoreValue, Value, Write,
};
