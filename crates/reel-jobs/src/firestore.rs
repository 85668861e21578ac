//! Firestore job store.
//!
//! One document per job in the namespace collection. Scalar fields are
//! stored as Firestore values; `request` and `result` as JSON strings.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use reel_firestore::{
    Document, FirestoreClient, FirestoreError, Filter, StructuredQuery, ToFirestoreValue, Value,
    Write, MAX_BATCH_WRITES,
};
use reel_models::{Job, JobId, JobResult, JobStatus, JobUpdate, RenderRequest};

use crate::error::{JobsError, JobsResult};
use crate::store::{cleanup_threshold, JobStore};

const UPDATED_AT: &str = "updated_at";

/// [`JobStore`] backed by a Firestore collection.
#[derive(Clone)]
pub struct FirestoreJobStore {
    client: FirestoreClient,
    collection: String,
}

impl FirestoreJobStore {
    pub fn new(client: FirestoreClient, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Delete terminal jobs with `status` older than `threshold`, one page at a time.
    async fn cleanup_status(
        &self,
        status: JobStatus,
        threshold: DateTime<Utc>,
    ) -> JobsResult<usize> {
        let mut removed = 0;

        loop {
            let query = StructuredQuery::collection(&self.collection)
                .filter(Filter::and(vec![
                    Filter::field("status", "EQUAL", status.as_str().to_firestore_value()),
                    Filter::field(UPDATED_AT, "LESS_THAN", threshold.to_firestore_value()),
                ]))
                .limit(MAX_BATCH_WRITES as i32);

            let docs = self
                .client
                .with_retry("cleanup_query", || self.client.run_query(None, query.clone()))
                .await?;
            if docs.is_empty() {
                break;
            }

            let page = docs.len();
            let writes: Vec<Write> = docs
                .iter()
                .filter_map(|doc| doc.name.clone())
                .map(Write::delete)
                .collect();
            let deleted = writes.len();
            self.client
                .with_retry("cleanup_delete", || self.client.batch_write(writes.clone()))
                .await?;

            removed += deleted;
            debug!(status = %status, deleted, "Deleted expired jobs");

            if page < MAX_BATCH_WRITES || deleted == 0 {
                break;
            }
        }

        Ok(removed)
    }
}

#[async_trait]
impl JobStore for FirestoreJobStore {
    fn backend(&self) -> &'static str {
        "firestore"
    }

    async fn create(&self, request: RenderRequest) -> JobsResult<Job> {
        let job = Job::new(request);
        let fields = job_to_fields(&job)?;

        // Not retried: a retry after a lost response would report a conflict.
        match self
            .client
            .create_document(&self.collection, job.id.as_str(), fields)
            .await
        {
            Ok(_) => Ok(job),
            Err(FirestoreError::AlreadyExists(_)) => Err(JobsError::AlreadyExists(job.id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: &JobId) -> JobsResult<Option<Job>> {
        let doc = self
            .client
            .with_retry("get_job", || {
                self.client.get_document(&self.collection, id.as_str())
            })
            .await?;

        doc.map(|doc| job_from_document(id, &doc)).transpose()
    }

    async fn update(&self, id: &JobId, update: JobUpdate) -> JobsResult<Job> {
        let mut job = self
            .get(id)
            .await?
            .ok_or_else(|| JobsError::NotFound(id.clone()))?;

        let mut mask: Vec<String> = update
            .field_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        mask.push(UPDATED_AT.to_string());

        job.apply(update)?;

        let all_fields = job_to_fields(&job)?;
        let fields: HashMap<String, Value> = all_fields
            .into_iter()
            .filter(|(name, _)| mask.contains(name))
            .collect();

        let result = self
            .client
            .with_retry("update_job", || {
                self.client.update_document(
                    &self.collection,
                    id.as_str(),
                    fields.clone(),
                    Some(mask.clone()),
                )
            })
            .await;

        match result {
            Ok(_) => Ok(job),
            Err(FirestoreError::NotFound(_)) => Err(JobsError::NotFound(id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: &JobId) -> JobsResult<()> {
        self.client
            .with_retry("delete_job", || {
                self.client.delete_document(&self.collection, id.as_str())
            })
            .await?;
        Ok(())
    }

    async fn cleanup(&self, max_age: Duration) -> JobsResult<usize> {
        let Some(threshold) = cleanup_threshold(Utc::now(), max_age) else {
            return Ok(0);
        };

        let mut removed = 0;
        for status in JobStatus::TERMINAL {
            removed += self.cleanup_status(status, threshold).await?;
        }

        if removed > 0 {
            info!(
                collection = %self.collection,
                removed,
                "Removed expired jobs"
            );
        }
        Ok(removed)
    }
}

/// Document fields for a job. Absent optional fields are omitted.
fn job_to_fields(job: &Job) -> JobsResult<HashMap<String, Value>> {
    let mut fields = HashMap::new();
    fields.insert("status".to_string(), job.status.as_str().to_firestore_value());
    fields.insert(
        "request".to_string(),
        serde_json::to_string(&job.request)?.to_firestore_value(),
    );
    if let Some(progress) = &job.progress {
        fields.insert("progress".to_string(), progress.to_firestore_value());
    }
    if let Some(percent) = job.progress_percent {
        fields.insert("progress_percent".to_string(), percent.to_firestore_value());
    }
    if let Some(result) = &job.result {
        fields.insert(
            "result".to_string(),
            serde_json::to_string(result)?.to_firestore_value(),
        );
    }
    if let Some(error) = &job.error {
        fields.insert("error".to_string(), error.to_firestore_value());
    }
    fields.insert("created_at".to_string(), job.created_at.to_firestore_value());
    fields.insert(UPDATED_AT.to_string(), job.updated_at.to_firestore_value());
    Ok(fields)
}

fn job_from_document(id: &JobId, doc: &Document) -> JobsResult<Job> {
    let status_str: String = doc.require("status")?;
    let status: JobStatus = status_str.parse().map_err(JobsError::invalid_record)?;

    let request_json: String = doc.require("request")?;
    let request: RenderRequest = serde_json::from_str(&request_json)?;

    let result = doc
        .get::<String>("result")
        .map(|json| serde_json::from_str::<JobResult>(&json))
        .transpose()?;

    Ok(Job {
        id: id.clone(),
        status,
        request,
        progress: doc.get("progress"),
        progress_percent: doc.get("progress_percent"),
        result,
        error: doc.get("error"),
        created_at: doc.require("created_at")?,
        updated_at: doc.require("updated_at")?,
    })
}
