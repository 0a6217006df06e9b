//! Storage and dispatch collaborators used by the search pipeline.
//!
//! Each collaborator is a trait so the pipeline can run against the
//! in-memory and filesystem implementations here or against remote
//! services. Retrying failed calls is up to the implementation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SearchParams;
use crate::pipeline::{BatchTask, Buckets, MaskSpec};
use crate::results::BatchPayload;
use crate::util::CdsResult;

mod fs;
mod memory;

pub use fs::FsBlobStore;
pub use memory::{MemoryBlobStore, MemoryJobStore, MemoryModelLinks, MemoryTaskStore};

/// Object storage addressed by bucket and key.
pub trait BlobStore: Send + Sync {
    /// Returns the object bytes, or `NotFound`.
    fn get(&self, bucket: &str, key: &str) -> CdsResult<Vec<u8>>;

    /// Stores an object, replacing any previous version.
    fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: &str) -> CdsResult<()>;

    /// Returns true if the object exists.
    fn head_exists(&self, bucket: &str, key: &str) -> CdsResult<bool>;

    /// Lists keys starting with `prefix` in ascending order.
    fn list_keys(&self, bucket: &str, prefix: &str) -> CdsResult<Vec<String>>;

    /// Deletes every key starting with `prefix`; returns how many were removed.
    fn delete(&self, bucket: &str, prefix: &str) -> CdsResult<usize>;
}

/// One batch's match list, keyed by `(job_id, batch_id)`.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchResult {
    pub job_id: String,
    pub batch_id: usize,
    /// Absolute expiry; expired rows are invisible.
    pub ttl: DateTime<Utc>,
    pub payload: BatchPayload,
}

/// One page of batch results in ascending batch id order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskPage {
    pub rows: Vec<BatchResult>,
    /// Batch id to resume after, when more rows remain.
    pub next: Option<usize>,
}

/// Per-job table of batch results.
pub trait TaskStore: Send + Sync {
    /// Writes a row; a row with the same `(job_id, batch_id)` is replaced.
    fn append(&self, row: BatchResult) -> CdsResult<()>;

    /// Returns live rows of a job with batch id greater than `after`.
    /// Reads are consistent with every completed `append`.
    fn query(&self, job_id: &str, after: Option<usize>) -> CdsResult<TaskPage>;

    /// Number of live rows of a job.
    fn count(&self, job_id: &str) -> CdsResult<usize>;

    /// Removes every row of a job; returns how many were removed.
    fn delete_job(&self, job_id: &str) -> CdsResult<usize>;
}

/// Lifecycle of a search job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Dispatching,
    Running,
    Completed,
    CompletedWithErrors,
    TimedOut,
    Failed,
}

/// Persisted progress and audit record of a job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadata {
    pub job_id: String,
    pub params: SearchParams,
    pub masks: Vec<MaskSpec>,
    pub buckets: Buckets,
    pub target_count: usize,
    pub batch_size: usize,
    pub partitions: usize,
    pub started_at: DateTime<Utc>,
    pub status: JobStatus,
    #[serde(default)]
    pub failed_batches: Vec<usize>,
    pub total_matches: Option<usize>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl JobMetadata {
    /// Applies a partial update.
    pub fn apply(&mut self, update: JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        self.failed_batches.extend(update.failed_batches);
        if update.total_matches.is_some() {
            self.total_matches = update.total_matches;
        }
        if update.finished_at.is_some() {
            self.finished_at = update.finished_at;
        }
        if update.error_message.is_some() {
            self.error_message = update.error_message;
        }
    }
}

/// Partial update of [`JobMetadata`]; `None` fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub failed_batches: Vec<usize>,
    pub total_matches: Option<usize>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl JobUpdate {
    /// Update setting only the status.
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Marks the job finished now with the given status and message.
    pub fn finished(status: JobStatus, error_message: Option<String>) -> Self {
        Self {
            status: Some(status),
            finished_at: Some(Utc::now()),
            error_message,
            ..Self::default()
        }
    }
}

/// Store of job metadata records.
pub trait JobMetadataStore: Send + Sync {
    /// Inserts a new record; fails if the job id already exists.
    fn create(&self, meta: JobMetadata) -> CdsResult<()>;

    /// Applies `update` and returns the new record.
    fn update(&self, job_id: &str, update: JobUpdate) -> CdsResult<JobMetadata>;

    /// Returns the record, or `NotFound`.
    fn get(&self, job_id: &str) -> CdsResult<JobMetadata>;
}

/// Fire-and-forget hand-off of a batch to some worker.
pub trait BatchDispatcher: Send + Sync {
    fn dispatch(&self, task: BatchTask) -> CdsResult<()>;
}

/// 3D model files published for a line or body id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelLinks {
    #[serde(rename = "skeletonSWC")]
    pub skeleton_swc: Option<String>,
    #[serde(rename = "skeletonOBJ")]
    pub skeleton_obj: Option<String>,
}

/// Keyed lookup of 3D model links by published name.
pub trait ModelLinkStore: Send + Sync {
    fn lookup(&self, published_name: &str) -> CdsResult<Option<ModelLinks>>;
}
