//! Job partitioning and batch dispatch.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::pipeline::{validate_masks, BatchTask, SearchJob};
use crate::store::{BatchDispatcher, JobMetadata, JobMetadataStore, JobStatus, JobUpdate};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::math::div_ceil;
use crate::util::{CdsError, CdsResult};

/// Partitioning limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Preferred number of targets per batch.
    pub batch_size: usize,
    /// Upper bound on the number of batches of one job.
    pub max_parallelism: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 40,
            max_parallelism: 1000,
        }
    }
}

/// Contiguous slice `[start, end)` of the target list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchRange {
    pub batch_id: usize,
    pub start: usize,
    pub end: usize,
}

/// Splits `total` targets into contiguous batches of `batch_size`, growing
/// the batch size when that would need more than `max_parallelism` batches.
pub fn plan_batches(total: usize, batch_size: usize, max_parallelism: usize) -> Vec<BatchRange> {
    if total == 0 || batch_size == 0 || max_parallelism == 0 {
        return Vec::new();
    }
    let mut size = batch_size;
    if div_ceil(total, size) > max_parallelism {
        size = div_ceil(total, max_parallelism);
    }
    (0..div_ceil(total, size))
        .map(|batch_id| BatchRange {
            batch_id,
            start: batch_id * size,
            end: ((batch_id + 1) * size).min(total),
        })
        .collect()
}

/// Result of submitting a job.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchReport {
    pub job_id: String,
    pub partitions: usize,
    pub batch_size: usize,
    pub dispatched: usize,
    /// Dispatch failures, one `BatchDispatch` error per failed batch.
    pub failures: Vec<CdsError>,
}

/// Persists job metadata and dispatches one task per batch.
pub struct SearchCoordinator {
    jobs: Arc<dyn JobMetadataStore>,
    dispatcher: Arc<dyn BatchDispatcher>,
    config: CoordinatorConfig,
}

impl SearchCoordinator {
    pub fn new(
        jobs: Arc<dyn JobMetadataStore>,
        dispatcher: Arc<dyn BatchDispatcher>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            jobs,
            dispatcher,
            config,
        }
    }

    /// Validates and partitions the job, records its metadata and dispatches
    /// every batch. A failed dispatch is recorded and does not stop the rest.
    pub fn submit(&self, job: SearchJob) -> CdsResult<DispatchReport> {
        job.params.validate()?;
        validate_masks(&job.masks)?;
        if self.config.batch_size == 0 {
            return Err(CdsError::InvalidParameter {
                name: "batchSize",
                reason: "must be positive".to_string(),
            });
        }
        if self.config.max_parallelism == 0 {
            return Err(CdsError::InvalidParameter {
                name: "maxParallelism",
                reason: "must be positive".to_string(),
            });
        }

        let job_id = job
            .job_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let total = job.target_keys.len();
        let ranges = plan_batches(total, self.config.batch_size, self.config.max_parallelism);
        let batch_size = ranges.first().map_or(self.config.batch_size, |r| r.end - r.start);

        let _span = trace_span!("dispatch", targets = total, batches = ranges.len()).entered();

        self.jobs.create(JobMetadata {
            job_id: job_id.clone(),
            params: job.params.clone(),
            masks: job.masks.clone(),
            buckets: job.buckets.clone(),
            target_count: total,
            batch_size,
            partitions: ranges.len(),
            started_at: Utc::now(),
            status: JobStatus::Dispatching,
            failed_batches: Vec::new(),
            total_matches: None,
            finished_at: None,
            error_message: None,
        })?;

        let mut failures = Vec::new();
        let mut failed_batches = Vec::new();
        for range in &ranges {
            let task = BatchTask {
                job_id: job_id.clone(),
                batch_id: range.batch_id,
                start_index: range.start,
                end_index: range.end,
                target_keys: job.target_keys[range.start..range.end].to_vec(),
                masks: job.masks.clone(),
                params: job.params.clone(),
                buckets: job.buckets.clone(),
            };
            if let Err(err) = self.dispatcher.dispatch(task) {
                let reason = err.to_string();
                trace_warn!(
                    "batch dispatch failed",
                    batch_id = range.batch_id,
                    reason = reason.as_str()
                );
                failed_batches.push(range.batch_id);
                failures.push(CdsError::BatchDispatch {
                    batch_id: range.batch_id,
                    reason,
                });
            }
        }

        let error_message = (!failed_batches.is_empty())
            .then(|| format!("failed to dispatch {} batches", failed_batches.len()));
        self.jobs.update(
            &job_id,
            JobUpdate {
                status: Some(JobStatus::Running),
                failed_batches: failed_batches.clone(),
                error_message,
                ..JobUpdate::default()
            },
        )?;

        trace_event!(
            "batches_dispatched",
            dispatched = ranges.len() - failures.len(),
            failed = failures.len()
        );
        Ok(DispatchReport {
            job_id,
            partitions: ranges.len(),
            batch_size,
            dispatched: ranges.len() - failures.len(),
            failures,
        })
    }
}
