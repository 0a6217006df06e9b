//! Scatter/gather search pipeline.
//!
//! [`SearchCoordinator`] splits the target library into batches and hands
//! each [`BatchTask`] to a [`BatchDispatcher`]. [`BatchWorker`]s score every
//! mask of the task against their slice of targets and write one row per
//! batch to the task store. Once the job is reported finished, the
//! [`ResultAggregator`] merges the rows into one ranked result per mask.

use serde::{Deserialize, Serialize};

use std::collections::HashSet;

use crate::config::SearchParams;
use crate::image::ImageFormat;
use crate::util::{CdsError, CdsResult};

mod aggregator;
mod coordinator;
mod monitor;
mod queue;
mod worker;

pub use aggregator::{AggregationReport, AggregatorConfig, ResultAggregator};
pub use coordinator::{
    plan_batches, BatchRange, CoordinatorConfig, DispatchReport, SearchCoordinator,
};
pub use monitor::{JobMonitor, MonitorConfig};
pub use queue::{PoolReport, WorkQueue, WorkerPool};
pub use worker::{BatchSummary, BatchWorker, WorkerConfig};

/// A query mask and its threshold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskSpec {
    /// Key of the mask image in the mask bucket.
    pub key: String,
    /// Mask pixels need some channel above this value.
    pub threshold: u8,
    /// Optional negative mask whose matches are subtracted.
    #[serde(default)]
    pub negative: Option<NegativeMaskSpec>,
}

impl MaskSpec {
    pub fn new(key: impl Into<String>, threshold: u8) -> Self {
        Self {
            key: key.into(),
            threshold,
            negative: None,
        }
    }

    /// Rejects specs that no worker could load: empty keys, unknown image
    /// extensions and zero thresholds.
    pub fn validate(&self) -> CdsResult<()> {
        check_image(&self.key, self.threshold, "mask")?;
        if let Some(neg) = &self.negative {
            check_image(&neg.key, neg.threshold, "negativeMask")?;
        }
        Ok(())
    }
}

fn check_image(key: &str, threshold: u8, name: &'static str) -> CdsResult<()> {
    if key.trim().is_empty() {
        return Err(CdsError::InvalidParameter {
            name,
            reason: "key is empty".to_string(),
        });
    }
    if let Err(err) = ImageFormat::from_key(key) {
        return Err(CdsError::InvalidParameter {
            name,
            reason: err.to_string(),
        });
    }
    if threshold == 0 {
        return Err(CdsError::InvalidParameter {
            name,
            reason: format!("threshold for {key} must be positive"),
        });
    }
    Ok(())
}

/// Validates every spec of a request and rejects repeated mask keys.
pub(crate) fn validate_masks(masks: &[MaskSpec]) -> CdsResult<()> {
    if masks.is_empty() {
        return Err(CdsError::InvalidInput("a search needs at least one mask"));
    }
    let mut keys = HashSet::new();
    for spec in masks {
        spec.validate()?;
        if !keys.insert(spec.key.as_str()) {
            return Err(CdsError::InvalidParameter {
                name: "mask",
                reason: format!("{} is listed twice", spec.key),
            });
        }
    }
    Ok(())
}

/// Negative mask attached to a [`MaskSpec`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegativeMaskSpec {
    pub key: String,
    pub threshold: u8,
}

/// Where a job reads inputs and writes outputs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Buckets {
    /// Holds mask images.
    pub masks: String,
    /// Holds searchable library images.
    pub library: String,
    /// Holds library thumbnails; only used to build URLs.
    pub thumbnails: String,
    /// Receives final and intermediate results.
    pub results: String,
    /// Prefix of public object URLs.
    pub url_base: String,
}

impl Default for Buckets {
    fn default() -> Self {
        Self {
            masks: "masks".to_string(),
            library: "library".to_string(),
            thumbnails: "thumbnails".to_string(),
            results: "results".to_string(),
            url_base: "https://s3.amazonaws.com".to_string(),
        }
    }
}

/// A search request before partitioning.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchJob {
    /// Job id; generated when absent.
    pub job_id: Option<String>,
    pub masks: Vec<MaskSpec>,
    /// Ordered library keys to search.
    pub target_keys: Vec<String>,
    pub params: SearchParams,
    pub buckets: Buckets,
}

/// Self-contained unit of work for one batch worker.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchTask {
    pub job_id: String,
    pub batch_id: usize,
    /// First target index covered, inclusive.
    pub start_index: usize,
    /// Last target index covered, exclusive.
    pub end_index: usize,
    /// Library keys `start_index..end_index` of the job.
    pub target_keys: Vec<String>,
    pub masks: Vec<MaskSpec>,
    pub params: SearchParams,
    pub buckets: Buckets,
}

/// Completion signal for a job, as reported by the orchestration layer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JobOutcome {
    /// Every expected batch reported back.
    pub completed: bool,
    pub timed_out: bool,
    /// Some batches failed but the job ran to the end.
    pub with_errors: bool,
    /// Errors that make the job's results unusable.
    pub fatal_errors: Vec<String>,
}

impl JobOutcome {
    /// Outcome of a job whose batches all reported back cleanly.
    pub fn completed() -> Self {
        Self {
            completed: true,
            ..Self::default()
        }
    }
}
