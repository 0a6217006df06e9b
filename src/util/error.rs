//! Error types for cdsearch.

use thiserror::Error;

/// Result alias for cdsearch operations.
pub type Result<T> = std::result::Result<T, CdsError>;

/// Errors that can occur while building masks, decoding MIPs or running a
/// search job.
///
/// Per-target and per-mask variants (`EmptyMask`, `UnsupportedFormat`,
/// `CorruptImage`) are recoverable inside a batch. Job-level variants
/// (`JobTimeout`, `JobFatal`, `MergeConflict`) are written to the job
/// metadata before they are returned.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CdsError {
    /// The input data or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// A named search parameter is out of range.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    /// Image dimensions are zero or overflow.
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// Pixel buffer is too small for the requested dimensions.
    #[error("buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// No pixel of the mask image is above the mask threshold.
    #[error("mask has no pixels above threshold {threshold}")]
    EmptyMask { threshold: u8 },
    /// The image container or one of its encodings is not supported.
    #[error("unsupported image format: {reason}")]
    UnsupportedFormat { reason: String },
    /// The image bytes are malformed.
    #[error("corrupt image: {reason}")]
    CorruptImage { reason: String },
    /// A batch could not be handed to the dispatcher.
    #[error("failed to dispatch batch {batch_id}: {reason}")]
    BatchDispatch { batch_id: usize, reason: String },
    /// The orchestration layer reported the job as timed out.
    #[error("job {job_id} timed out")]
    JobTimeout { job_id: String },
    /// The orchestration layer reported fatal errors for the job.
    #[error("job {job_id} completed with {} fatal errors", errors.len())]
    JobFatal { job_id: String, errors: Vec<String> },
    /// Two batch results claim the same mask id for different masks.
    #[error("cannot merge results for mask {mask_id}: {expected} differs from {found}")]
    MergeConflict {
        mask_id: String,
        expected: String,
        found: String,
    },
    /// An external store reported a failure.
    #[error("store error: {reason}")]
    Store { reason: String },
    /// A key or job does not exist in a store.
    #[error("not found: {what}")]
    NotFound { what: String },
    /// A batch payload could not be encoded or decoded.
    #[error("payload error: {reason}")]
    Payload { reason: String },
}

impl CdsError {
    /// Returns true for faults that only affect one target or one mask.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CdsError::EmptyMask { .. }
                | CdsError::UnsupportedFormat { .. }
                | CdsError::CorruptImage { .. }
                | CdsError::NotFound { .. }
        )
    }

    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        CdsError::CorruptImage {
            reason: reason.into(),
        }
    }

    pub(crate) fn store(err: impl std::fmt::Display) -> Self {
        CdsError::Store {
            reason: err.to_string(),
        }
    }

    pub(crate) fn payload(err: impl std::fmt::Display) -> Self {
        CdsError::Payload {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CdsError {
    fn from(err: serde_json::Error) -> Self {
        CdsError::payload(err)
    }
}
