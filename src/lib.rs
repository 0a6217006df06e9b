//! cdsearch is a CPU-first color depth MIP search library.
//!
//! A query mask is matched against a library of color depth maximum
//! intensity projections by counting mask pixels whose target pixel has a
//! close enough hue. The crate provides the mask builder, a partial TIFF
//! decoder, scalar and `rayon` scoring kernels, and a scatter/gather
//! pipeline that splits a library into batches and merges their results.

mod trace;

pub mod config;
pub mod image;
pub mod kernel;
pub mod mask;
pub mod metrics;
pub mod pipeline;
pub mod results;
pub mod search;
pub mod store;
pub mod util;

pub use config::SearchParams;
pub use image::{decode_range, DecodeRange, DecodedImage, ImageFormat};
pub use kernel::{Kernel, Scalar};
pub use mask::{ColorDepthMask, MaskBuilder, MaskLayer, MaskOptions};
pub use metrics::{class_gap, pixel_gap, MatchThresholds, PixelClass};
pub use pipeline::{
    AggregationReport, BatchTask, BatchWorker, JobMonitor, JobOutcome, MaskSpec,
    ResultAggregator, SearchCoordinator, SearchJob, WorkQueue, WorkerPool,
};
pub use results::{MaskMatches, TargetMatch, TargetMetadata};
pub use search::{ColorDepthMatcher, MatchScore};
pub use util::{CdsError, CdsResult};
