//! Batch worker: scores every mask of a task against its slice of targets.

use std::sync::Arc;

use chrono::{Duration, Utc};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::image::{decode_range, DecodeRange, DecodedImage, ImageFormat};
use crate::mask::{ColorDepthMask, MaskBuilder};
use crate::pipeline::{BatchTask, MaskSpec};
use crate::results::{
    keys, object_url, BatchPayload, MaskMatches, TargetMatch, TargetMetadata, JSON_MIME_TYPE,
};
use crate::search::{ColorDepthMatcher, MatchScore};
use crate::store::{BatchResult, BlobStore, TaskStore};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::CdsResult;

/// Worker settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Lifetime of a written batch row.
    pub result_ttl: Duration,
    /// Also write each batch payload to the results bucket for inspection.
    pub write_intermediate: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            result_ttl: Duration::minutes(60),
            write_intermediate: false,
        }
    }
}

/// Counters of one batch run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub job_id: String,
    pub batch_id: usize,
    pub masks_used: usize,
    pub masks_skipped: usize,
    pub targets_scanned: usize,
    pub targets_skipped: usize,
    pub matches: usize,
}

struct PreparedMask {
    spec_key: String,
    mask: ColorDepthMask,
    matches: MaskMatches,
}

/// Stateless executor of [`BatchTask`]s.
pub struct BatchWorker {
    blobs: Arc<dyn BlobStore>,
    tasks: Arc<dyn TaskStore>,
    config: WorkerConfig,
}

impl BatchWorker {
    pub fn new(blobs: Arc<dyn BlobStore>, tasks: Arc<dyn TaskStore>, config: WorkerConfig) -> Self {
        Self {
            blobs,
            tasks,
            config,
        }
    }

    /// Runs one batch and writes exactly one result row for it.
    ///
    /// Masks that are empty or cannot be decoded, and targets that cannot be
    /// fetched or decoded, are logged and skipped.
    pub fn run(&self, task: &BatchTask) -> CdsResult<BatchSummary> {
        let _span = trace_span!(
            "batch",
            batch_id = task.batch_id,
            targets = task.target_keys.len(),
            masks = task.masks.len()
        )
        .entered();

        task.params.validate()?;
        let matcher = ColorDepthMatcher::new(&task.params);
        let mut summary = BatchSummary {
            job_id: task.job_id.clone(),
            batch_id: task.batch_id,
            ..BatchSummary::default()
        };

        let mut masks = Vec::with_capacity(task.masks.len());
        for spec in &task.masks {
            match self.prepare_mask(task, spec) {
                Ok(mask) => masks.push(mask),
                Err(err) if err.is_recoverable() => {
                    let reason = err.to_string();
                    trace_warn!(
                        "skipping mask",
                        mask = spec.key.as_str(),
                        reason = reason.as_str()
                    );
                    summary.masks_skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }
        summary.masks_used = masks.len();

        if !masks.is_empty() {
            let range = masks
                .iter()
                .map(|m| m.mask.decode_range())
                .reduce(DecodeRange::union)
                .unwrap_or_default();
            let scored = self.score_targets(task, &masks, &matcher, range);
            for (key, outcome) in task.target_keys.iter().zip(scored) {
                match outcome {
                    Ok(hits) => {
                        summary.targets_scanned += 1;
                        if hits.is_empty() {
                            continue;
                        }
                        let meta = TargetMetadata::from_library_key(
                            key,
                            &task.buckets.url_base,
                            &task.buckets.library,
                            &task.buckets.thumbnails,
                        );
                        for (mask_idx, score) in hits {
                            masks[mask_idx].matches.results.push(TargetMatch::new(&meta, score));
                            summary.matches += 1;
                        }
                    }
                    Err(err) if err.is_recoverable() => {
                        let reason = err.to_string();
                        trace_warn!(
                            "skipping target",
                            target = key.as_str(),
                            reason = reason.as_str()
                        );
                        summary.targets_skipped += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        let matches: Vec<MaskMatches> = masks
            .into_iter()
            .filter(|m| !m.matches.results.is_empty())
            .map(|mut m| {
                m.matches.rank(None);
                m.matches
            })
            .collect();
        let payload = BatchPayload::encode(&matches)?;

        if self.config.write_intermediate {
            if let Some(first) = task.masks.first() {
                let key = keys::intermediate_results_key(&first.key, task.batch_id);
                let json = serde_json::to_vec(&matches)?;
                self.blobs
                    .put(&task.buckets.results, &key, json, JSON_MIME_TYPE)?;
            }
        }

        self.tasks.append(BatchResult {
            job_id: task.job_id.clone(),
            batch_id: task.batch_id,
            ttl: Utc::now() + self.config.result_ttl,
            payload,
        })?;

        trace_event!(
            "batch_done",
            scanned = summary.targets_scanned,
            skipped = summary.targets_skipped,
            matches = summary.matches
        );
        Ok(summary)
    }

    fn prepare_mask(&self, task: &BatchTask, spec: &MaskSpec) -> CdsResult<PreparedMask> {
        let bucket = &task.buckets.masks;
        let image = self.load_image(bucket, &spec.key, DecodeRange::Full)?;
        let negative = match &spec.negative {
            Some(neg) => Some((self.load_image(bucket, &neg.key, DecodeRange::Full)?, neg.threshold)),
            None => None,
        };
        let options = task
            .params
            .mask_options(spec.threshold, negative.as_ref().map_or(0, |(_, t)| *t));
        let mask = MaskBuilder::new(options).build(&image, negative.as_ref().map(|(img, _)| img))?;
        let url = object_url(&task.buckets.url_base, bucket, &spec.key);
        Ok(PreparedMask {
            spec_key: spec.key.clone(),
            mask,
            matches: MaskMatches::for_mask(&spec.key, url),
        })
    }

    fn load_image(&self, bucket: &str, key: &str, range: DecodeRange) -> CdsResult<DecodedImage> {
        let format = ImageFormat::from_key(key)?;
        let bytes = self.blobs.get(bucket, key)?;
        decode_range(&bytes, format, range)
    }

    fn score_targets(
        &self,
        task: &BatchTask,
        masks: &[PreparedMask],
        matcher: &ColorDepthMatcher,
        range: DecodeRange,
    ) -> Vec<CdsResult<Vec<(usize, MatchScore)>>> {
        let score = |key: &String| self.score_target(task, key, masks, matcher, range);
        #[cfg(feature = "rayon")]
        {
            if task.params.parallel {
                return task.target_keys.par_iter().map(score).collect();
            }
        }
        task.target_keys.iter().map(score).collect()
    }

    fn score_target(
        &self,
        task: &BatchTask,
        key: &str,
        masks: &[PreparedMask],
        matcher: &ColorDepthMatcher,
        range: DecodeRange,
    ) -> CdsResult<Vec<(usize, MatchScore)>> {
        let target = self.load_image(&task.buckets.library, key, range)?;
        let mut hits = Vec::new();
        for (idx, prepared) in masks.iter().enumerate() {
            if !prepared.mask.fits(&target) {
                trace_warn!(
                    "target size differs from mask",
                    target = key,
                    mask = prepared.spec_key.as_str()
                );
                continue;
            }
            if let Some(score) = matcher.score(&prepared.mask, &target) {
                hits.push((idx, score));
            }
        }
        Ok(hits)
    }
}
