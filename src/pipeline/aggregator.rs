//! Gathers batch rows into one ranked result document per mask.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::pipeline::JobOutcome;
use crate::results::{keys, object_url, MaskMatches, JSON_MIME_TYPE};
use crate::store::{
    BlobStore, JobMetadata, JobMetadataStore, JobStatus, JobUpdate, ModelLinkStore, TaskStore,
};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{CdsError, CdsResult};

const FATAL_MESSAGE: &str = "Color depth search completed with fatal errors";
const TIMEOUT_MESSAGE: &str = "Color depth search timed out";
const ERRORS_MESSAGE: &str = "Color depth search completed with errors";

/// Aggregation settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Leave batch rows and intermediate blobs in place.
    pub keep_intermediate: bool,
}

/// What an aggregation produced.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregationReport {
    pub job_id: String,
    pub status: JobStatus,
    pub total_matches: usize,
    /// Final documents, in mask order.
    pub results: Vec<MaskMatches>,
    /// Keys written to the results bucket.
    pub result_keys: Vec<String>,
    /// Partitions that never wrote a row.
    pub missing_batches: Vec<usize>,
}

/// Merges the batch rows of a finished job.
pub struct ResultAggregator {
    blobs: Arc<dyn BlobStore>,
    tasks: Arc<dyn TaskStore>,
    jobs: Arc<dyn JobMetadataStore>,
    links: Option<Arc<dyn ModelLinkStore>>,
    config: AggregatorConfig,
}

impl ResultAggregator {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        tasks: Arc<dyn TaskStore>,
        jobs: Arc<dyn JobMetadataStore>,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            blobs,
            tasks,
            jobs,
            links: None,
            config,
        }
    }

    /// Resolves 3D model links of surviving matches through `links`.
    pub fn with_model_links(mut self, links: Arc<dyn ModelLinkStore>) -> Self {
        self.links = Some(links);
        self
    }

    /// Aggregates a job once the orchestration layer reported `outcome`.
    ///
    /// Fatal errors and timeouts are recorded on the job and returned without
    /// reading any batch row.
    pub fn aggregate(&self, job_id: &str, outcome: &JobOutcome) -> CdsResult<AggregationReport> {
        let _span = trace_span!("aggregate").entered();
        let meta = self.jobs.get(job_id)?;

        if !outcome.fatal_errors.is_empty() {
            trace_warn!("job completed with fatal errors", job_id = job_id);
            self.jobs.update(
                job_id,
                JobUpdate::finished(JobStatus::Failed, Some(FATAL_MESSAGE.to_string())),
            )?;
            return Err(CdsError::JobFatal {
                job_id: job_id.to_string(),
                errors: outcome.fatal_errors.clone(),
            });
        }
        if outcome.timed_out {
            trace_warn!("job timed out", job_id = job_id);
            self.jobs.update(
                job_id,
                JobUpdate::finished(JobStatus::TimedOut, Some(TIMEOUT_MESSAGE.to_string())),
            )?;
            return Err(CdsError::JobTimeout {
                job_id: job_id.to_string(),
            });
        }
        let degraded = outcome.with_errors || !outcome.completed;
        if degraded {
            trace_warn!("job completed with errors", job_id = job_id);
            self.jobs.update(
                job_id,
                JobUpdate {
                    error_message: Some(ERRORS_MESSAGE.to_string()),
                    ..JobUpdate::default()
                },
            )?;
        }

        let (merged, seen_batches) = match self.collect(&meta) {
            Ok(collected) => collected,
            Err(err) => {
                self.jobs.update(
                    job_id,
                    JobUpdate::finished(JobStatus::Failed, Some(err.to_string())),
                )?;
                return Err(err);
            }
        };

        let missing_batches: Vec<usize> = (0..meta.partitions)
            .filter(|id| !seen_batches.contains(id))
            .collect();
        if !missing_batches.is_empty() {
            trace_warn!(
                "batches missing from the task store",
                job_id = job_id,
                missing = missing_batches.len()
            );
        }

        let mut documents = self.documents(&meta, merged);
        self.finish_documents(
            &mut documents,
            meta.params.max_results_per_mask,
            meta.params.parallel,
        );

        let total_matches = documents.iter().map(|(_, doc)| doc.results.len()).sum();
        let mut result_keys = Vec::with_capacity(documents.len());
        for (mask_key, doc) in &documents {
            let key = keys::search_results_key(mask_key);
            let body = serde_json::to_vec(doc)?;
            self.blobs
                .put(&meta.buckets.results, &key, body, JSON_MIME_TYPE)?;
            result_keys.push(key);
        }

        let status = if degraded || !missing_batches.is_empty() {
            JobStatus::CompletedWithErrors
        } else {
            JobStatus::Completed
        };
        let error_message = (!missing_batches.is_empty())
            .then(|| format!("missing results for batches {missing_batches:?}"));
        self.jobs.update(
            job_id,
            JobUpdate {
                total_matches: Some(total_matches),
                ..JobUpdate::finished(status, error_message)
            },
        )?;

        if !self.config.keep_intermediate {
            self.cleanup(&meta)?;
        }

        trace_event!(
            "aggregated",
            masks = documents.len(),
            total_matches = total_matches,
            missing = missing_batches.len()
        );
        Ok(AggregationReport {
            job_id: job_id.to_string(),
            status,
            total_matches,
            results: documents.into_iter().map(|(_, doc)| doc).collect(),
            result_keys,
            missing_batches,
        })
    }

    /// Reads every live row of the job and folds it into per-mask lists,
    /// keyed by mask image URL.
    fn collect(
        &self,
        meta: &JobMetadata,
    ) -> CdsResult<(BTreeMap<String, MaskMatches>, BTreeSet<usize>)> {
        let mut acc = Accumulator::new(meta);
        let mut seen = BTreeSet::new();
        let mut after = None;
        loop {
            let page = self.tasks.query(&meta.job_id, after)?;
            for row in &page.rows {
                seen.insert(row.batch_id);
                for incoming in row.payload.decode()? {
                    acc.merge(incoming)?;
                }
            }
            match page.next {
                Some(next) => after = Some(next),
                None => break,
            }
        }
        Ok((acc.merged, seen))
    }

    /// One document per requested mask, in request order; masks without
    /// matches get an empty document.
    fn documents(
        &self,
        meta: &JobMetadata,
        mut merged: BTreeMap<String, MaskMatches>,
    ) -> Vec<(String, MaskMatches)> {
        let mut out = Vec::with_capacity(meta.masks.len());
        for spec in &meta.masks {
            let url = mask_url(meta, &spec.key);
            let doc = merged
                .remove(&url)
                .unwrap_or_else(|| MaskMatches::for_mask(&spec.key, url));
            out.push((spec.key.clone(), doc));
        }
        for (_, doc) in merged {
            trace_warn!("results for an unrequested mask", mask_id = doc.mask_id.as_str());
            out.push((doc.mask_id.clone(), doc));
        }
        out
    }

    #[cfg_attr(not(feature = "rayon"), allow(unused_variables))]
    fn finish_documents(
        &self,
        documents: &mut [(String, MaskMatches)],
        limit: Option<usize>,
        parallel: bool,
    ) {
        #[cfg(feature = "rayon")]
        {
            if parallel {
                documents
                    .par_iter_mut()
                    .for_each(|(_, doc)| self.finish_document(doc, limit));
                return;
            }
        }
        documents
            .iter_mut()
            .for_each(|(_, doc)| self.finish_document(doc, limit));
    }

    /// Ranks one document and fills in 3D model links.
    fn finish_document(&self, doc: &mut MaskMatches, limit: Option<usize>) {
        doc.rank(limit);
        let Some(links) = &self.links else {
            return;
        };
        for result in &mut doc.results {
            let Some(name) = result.published_name.as_deref() else {
                continue;
            };
            match links.lookup(name) {
                Ok(Some(found)) => {
                    result.skeleton_swc = found.skeleton_swc;
                    result.skeleton_obj = found.skeleton_obj;
                }
                Ok(None) => {}
                Err(err) => {
                    let reason = err.to_string();
                    trace_warn!(
                        "model link lookup failed",
                        published_name = name,
                        reason = reason.as_str()
                    );
                }
            }
        }
    }

    fn cleanup(&self, meta: &JobMetadata) -> CdsResult<()> {
        let rows = self.tasks.delete_job(&meta.job_id)?;
        let mut blobs = 0;
        let prefixes: BTreeSet<String> = meta
            .masks
            .iter()
            .map(|spec| format!("{}/", keys::intermediate_results_prefix(&spec.key)))
            .collect();
        for prefix in &prefixes {
            blobs += self.blobs.delete(&meta.buckets.results, prefix)?;
        }
        trace_event!("cleanup", rows = rows, blobs = blobs);
        Ok(())
    }
}

fn mask_url(meta: &JobMetadata, key: &str) -> String {
    object_url(&meta.buckets.url_base, &meta.buckets.masks, key)
}

/// Per-mask merge state. Masks are told apart by image URL, so masks that
/// share a file name in different folders stay separate.
struct Accumulator {
    merged: BTreeMap<String, MaskMatches>,
    targets: HashMap<String, HashSet<String>>,
    requested: HashSet<String>,
    /// Image URL each mask id is bound to; requested masks bind first.
    urls_by_id: HashMap<String, String>,
}

impl Accumulator {
    fn new(meta: &JobMetadata) -> Self {
        let mut requested = HashSet::new();
        let mut urls_by_id = HashMap::new();
        for spec in &meta.masks {
            let url = mask_url(meta, &spec.key);
            urls_by_id
                .entry(keys::search_mask_id(&spec.key))
                .or_insert_with(|| url.clone());
            requested.insert(url);
        }
        Self {
            merged: BTreeMap::new(),
            targets: HashMap::new(),
            requested,
            urls_by_id,
        }
    }

    fn merge(&mut self, incoming: MaskMatches) -> CdsResult<()> {
        if !self.requested.contains(&incoming.mask_image_url) {
            let expected = self
                .urls_by_id
                .entry(incoming.mask_id.clone())
                .or_insert_with(|| incoming.mask_image_url.clone());
            if *expected != incoming.mask_image_url {
                return Err(CdsError::MergeConflict {
                    mask_id: incoming.mask_id,
                    expected: expected.clone(),
                    found: incoming.mask_image_url,
                });
            }
        }

        let seen = self
            .targets
            .entry(incoming.mask_image_url.clone())
            .or_default();
        for result in &incoming.results {
            if !seen.insert(result.image_name.clone()) {
                trace_warn!(
                    "duplicate target in merged results",
                    mask_id = incoming.mask_id.as_str(),
                    target = result.image_name.as_str()
                );
            }
        }
        match self.merged.get_mut(&incoming.mask_image_url) {
            Some(existing) => existing.results.extend(incoming.results),
            None => {
                self.merged.insert(incoming.mask_image_url.clone(), incoming);
            }
        }
        Ok(())
    }
}
