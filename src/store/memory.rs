//! In-memory store implementations.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use crate::store::{
    BatchResult, BlobStore, JobMetadata, JobMetadataStore, JobUpdate, ModelLinkStore, ModelLinks,
    TaskPage, TaskStore,
};
use crate::util::{CdsError, CdsResult};

#[derive(Clone, Debug)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// Blob store keeping objects in a sorted map.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: RwLock<BTreeMap<(String, String), StoredObject>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the content type an object was stored with.
    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|obj| obj.content_type.clone())
    }

    /// Number of stored objects across all buckets.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, bucket: &str, key: &str) -> CdsResult<Vec<u8>> {
        self.objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|obj| obj.bytes.clone())
            .ok_or_else(|| CdsError::NotFound {
                what: format!("{bucket}/{key}"),
            })
    }

    fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: &str) -> CdsResult<()> {
        self.objects.write().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn head_exists(&self, bucket: &str, key: &str) -> CdsResult<bool> {
        Ok(self
            .objects
            .read()
            .contains_key(&(bucket.to_string(), key.to_string())))
    }

    fn list_keys(&self, bucket: &str, prefix: &str) -> CdsResult<Vec<String>> {
        Ok(self
            .objects
            .read()
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect())
    }

    fn delete(&self, bucket: &str, prefix: &str) -> CdsResult<usize> {
        let mut objects = self.objects.write();
        let before = objects.len();
        objects.retain(|(b, k), _| !(b == bucket && k.starts_with(prefix)));
        Ok(before - objects.len())
    }
}

/// Task store holding rows per `(job_id, batch_id)` with TTL expiry.
#[derive(Debug)]
pub struct MemoryTaskStore {
    rows: Mutex<BTreeMap<(String, usize), BatchResult>>,
    page_size: usize,
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::with_page_size(100)
    }
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store returning at most `page_size` rows per query.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }
}

impl TaskStore for MemoryTaskStore {
    fn append(&self, row: BatchResult) -> CdsResult<()> {
        let now = Utc::now();
        let mut rows = self.rows.lock();
        rows.retain(|_, r| r.ttl > now);
        rows.insert((row.job_id.clone(), row.batch_id), row);
        Ok(())
    }

    fn query(&self, job_id: &str, after: Option<usize>) -> CdsResult<TaskPage> {
        let start = match after {
            None => 0,
            Some(a) => match a.checked_add(1) {
                Some(start) => start,
                None => return Ok(TaskPage::default()),
            },
        };
        let now = Utc::now();
        let rows = self.rows.lock();
        let mut live = rows
            .range((job_id.to_string(), start)..=(job_id.to_string(), usize::MAX))
            .map(|(_, r)| r)
            .filter(|r| r.ttl > now);
        let page: Vec<BatchResult> = live.by_ref().take(self.page_size).cloned().collect();
        let next = match (live.next(), page.last()) {
            (Some(_), Some(last)) => Some(last.batch_id),
            _ => None,
        };
        Ok(TaskPage { rows: page, next })
    }

    fn count(&self, job_id: &str) -> CdsResult<usize> {
        let now = Utc::now();
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|((job, _), r)| job == job_id && r.ttl > now)
            .count())
    }

    fn delete_job(&self, job_id: &str) -> CdsResult<usize> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|(job, _), _| job != job_id);
        Ok(before - rows.len())
    }
}

/// Job metadata kept in a hash map.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, JobMetadata>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobMetadataStore for MemoryJobStore {
    fn create(&self, meta: JobMetadata) -> CdsResult<()> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&meta.job_id) {
            return Err(CdsError::Store {
                reason: format!("job {} already exists", meta.job_id),
            });
        }
        jobs.insert(meta.job_id.clone(), meta);
        Ok(())
    }

    fn update(&self, job_id: &str, update: JobUpdate) -> CdsResult<JobMetadata> {
        let mut jobs = self.jobs.write();
        let meta = jobs.get_mut(job_id).ok_or_else(|| CdsError::NotFound {
            what: format!("job {job_id}"),
        })?;
        meta.apply(update);
        Ok(meta.clone())
    }

    fn get(&self, job_id: &str) -> CdsResult<JobMetadata> {
        self.jobs
            .read()
            .get(job_id)
            .cloned()
            .ok_or_else(|| CdsError::NotFound {
                what: format!("job {job_id}"),
            })
    }
}

/// Model links keyed by published name.
#[derive(Debug, Default)]
pub struct MemoryModelLinks {
    links: RwLock<HashMap<String, ModelLinks>>,
}

impl MemoryModelLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the links of a published name.
    pub fn insert(&self, published_name: impl Into<String>, links: ModelLinks) {
        self.links.write().insert(published_name.into(), links);
    }
}

impl FromIterator<(String, ModelLinks)> for MemoryModelLinks {
    fn from_iter<I: IntoIterator<Item = (String, ModelLinks)>>(iter: I) -> Self {
        Self {
            links: RwLock::new(iter.into_iter().collect()),
        }
    }
}

impl ModelLinkStore for MemoryModelLinks {
    fn lookup(&self, published_name: &str) -> CdsResult<Option<ModelLinks>> {
        Ok(self.links.read().get(published_name).cloned())
    }
}
