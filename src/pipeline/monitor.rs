//! Readiness signal for a job: waits until every batch wrote its row.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::pipeline::JobOutcome;
use crate::store::{JobMetadataStore, TaskStore};
use crate::trace::trace_event;
use crate::util::CdsResult;

/// Polling settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            timeout: Duration::from_secs(15 * 60),
        }
    }
}

/// Compares the task-store row count of a job with its partition count.
pub struct JobMonitor {
    jobs: Arc<dyn JobMetadataStore>,
    tasks: Arc<dyn TaskStore>,
    config: MonitorConfig,
}

impl JobMonitor {
    pub fn new(
        jobs: Arc<dyn JobMetadataStore>,
        tasks: Arc<dyn TaskStore>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            jobs,
            tasks,
            config,
        }
    }

    /// Polls until every partition reported or the timeout expires.
    ///
    /// Batches that failed to dispatch can never report, so the wait ends
    /// once every dispatched batch is accounted for.
    pub fn wait(&self, job_id: &str) -> CdsResult<JobOutcome> {
        let meta = self.jobs.get(job_id)?;
        let expected = meta.partitions;
        let reachable = expected.saturating_sub(meta.failed_batches.len());
        let deadline = Instant::now() + self.config.timeout;
        loop {
            let rows = self.tasks.count(job_id)?;
            if rows >= reachable {
                trace_event!("job_ready", rows = rows, expected = expected);
                return Ok(JobOutcome {
                    completed: rows >= expected,
                    timed_out: false,
                    with_errors: !meta.failed_batches.is_empty(),
                    fatal_errors: Vec::new(),
                });
            }
            if Instant::now() >= deadline {
                trace_event!("job_timed_out", rows = rows, expected = expected);
                return Ok(JobOutcome {
                    completed: false,
                    timed_out: true,
                    with_errors: !meta.failed_batches.is_empty(),
                    fatal_errors: Vec::new(),
                });
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }
}
