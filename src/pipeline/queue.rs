//! In-process dispatch: a blocking work queue drained by a worker pool.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::pipeline::{BatchSummary, BatchTask, BatchWorker};
use crate::store::BatchDispatcher;
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{CdsError, CdsResult};

#[derive(Debug, Default)]
struct QueueState {
    tasks: VecDeque<BatchTask>,
    closed: bool,
}

/// FIFO of batch tasks shared between a dispatcher and worker threads.
#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a task; fails once the queue is closed.
    pub fn push(&self, task: BatchTask) -> CdsResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(CdsError::BatchDispatch {
                batch_id: task.batch_id,
                reason: "work queue is closed".to_string(),
            });
        }
        state.tasks.push_back(task);
        self.ready.notify_one();
        Ok(())
    }

    /// Blocks until a task is available; `None` once closed and drained.
    pub fn pop(&self) -> Option<BatchTask> {
        let mut state = self.state.lock();
        loop {
            if let Some(task) = state.tasks.pop_front() {
                return Some(task);
            }
            if state.closed {
                return None;
            }
            self.ready.wait(&mut state);
        }
    }

    /// Stops accepting tasks and wakes every waiting worker.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BatchDispatcher for WorkQueue {
    fn dispatch(&self, task: BatchTask) -> CdsResult<()> {
        self.push(task)
    }
}

/// What a pool run processed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PoolReport {
    pub completed: Vec<BatchSummary>,
    /// Batches whose run failed, with the error.
    pub failed: Vec<(usize, CdsError)>,
}

/// Fixed number of threads running a [`BatchWorker`] over a [`WorkQueue`].
pub struct WorkerPool {
    worker: BatchWorker,
    threads: usize,
}

impl WorkerPool {
    pub fn new(worker: BatchWorker, threads: usize) -> Self {
        Self {
            worker,
            threads: threads.max(1),
        }
    }

    /// Drains `queue` until it is closed and empty.
    pub fn run(&self, queue: &WorkQueue) -> PoolReport {
        let _span = trace_span!("worker_pool", threads = self.threads).entered();
        let report = Mutex::new(PoolReport::default());
        std::thread::scope(|scope| {
            for _ in 0..self.threads {
                scope.spawn(|| {
                    while let Some(task) = queue.pop() {
                        match self.worker.run(&task) {
                            Ok(summary) => report.lock().completed.push(summary),
                            Err(err) => {
                                let reason = err.to_string();
                                trace_warn!(
                                    "batch failed",
                                    batch_id = task.batch_id,
                                    reason = reason.as_str()
                                );
                                report.lock().failed.push((task.batch_id, err));
                            }
                        }
                    }
                });
            }
        });
        let mut report = report.into_inner();
        report.completed.sort_by_key(|s| s.batch_id);
        report.failed.sort_by_key(|(id, _)| *id);
        trace_event!(
            "pool_done",
            completed = report.completed.len(),
            failed = report.failed.len()
        );
        report
    }
}
