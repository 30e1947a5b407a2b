//! JobDispatch - Task Queue and Worker Pool
//!
//! ## Responsibilities
//!
//! - Accept jobs without blocking the submitter
//! - Run jobs on a fixed set of workers, one job at a time per worker
//! - Contain job failures and panics to the failing job
//!
//! The queue is unbounded: sustained overload grows memory rather than
//! rejecting submissions. Each queued job is consumed by exactly one
//! worker, and a worker finishes its current job before pulling the
//! next, so jobs taken by the same worker run in dequeue order. There
//! is no cross-worker ordering and no cancellation.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// A unit of background work
pub struct Job {
    label: String,
    enqueued_at: DateTime<Utc>,
    task: BoxFuture<'static, Result<()>>,
}

impl Job {
    /// Package a future as a job. `label` names the job in logs.
    pub fn new<F>(label: impl Into<String>, task: F) -> Self
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            label: label.into(),
            enqueued_at: Utc::now(),
            task: task.boxed(),
        }
    }
}

/// Worker pool counters
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerPoolStats {
    /// Jobs accepted but not yet picked up
    pub queued: u64,
    /// Jobs that ran to completion
    pub completed: u64,
    /// Jobs that returned an error or panicked
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

type SharedReceiver = Arc<Mutex<mpsc::UnboundedReceiver<Job>>>;

/// WorkerPool instance
pub struct WorkerPool {
    tx: mpsc::UnboundedSender<Job>,
    counters: Arc<Counters>,
    worker_count: usize,
}

impl WorkerPool {
    /// Spawn `worker_count` workers draining a shared queue
    pub fn start(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let rx: SharedReceiver = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        for worker_id in 0..worker_count {
            let rx = Arc::clone(&rx);
            let counters = Arc::clone(&counters);
            tokio::spawn(worker_loop(worker_id, rx, counters));
        }

        tracing::info!(workers = worker_count, "Worker pool started");

        Self {
            tx,
            counters,
            worker_count,
        }
    }

    /// Queue a job for execution. Returns as soon as the job is
    /// accepted; execution happens on a worker.
    pub fn enqueue(&self, job: Job) -> Result<()> {
        let label = job.label.clone();
        self.counters.queued.fetch_add(1, Ordering::Relaxed);
        match self.tx.send(job) {
            Ok(()) => {
                tracing::debug!(job = %label, "Job enqueued");
                Ok(())
            }
            Err(_) => {
                self.counters.queued.fetch_sub(1, Ordering::Relaxed);
                Err(Error::Dispatch(format!("job queue closed, dropped {label}")))
            }
        }
    }

    /// Number of workers
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Queue and completion counters
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

async fn worker_loop(worker_id: usize, rx: SharedReceiver, counters: Arc<Counters>) {
    loop {
        // Hold the receiver lock only for the dequeue so idle workers
        // can race for the next job while this one runs.
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };

        let job = match job {
            Some(job) => job,
            None => {
                tracing::debug!(worker_id = worker_id, "Job queue closed, worker exiting");
                break;
            }
        };

        counters.queued.fetch_sub(1, Ordering::Relaxed);
        let Job {
            label,
            enqueued_at,
            task,
        } = job;
        let queued_ms = (Utc::now() - enqueued_at).num_milliseconds();
        tracing::debug!(
            worker_id = worker_id,
            job = %label,
            queued_ms = queued_ms,
            "Job started"
        );

        // Both error returns and panics stay contained in the job; the
        // worker keeps pulling either way.
        match AssertUnwindSafe(task).catch_unwind().await {
            Ok(Ok(())) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(worker_id = worker_id, job = %label, "Job finished");
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    worker_id = worker_id,
                    job = %label,
                    error = %e,
                    "Job failed"
                );
            }
            Err(_) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(worker_id = worker_id, job = %label, "Job panicked");
            }
        }
    }
}
