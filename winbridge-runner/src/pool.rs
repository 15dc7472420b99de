//! Fixed-concurrency pool of bridge executions.
//!
//! Jobs go through a bounded queue (`2 × concurrency`), so `submit` applies
//! backpressure once it is full. Exactly `concurrency` workers pull from it,
//! one job at a time, and push one [`JobOutcome`] per job onto an unbounded
//! result queue in completion order. `shutdown` closes the queue, waits for
//! the workers to drain it and thereby closes the result stream. `cancel`
//! trips a pool-wide token that reaches every running execution; queued jobs
//! picked up afterwards fail with [`BridgeError::Cancelled`] without
//! launching anything.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use crate::command::{CommandSpec, ExecutionResult};
use crate::error::{BridgeError, PoolError};
use crate::executor::CommandExecutor;

/// Correlation token attached to each submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// The single terminal outcome of one submitted job.
#[derive(Debug)]
pub struct JobOutcome {
    pub id: JobId,
    pub spec: CommandSpec,
    pub result: Result<ExecutionResult, BridgeError>,
}

struct Job {
    id: JobId,
    spec: CommandSpec,
}

/// Receiving end of the pool's results; ends after `shutdown` completes.
#[derive(Debug)]
pub struct ResultStream {
    rx: mpsc::UnboundedReceiver<JobOutcome>,
}

impl ResultStream {
    /// Next outcome, or `None` once the pool has shut down and drained.
    pub async fn recv(&mut self) -> Option<JobOutcome> {
        self.rx.recv().await
    }

    /// Wait for every remaining outcome.
    pub async fn drain(mut self) -> Vec<JobOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.rx.recv().await {
            outcomes.push(outcome);
        }
        outcomes
    }
}

pub struct WorkerPool {
    concurrency: usize,
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    results: Mutex<Option<ResultStream>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    next_id: AtomicU64,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("concurrency", &self.concurrency)
            .field("accepting", &self.jobs.lock().is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl WorkerPool {
    /// Start `concurrency` workers; `0` uses the host's parallelism.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(executor: Arc<dyn CommandExecutor>, concurrency: usize) -> Self {
        Self::with_cancellation(executor, concurrency, CancellationToken::new())
    }

    /// Like [`WorkerPool::new`], with the pool token derived from `parent`.
    pub fn with_cancellation(
        executor: Arc<dyn CommandExecutor>,
        concurrency: usize,
        parent: CancellationToken,
    ) -> Self {
        let concurrency = effective_concurrency(concurrency);
        let (job_tx, job_rx) = mpsc::channel::<Job>(concurrency * 2);
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));
        let cancel = parent.child_token();

        let workers = (0..concurrency)
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    Arc::clone(&executor),
                    Arc::clone(&job_rx),
                    result_tx.clone(),
                    cancel.clone(),
                ))
            })
            .collect();
        debug!(concurrency, "worker pool started");

        Self {
            concurrency,
            jobs: Mutex::new(Some(job_tx)),
            results: Mutex::new(Some(ResultStream { rx: result_rx })),
            workers: Mutex::new(workers),
            cancel,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Enqueue a job, waiting while the queue is full.
    pub async fn submit(&self, spec: CommandSpec) -> Result<JobId, PoolError> {
        let sender = self.jobs.lock().clone().ok_or(PoolError::Closed)?;
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(job_id = %id, command = %spec.command, "job submitted");
        sender
            .send(Job { id, spec })
            .await
            .map_err(|_| PoolError::Closed)?;
        Ok(id)
    }

    /// Take the result stream. Only the first call returns it.
    pub fn results(&self) -> Option<ResultStream> {
        self.results.lock().take()
    }

    /// Stop accepting jobs and wait for queued and running ones to finish.
    pub async fn shutdown(&self) {
        drop(self.jobs.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(err) = handle.await {
                warn!(error = %err, "pool worker ended abnormally");
            }
        }
        debug!("worker pool drained");
    }

    /// Abort running jobs and fail every job not yet started.
    pub fn cancel(&self) {
        debug!("worker pool cancelled");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token observed by every execution in this pool.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

fn effective_concurrency(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get().max(1)
    } else {
        requested
    }
}

async fn run_worker(
    worker: usize,
    executor: Arc<dyn CommandExecutor>,
    jobs: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    results: mpsc::UnboundedSender<JobOutcome>,
    cancel: CancellationToken,
) {
    loop {
        let next = jobs.lock().await.recv().await;
        let Some(Job { id, spec }) = next else {
            break;
        };

        let span = info_span!("job", job_id = %id, worker, command = %spec.command);
        let result = if cancel.is_cancelled() {
            Err(BridgeError::Cancelled)
        } else {
            executor.execute(&cancel, &spec).instrument(span.clone()).await
        };

        span.in_scope(|| match &result {
            Ok(outcome) => debug!(exit_code = outcome.exit_code, "job finished"),
            Err(err) => debug!(error = %err, "job failed"),
        });
        if results.send(JobOutcome { id, spec, result }).is_err() {
            debug!(job_id = %id, "result stream dropped; outcome discarded");
        }
    }
    debug!(worker, "pool worker exiting");
}
