//! Background Job Scheduler Implementation
//!
//! Tokio worker pool behind the [`JobScheduler`] contract. Each job kind is
//! dispatched to a registered [`JobWorker`]; concurrency is bounded by a
//! semaphore and every job carries a cancellation token shared with its tag.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    JobData, JobId, JobInfo, JobKind, JobRequest, JobScheduler, JobState,
};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::error::WorkerError;

/// Default number of jobs allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;

/// Finished jobs kept around so late observers still see the outcome.
const FINISHED_RETENTION: usize = 64;

/// Work performed for one [`JobKind`].
///
/// Workers should return promptly once `cancel` fires; the scheduler also
/// stops awaiting them at that point.
#[async_trait]
pub trait JobWorker: Send + Sync {
    async fn run(
        &self,
        inputs: JobData,
        cancel: CancellationToken,
    ) -> std::result::Result<JobData, WorkerError>;
}

struct JobEntry {
    tag: String,
    state: watch::Sender<JobInfo>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct JobTable {
    entries: HashMap<JobId, JobEntry>,
    finished: VecDeque<JobId>,
}

impl JobTable {
    /// Record a terminal job, evicting the oldest finished entries.
    fn retire(&mut self, id: JobId) {
        self.finished.push_back(id);
        while self.finished.len() > FINISHED_RETENTION {
            if let Some(oldest) = self.finished.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

/// Tokio-based job scheduler for desktop hosts.
pub struct TokioJobScheduler {
    workers: HashMap<JobKind, Arc<dyn JobWorker>>,
    jobs: Arc<Mutex<JobTable>>,
    permits: Arc<Semaphore>,
}

impl TokioJobScheduler {
    /// Create a scheduler with no workers and the default concurrency.
    pub fn new() -> Self {
        Self::with_max_concurrent(DEFAULT_MAX_CONCURRENT_JOBS)
    }

    pub fn with_max_concurrent(max_concurrent: usize) -> Self {
        Self {
            workers: HashMap::new(),
            jobs: Arc::new(Mutex::new(JobTable::default())),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Register the worker for `kind`, replacing any previous one.
    pub fn with_worker(mut self, kind: JobKind, worker: Arc<dyn JobWorker>) -> Self {
        self.workers.insert(kind, worker);
        self
    }

    /// Number of jobs that have not reached a terminal state.
    pub fn active_jobs(&self) -> usize {
        self.jobs
            .lock()
            .entries
            .values()
            .filter(|entry| !entry.state.borrow().state.is_terminal())
            .count()
    }

    fn publish(jobs: &Mutex<JobTable>, id: JobId, update: impl FnOnce(&mut JobInfo)) {
        let mut table = jobs.lock();
        let terminal = match table.entries.get(&id) {
            Some(entry) => {
                entry.state.send_modify(update);
                entry.state.borrow().state.is_terminal()
            }
            None => return,
        };
        if terminal {
            table.retire(id);
        }
    }

    async fn run_job(
        jobs: Arc<Mutex<JobTable>>,
        permits: Arc<Semaphore>,
        worker: Arc<dyn JobWorker>,
        id: JobId,
        inputs: JobData,
        cancel: CancellationToken,
    ) {
        let _permit = tokio::select! {
            permit = permits.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    Self::publish(&jobs, id, |info| {
                        info.state = JobState::Failed;
                        info.error = Some("scheduler shut down".to_string());
                    });
                    return;
                }
            },
            _ = cancel.cancelled() => {
                debug!("Job cancelled before it started");
                Self::publish(&jobs, id, |info| info.state = JobState::Cancelled);
                return;
            }
        };

        Self::publish(&jobs, id, |info| info.state = JobState::Running);

        let outcome = tokio::select! {
            result = worker.run(inputs, cancel.clone()) => Some(result),
            _ = cancel.cancelled() => None,
        };

        match outcome {
            Some(Ok(output)) => {
                debug!("Job succeeded");
                Self::publish(&jobs, id, |info| {
                    info.state = JobState::Succeeded;
                    info.output = output;
                });
            }
            Some(Err(WorkerError::Cancelled)) | None => {
                debug!("Job cancelled");
                Self::publish(&jobs, id, |info| info.state = JobState::Cancelled);
            }
            Some(Err(err)) => {
                warn!(error = %err, "Job failed");
                Self::publish(&jobs, id, |info| {
                    info.state = JobState::Failed;
                    info.error = Some(err.to_string());
                });
            }
        }
    }
}

impl Default for TokioJobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl JobScheduler for TokioJobScheduler {
    fn enqueue(&self, request: JobRequest) -> Result<JobId> {
        let worker = self.workers.get(&request.kind).cloned().ok_or_else(|| {
            BridgeError::Unsupported(format!("No worker registered for {:?} jobs", request.kind))
        })?;
        let runtime = Handle::try_current().map_err(|e| {
            BridgeError::NotAvailable(format!("Job scheduler needs a tokio runtime: {e}"))
        })?;

        let id = JobId::new();
        let (state, _) = watch::channel(JobInfo::enqueued(id));
        let cancel = CancellationToken::new();

        self.jobs.lock().entries.insert(
            id,
            JobEntry {
                tag: request.tag.clone(),
                state,
                cancel: cancel.clone(),
            },
        );

        debug!(job_id = %id, kind = ?request.kind, tag = %request.tag, "Enqueuing job");

        let span = tracing::debug_span!("job", job_id = %id, kind = ?request.kind);
        runtime.spawn(
            Self::run_job(
                Arc::clone(&self.jobs),
                Arc::clone(&self.permits),
                worker,
                id,
                request.inputs,
                cancel,
            )
            .instrument(span),
        );

        Ok(id)
    }

    fn cancel_by_tag(&self, tag: &str) -> Result<usize> {
        let table = self.jobs.lock();
        let mut cancelled = 0;
        for entry in table.entries.values() {
            if entry.tag == tag && !entry.state.borrow().state.is_terminal() {
                entry.cancel.cancel();
                cancelled += 1;
            }
        }
        info!(tag = %tag, cancelled, "Cancelled jobs by tag");
        Ok(cancelled)
    }

    fn observe(&self, id: &JobId) -> Result<watch::Receiver<JobInfo>> {
        self.jobs
            .lock()
            .entries
            .get(id)
            .map(|entry| entry.state.subscribe())
            .ok_or_else(|| BridgeError::OperationFailed(format!("Job not found: {id}")))
    }
}

impl std::fmt::Debug for TokioJobScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioJobScheduler")
            .field("workers", &self.workers.keys().collect::<Vec<_>>())
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}
