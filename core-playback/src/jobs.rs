//! # Background Job Coordination
//!
//! Session-scoped bookkeeping for background jobs whose completion the
//! session cares about (artwork fetches).
//!
//! Each scheduled job gets one observer task that watches the scheduler's
//! state channel and forwards the first terminal [`JobInfo`] onto the
//! session loop as a [`JobCompletion`]. The loop hands every completion back
//! to [`BackgroundJobCoordinator::on_completion`], which removes the observer.
//! The observer map is owned by the coordinator and cleared on disposal;
//! nothing is registered process-wide.

use std::collections::HashMap;
use std::sync::Arc;

use bridge_traits::{JobId, JobInfo, JobKind, JobRequest, JobScheduler, JobState};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Terminal state of an observed job, delivered on the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCompletion {
    pub kind: JobKind,
    pub tag: String,
    pub info: JobInfo,
}

impl JobCompletion {
    pub fn id(&self) -> JobId {
        self.info.id
    }

    pub fn succeeded(&self) -> bool {
        self.info.state == JobState::Succeeded
    }
}

pub type JobCompletionReceiver = mpsc::UnboundedReceiver<JobCompletion>;

struct JobObserver {
    kind: JobKind,
    tag: String,
    task: JoinHandle<()>,
}

/// Schedules jobs and tracks one completion observer per job.
pub struct BackgroundJobCoordinator {
    scheduler: Arc<dyn JobScheduler>,
    completions: mpsc::UnboundedSender<JobCompletion>,
    observers: HashMap<JobId, JobObserver>,
}

impl BackgroundJobCoordinator {
    /// Create a coordinator and the receiver its completions arrive on.
    pub fn new(scheduler: Arc<dyn JobScheduler>) -> (Self, JobCompletionReceiver) {
        let (completions, receiver) = mpsc::unbounded_channel();
        let coordinator = Self {
            scheduler,
            completions,
            observers: HashMap::new(),
        };
        (coordinator, receiver)
    }

    /// Enqueue `request` and start observing it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&mut self, request: JobRequest) -> Result<JobId> {
        let kind = request.kind;
        let tag = request.tag.clone();

        let id = self.scheduler.enqueue(request)?;
        let updates = self.scheduler.observe(&id)?;

        let task = tokio::spawn(forward_terminal_state(
            kind,
            tag.clone(),
            updates,
            self.completions.clone(),
        ));

        info!(job_id = %id, kind = ?kind, tag = %tag, "Background job scheduled");
        self.observers.insert(id, JobObserver { kind, tag, task });
        Ok(id)
    }

    /// Accept a completion from the loop.
    ///
    /// Returns the completion the first time it is seen for a live observer,
    /// `None` if the observer was already removed (duplicate delivery or
    /// completion racing a [`detach_all`](Self::detach_all)).
    pub fn on_completion(&mut self, completion: JobCompletion) -> Option<JobCompletion> {
        let observer = self.observers.remove(&completion.id())?;
        debug!(
            job_id = %completion.id(),
            kind = ?observer.kind,
            tag = %observer.tag,
            state = ?completion.info.state,
            "Background job finished"
        );
        if completion.info.state == JobState::Failed {
            warn!(
                job_id = %completion.id(),
                error = completion.info.error.as_deref().unwrap_or("unknown"),
                "Background job failed"
            );
        }
        Some(completion)
    }

    /// Cancel every job tagged `tag`. Their observers are removed when the
    /// cancellation is reported.
    pub fn cancel_tag(&self, tag: &str) -> Result<usize> {
        Ok(self.scheduler.cancel_by_tag(tag)?)
    }

    /// Stop observing every job. The jobs themselves keep running.
    pub fn detach_all(&mut self) -> usize {
        let count = self.observers.len();
        for (_, observer) in self.observers.drain() {
            observer.task.abort();
        }
        if count > 0 {
            debug!(count, "Detached background job observers");
        }
        count
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn is_observing(&self, id: &JobId) -> bool {
        self.observers.contains_key(id)
    }
}

impl Drop for BackgroundJobCoordinator {
    fn drop(&mut self) {
        self.detach_all();
    }
}

impl std::fmt::Debug for BackgroundJobCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundJobCoordinator")
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

/// Wait for the first terminal state and forward it once.
///
/// A scheduler that drops the channel before reporting a terminal state is
/// treated as having cancelled the job.
async fn forward_terminal_state(
    kind: JobKind,
    tag: String,
    mut updates: watch::Receiver<JobInfo>,
    completions: mpsc::UnboundedSender<JobCompletion>,
) {
    let waited = updates
        .wait_for(|info| info.state.is_terminal())
        .await
        .map(|info| info.clone());
    let info = match waited {
        Ok(info) => info,
        Err(_) => {
            let mut info = updates.borrow().clone();
            if !info.state.is_terminal() {
                info.state = JobState::Cancelled;
                info.error = Some("scheduler dropped the job".to_string());
            }
            info
        }
    };

    // The loop may already be gone during disposal.
    let _ = completions.send(JobCompletion { kind, tag, info });
}
