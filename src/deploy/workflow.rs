//! The long-lived deploy workflow of one (repo, root).
//!
//! The workflow task owns the [`RevisionQueue`]. It accepts signals, answers
//! the worker's pop and lock requests, and keeps every queued revision's
//! check run current. It exits once it has been idle for the receive timeout
//! with nothing queued and nothing deploying.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, instrument, warn};

use super::deployer::Deployer;
use super::error::WorkflowError;
use super::message::{NewRevisionSignal, QueueRequest, WorkflowSignals};
use super::worker::{QueueHandle, QueueWorker, WorkerState};
use crate::activities::{
    CheckRunClient, CommitComparer, DeploymentStore, FetchLatestDeploymentRequest,
};
use crate::checks::{
    CheckRunAction, CheckRunExternalId, CheckRunRequest, CheckRunState, build_check_run_title,
};
use crate::engine::{IdGenerator, RetryConfig, retry_activity};
use crate::queue::{LockState, Priority, RevisionQueue};
use crate::terraform::WorkflowRunner;
use crate::types::{CheckRunId, DeploymentInfo, Repo, Root, Trigger};

pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

const QUEUE_REQUEST_BUFFER: usize = 16;

pub const QUEUED_SUMMARY: &str = "Waiting for earlier deployments of this root to finish.";

pub const LOCKED_SUMMARY: &str = "Merge deploys of this root are locked after a manual deploy. \
     Unlock to let this revision deploy.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowExit {
    /// Nothing arrived within the receive timeout.
    Idle,
    Shutdown,
}

pub struct DeployWorkflow<G, S, R> {
    repo: Repo,
    root: Root,
    github: Arc<G>,
    store: Arc<S>,
    runner: Arc<R>,
    ids: Arc<dyn IdGenerator>,
    receive_timeout: Duration,
    retry: RetryConfig,
}

impl<G, S, R> DeployWorkflow<G, S, R>
where
    G: CommitComparer + CheckRunClient + 'static,
    S: DeploymentStore + 'static,
    R: WorkflowRunner + 'static,
{
    pub fn new(
        repo: Repo,
        root: Root,
        github: Arc<G>,
        store: Arc<S>,
        runner: Arc<R>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        DeployWorkflow {
            repo,
            root,
            github,
            store,
            runner,
            ids,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            retry: RetryConfig::DEFAULT,
        }
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Runs until idle or cancelled. A running deployment is always allowed
    /// to finish before this returns.
    #[instrument(skip_all, fields(repo = %self.repo, root = %self.root.name))]
    pub async fn run(
        &self,
        signals: &mut WorkflowSignals,
        cancel: CancellationToken,
    ) -> Result<WorkflowExit, WorkflowError> {
        let latest = retry_activity(self.retry, || {
            self.store
                .fetch_latest_deployment(FetchLatestDeploymentRequest {
                    full_repository_name: self.repo.full_name(),
                    root_name: self.root.name.clone(),
                })
        })
        .await
        .map_err(WorkflowError::FetchLatest)?;

        let mut queue = match &latest {
            Some(record) if record.root.trigger == Trigger::Manual => {
                info!(revision = %record.revision, "last deploy was manual, merge deploys start locked");
                RevisionQueue::with_lock(LockState::locked(record.revision.clone()))
            }
            _ => RevisionQueue::new(),
        };

        let deployer = Arc::new(
            Deployer::new(
                Arc::clone(&self.github),
                Arc::clone(&self.store),
                Arc::clone(&self.runner),
            )
            .with_retry(self.retry),
        );
        let (requests_tx, mut requests) = mpsc::channel(QUEUE_REQUEST_BUFFER);
        let (state_tx, worker_state) = watch::channel(WorkerState::Waiting);
        let worker_cancel = cancel.child_token();
        let worker = QueueWorker::new(deployer, QueueHandle::new(requests_tx), state_tx)
            .with_last_deployed(latest);
        let mut worker_task =
            tokio::spawn(worker.work(worker_cancel.clone()).instrument(Span::current()));

        let idle = tokio::time::sleep(self.receive_timeout);
        tokio::pin!(idle);
        let mut pending_pop: Option<oneshot::Sender<DeploymentInfo>> = None;

        let exit = loop {
            if queue.can_pop()
                && let Some(tx) = pending_pop.take()
                && !tx.is_closed()
                && let Ok(item) = queue.pop()
            {
                debug!(revision = %item.revision, "handing revision to worker");
                if let Err(item) = tx.send(item) {
                    warn!(revision = %item.revision, "worker went away before taking revision");
                }
                idle.as_mut().reset(Instant::now() + self.receive_timeout);
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break WorkflowExit::Shutdown,
                Some(signal) = signals.revisions.recv() => {
                    self.accept(&mut queue, signal).await;
                    idle.as_mut().reset(Instant::now() + self.receive_timeout);
                }
                Some(signal) = signals.unlocks.recv() => {
                    info!(user = %signal.user, "unlock requested");
                    self.set_lock(&mut queue, LockState::unlocked()).await;
                    idle.as_mut().reset(Instant::now() + self.receive_timeout);
                }
                Some(request) = requests.recv() => match request {
                    QueueRequest::Pop(tx) => pending_pop = Some(tx),
                    QueueRequest::SetLock(lock) => self.set_lock(&mut queue, lock).await,
                },
                joined = &mut worker_task => {
                    return match joined {
                        Ok(_) => {
                            warn!("queue worker stopped unexpectedly");
                            Ok(WorkflowExit::Shutdown)
                        }
                        Err(e) => Err(WorkflowError::Worker(e)),
                    };
                }
                () = &mut idle => {
                    if queue.is_empty() && *worker_state.borrow() != WorkerState::Working {
                        info!(
                            target: "deploy_train::metrics",
                            metric = "workflow.idle_shutdown",
                            repo = %self.repo,
                            root = %self.root.name,
                            "deploy workflow idle"
                        );
                        break WorkflowExit::Idle;
                    }
                    idle.as_mut().reset(Instant::now() + self.receive_timeout);
                }
            }
        };

        worker_cancel.cancel();
        worker_task.await.map_err(WorkflowError::Worker)?;
        Ok(exit)
    }

    async fn accept(&self, queue: &mut RevisionQueue, signal: NewRevisionSignal) {
        let mut root = self.root.clone();
        root.trigger = signal.trigger;
        root.rerun = signal.rerun;
        let mut info = DeploymentInfo {
            id: self.ids.generate(),
            revision: signal.revision,
            root,
            repo: self.repo.clone(),
            check_run_id: None,
        };
        let blocked = queue.is_blocked(&info);
        info.check_run_id = self.report_queued(&info, blocked).await;
        info!(
            revision = %info.revision,
            deployment_id = %info.id,
            trigger = ?info.trigger(),
            blocked,
            "revision queued"
        );
        queue.push(info);
    }

    /// Applies `lock` and refreshes queued merge revisions if their
    /// eligibility changed.
    async fn set_lock(&self, queue: &mut RevisionQueue, lock: LockState) {
        let was_locked = queue.lock_state().is_locked();
        queue.set_lock_status_for_merged_trigger(lock.status, lock.revision);
        if was_locked == queue.lock_state().is_locked() {
            return;
        }
        for item in queue.scan(Priority::Low) {
            if item.check_run_id.is_some() {
                self.report_queued(&item, queue.is_blocked(&item)).await;
            }
        }
    }

    /// Shows `info` as queued, or as waiting for an unlock. Returns the
    /// check run id, if there is one.
    async fn report_queued(&self, info: &DeploymentInfo, blocked: bool) -> Option<CheckRunId> {
        let request = queued_check_run(info, blocked);
        let result = match info.check_run_id {
            Some(id) => {
                let update = request.into_update(id);
                retry_activity(self.retry, || self.github.update_check_run(update.clone())).await
            }
            None => {
                let create = request.into_create();
                retry_activity(self.retry, || self.github.create_check_run(create.clone())).await
            }
        };
        match result {
            Ok(response) => Some(response.id),
            Err(e) => {
                error!(revision = %info.revision, error = %e, "failed to report queued revision");
                info.check_run_id
            }
        }
    }
}

fn queued_check_run(info: &DeploymentInfo, blocked: bool) -> CheckRunRequest {
    let (state, actions, summary) = if blocked {
        (
            CheckRunState::ActionRequired,
            vec![CheckRunAction::unlock()],
            LOCKED_SUMMARY,
        )
    } else {
        (CheckRunState::Queued, vec![], QUEUED_SUMMARY)
    };
    CheckRunRequest {
        title: build_check_run_title(&info.root.name),
        sha: info.revision.clone(),
        repo: info.repo.clone(),
        state,
        actions,
        summary: summary.to_string(),
        external_id: CheckRunExternalId::new(info.id, info.root.name.clone()).encode(),
    }
}
