//! The loop that drains a revision queue one deployment at a time.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use super::deployer::Deployer;
use super::error::DeployError;
use super::message::QueueRequest;
use crate::activities::{CheckRunClient, CommitComparer, DeploymentStore};
use crate::queue::LockState;
use crate::terraform::WorkflowRunner;
use crate::types::{DeploymentInfo, DeploymentRecord, Trigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Blocked until the queue has something it may pop.
    Waiting,
    Working,
    Complete,
}

/// Where the worker takes deployments from.
pub trait RevisionSource: Send {
    /// Waits for the next deployment. `None` once the queue is gone.
    fn next(&mut self) -> impl Future<Output = Option<DeploymentInfo>> + Send;

    fn set_lock(&mut self, lock: LockState) -> impl Future<Output = ()> + Send;
}

/// Reaches the queue owned by the deploy workflow task.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    tx: mpsc::Sender<QueueRequest>,
}

impl QueueHandle {
    pub fn new(tx: mpsc::Sender<QueueRequest>) -> Self {
        QueueHandle { tx }
    }
}

impl RevisionSource for QueueHandle {
    async fn next(&mut self) -> Option<DeploymentInfo> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(QueueRequest::Pop(tx)).await.ok()?;
        rx.await.ok()
    }

    async fn set_lock(&mut self, lock: LockState) {
        if self.tx.send(QueueRequest::SetLock(lock)).await.is_err() {
            warn!("revision queue closed before lock could be set");
        }
    }
}

pub struct QueueWorker<G, S, R, Q> {
    deployer: Arc<Deployer<G, S, R>>,
    source: Q,
    state: watch::Sender<WorkerState>,
    last_deployed: Option<DeploymentRecord>,
}

impl<G, S, R, Q> QueueWorker<G, S, R, Q>
where
    G: CommitComparer + CheckRunClient,
    S: DeploymentStore,
    R: WorkflowRunner,
    Q: RevisionSource,
{
    pub fn new(deployer: Arc<Deployer<G, S, R>>, source: Q, state: watch::Sender<WorkerState>) -> Self {
        QueueWorker {
            deployer,
            source,
            state,
            last_deployed: None,
        }
    }

    /// Baseline the first popped revision is validated against.
    pub fn with_last_deployed(mut self, record: Option<DeploymentRecord>) -> Self {
        self.last_deployed = record;
        self
    }

    /// Pops and deploys until cancelled while waiting, or until the queue
    /// goes away. Returns the final baseline.
    pub async fn work(mut self, cancel: CancellationToken) -> Option<DeploymentRecord> {
        loop {
            self.state.send_replace(WorkerState::Waiting);
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("queue worker cancelled while waiting");
                    break;
                }
                next = self.source.next() => next,
            };
            let Some(item) = next else {
                warn!("revision queue closed, stopping worker");
                break;
            };

            self.state.send_replace(WorkerState::Working);
            let span = info_span!(
                "deployment",
                revision = %item.revision,
                deployment_id = %item.id,
                root = %item.root.name,
            );
            self.deploy(item).instrument(span).await;
        }
        self.state.send_replace(WorkerState::Complete);
        self.last_deployed
    }

    async fn deploy(&mut self, item: DeploymentInfo) {
        let record = match self.deployer.deploy(&item, self.last_deployed.as_ref()).await {
            Ok(record) => {
                info!("deployment complete");
                Some(record)
            }
            Err(e) => {
                match &e {
                    DeployError::Validation(_) => warn!(error = %e, "deployment rejected"),
                    DeployError::PlanRejected(_) => info!(error = %e, "deployment skipped"),
                    DeployError::Terraform { .. } | DeployError::Compare(_) => {
                        error!(error = %e, "deployment failed")
                    }
                }
                e.attempted_deployment().cloned()
            }
        };

        let Some(record) = record else { return };
        if record.root.trigger == Trigger::Manual {
            info!("manual deploy recorded, locking merge deploys");
            self.source
                .set_lock(LockState::locked(record.revision.clone()))
                .await;
        }
        self.last_deployed = Some(record);
    }
}
