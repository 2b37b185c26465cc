//! Routes signals to the deploy workflow of each (repo, root).
//!
//! Workflows are spawned lazily when the first signal for a root arrives,
//! and remove themselves once idle. A workflow that goes idle while signals
//! are still buffered for it starts over instead of exiting.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, error::SendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::error::{DispatchError, Result};
use super::message::{
    NewRevisionSignal, SignalSenders, UnlockSignal, WorkflowSignals, signal_channels,
};
use super::workflow::{DEFAULT_RECEIVE_TIMEOUT, DeployWorkflow, WorkflowExit};
use crate::activities::{CheckRunClient, CommitComparer, DeploymentStore};
use crate::config::RootsConfig;
use crate::engine::{IdGenerator, RetryConfig, SignalRegistry, UuidGenerator};
use crate::terraform::{PlanReviewSignal, WorkflowRunner};
use crate::types::{DeploymentId, Repo, Root};

/// Buffered signals per workflow.
const WORKFLOW_SIGNAL_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkflowKey {
    /// `owner/name`
    pub repo: String,
    pub root: String,
}

impl WorkflowKey {
    pub fn new(repo: &Repo, root: &str) -> Self {
        WorkflowKey {
            repo: repo.full_name(),
            root: root.to_string(),
        }
    }
}

impl fmt::Display for WorkflowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repo, self.root)
    }
}

struct WorkflowHandle {
    senders: SignalSenders,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

type Workflows = Arc<RwLock<HashMap<WorkflowKey, WorkflowHandle>>>;

pub struct Dispatcher<G, S, R> {
    roots: RootsConfig,
    github: Arc<G>,
    store: Arc<S>,
    runner: Arc<R>,
    ids: Arc<dyn IdGenerator>,
    reviews: SignalRegistry<DeploymentId, PlanReviewSignal>,
    receive_timeout: Duration,
    retry: RetryConfig,
    workflows: Workflows,
    shutdown: CancellationToken,
}

impl<G, S, R> Dispatcher<G, S, R>
where
    G: CommitComparer + CheckRunClient + 'static,
    S: DeploymentStore + 'static,
    R: WorkflowRunner + 'static,
{
    /// `reviews` must be the registry the terraform job launcher subscribes
    /// plan reviews on.
    pub fn new(
        roots: RootsConfig,
        github: Arc<G>,
        store: Arc<S>,
        runner: Arc<R>,
        reviews: SignalRegistry<DeploymentId, PlanReviewSignal>,
    ) -> Self {
        Dispatcher {
            roots,
            github,
            store,
            runner,
            ids: Arc::new(UuidGenerator),
            reviews,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            retry: RetryConfig::DEFAULT,
            workflows: Arc::new(RwLock::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[instrument(skip(self, signal), fields(revision = %signal.revision))]
    pub async fn new_revision(
        &self,
        owner: &str,
        repo: &str,
        root: &str,
        signal: NewRevisionSignal,
    ) -> Result<()> {
        self.deliver(owner, repo, root, signal, |senders| senders.revisions)
            .await
    }

    #[instrument(skip(self, signal), fields(user = %signal.user))]
    pub async fn unlock(&self, owner: &str, repo: &str, root: &str, signal: UnlockSignal) -> Result<()> {
        self.deliver(owner, repo, root, signal, |senders| senders.unlocks)
            .await
    }

    /// Delivers a plan review to the terraform job of `deployment_id`.
    pub async fn plan_review(&self, deployment_id: DeploymentId, signal: PlanReviewSignal) -> Result<()> {
        info!(%deployment_id, user = %signal.user, status = ?signal.status, "plan review received");
        self.reviews.send(&deployment_id, signal).await?;
        Ok(())
    }

    pub async fn is_running(&self, key: &WorkflowKey) -> bool {
        self.workflows.read().await.contains_key(key)
    }

    pub async fn workflow_count(&self) -> usize {
        self.workflows.read().await.len()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancels every workflow and waits for them. Running deployments
    /// finish first.
    pub async fn shutdown(&self) {
        info!("shutting down deploy workflows");
        self.shutdown.cancel();
        let handles: Vec<_> = self.workflows.write().await.drain().collect();
        for (key, handle) in handles {
            handle.cancel.cancel();
            if let Err(e) = handle.task.await {
                error!(%key, error = %e, "deploy workflow task failed");
            }
        }
    }

    fn lookup(&self, owner: &str, repo: &str, root: &str) -> Result<(Repo, Root)> {
        self.roots
            .lookup(owner, repo, root)
            .ok_or_else(|| DispatchError::UnknownRoot {
                repo: format!("{owner}/{repo}"),
                root: root.to_string(),
            })
    }

    /// Sends `signal` to the workflow of the root, spawning it if needed.
    ///
    /// The send happens outside the map lock, so a full channel only holds up
    /// this caller. A workflow that stopped after its senders were looked up
    /// has closed its channels; the signal then goes to its successor.
    async fn deliver<T>(
        &self,
        owner: &str,
        repo: &str,
        root: &str,
        mut signal: T,
        channel: fn(SignalSenders) -> mpsc::Sender<T>,
    ) -> Result<()> {
        let (repo, root) = self.lookup(owner, repo, root)?;
        let key = WorkflowKey::new(&repo, &root.name);
        for _ in 0..2 {
            let sender = channel(self.get_or_spawn(&key, &repo, &root).await?);
            match sender.send(signal).await {
                Ok(()) => return Ok(()),
                Err(SendError(returned)) => {
                    debug!(%key, "deploy workflow stopped before delivery, retrying");
                    signal = returned;
                }
            }
        }
        Err(DispatchError::ChannelClosed(key.to_string()))
    }

    /// Senders of the workflow for `key`, spawning the workflow if needed.
    async fn get_or_spawn(&self, key: &WorkflowKey, repo: &Repo, root: &Root) -> Result<SignalSenders> {
        if self.shutdown.is_cancelled() {
            return Err(DispatchError::ShuttingDown);
        }
        if let Some(handle) = self.workflows.read().await.get(key) {
            return Ok(handle.senders.clone());
        }

        let mut workflows = self.workflows.write().await;
        if self.shutdown.is_cancelled() {
            return Err(DispatchError::ShuttingDown);
        }
        let handle = workflows.entry(key.clone()).or_insert_with(|| {
            debug!(%key, "spawning deploy workflow");
            self.spawn(key.clone(), repo.clone(), root.clone())
        });
        Ok(handle.senders.clone())
    }

    fn spawn(&self, key: WorkflowKey, repo: Repo, root: Root) -> WorkflowHandle {
        let (senders, signals) = signal_channels(WORKFLOW_SIGNAL_BUFFER);
        let cancel = self.shutdown.child_token();
        let workflow = DeployWorkflow::new(
            repo,
            root,
            Arc::clone(&self.github),
            Arc::clone(&self.store),
            Arc::clone(&self.runner),
            Arc::clone(&self.ids),
        )
        .with_receive_timeout(self.receive_timeout)
        .with_retry(self.retry);
        let task = tokio::spawn(supervise(
            workflow,
            signals,
            cancel.clone(),
            key,
            Arc::clone(&self.workflows),
        ));
        WorkflowHandle {
            senders,
            cancel,
            task,
        }
    }
}

/// Runs a workflow until it stops for good, then removes it from the map.
async fn supervise<G, S, R>(
    workflow: DeployWorkflow<G, S, R>,
    mut signals: WorkflowSignals,
    cancel: CancellationToken,
    key: WorkflowKey,
    workflows: Workflows,
) where
    G: CommitComparer + CheckRunClient + 'static,
    S: DeploymentStore + 'static,
    R: WorkflowRunner + 'static,
{
    loop {
        match workflow.run(&mut signals, cancel.clone()).await {
            // The dispatcher already took the handle.
            Ok(WorkflowExit::Shutdown) => return,
            Ok(WorkflowExit::Idle) => {
                let mut map = workflows.write().await;
                // Senders looked up before this point now fail and retry
                // through the map.
                signals.close();
                if signals.has_pending() {
                    let senders = signals.reopen(WORKFLOW_SIGNAL_BUFFER);
                    if let Some(handle) = map.get_mut(&key) {
                        handle.senders = senders;
                    }
                    drop(map);
                    info!(%key, "signals arrived while going idle, restarting deploy workflow");
                    continue;
                }
                map.remove(&key);
                debug!(%key, "deploy workflow stopped");
                return;
            }
            Err(e) => {
                let mut map = workflows.write().await;
                map.remove(&key);
                let dropped = signals.revisions.len() + signals.unlocks.len();
                error!(%key, error = %e, dropped, "deploy workflow failed");
                if dropped > 0 {
                    warn!(%key, dropped, "buffered signals were discarded");
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SequentialIds;
    use crate::terraform::PlanStatus;
    use crate::test_utils::{FakeGitHub, FakeRunner, FakeStore};
    use crate::types::{Revision, Trigger};

    const TIMEOUT: Duration = Duration::from_secs(60);

    struct Harness {
        runner: Arc<FakeRunner>,
        reviews: SignalRegistry<DeploymentId, PlanReviewSignal>,
        dispatcher: Dispatcher<FakeGitHub, FakeStore, FakeRunner>,
    }

    fn harness(runner: FakeRunner) -> Harness {
        harness_with_store(runner, FakeStore::new())
    }

    fn harness_with_store(runner: FakeRunner, store: FakeStore) -> Harness {
        let roots = RootsConfig::from_json(
            r#"{"acme/infra": {"roots": [{"name": "prod", "path": "envs/prod"}, {"name": "dev", "path": "envs/dev"}]}}"#,
        )
        .unwrap();
        let runner = Arc::new(runner);
        let reviews = SignalRegistry::new();
        let dispatcher = Dispatcher::new(
            roots,
            Arc::new(FakeGitHub::new()),
            Arc::new(store),
            runner.clone(),
            reviews.clone(),
        )
        .with_ids(Arc::new(SequentialIds::new()))
        .with_receive_timeout(TIMEOUT)
        .with_retry(RetryConfig::IMMEDIATE);
        Harness {
            runner,
            reviews,
            dispatcher,
        }
    }

    fn merge(rev: &str) -> NewRevisionSignal {
        NewRevisionSignal {
            revision: Revision::new(rev),
            trigger: Trigger::Merge,
            rerun: false,
        }
    }

    fn key(root: &str) -> WorkflowKey {
        WorkflowKey::new(&Repo::new("acme", "infra"), root)
    }

    async fn wait_until_stopped(dispatcher: &Dispatcher<FakeGitHub, FakeStore, FakeRunner>) {
        while dispatcher.workflow_count().await > 0 {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn spawns_one_workflow_per_root_and_removes_idle_ones() {
        let h = harness(FakeRunner::new());

        h.dispatcher.new_revision("acme", "infra", "prod", merge("a")).await.unwrap();
        h.dispatcher.new_revision("acme", "infra", "prod", merge("b")).await.unwrap();
        h.dispatcher.new_revision("acme", "infra", "dev", merge("c")).await.unwrap();
        assert_eq!(h.dispatcher.workflow_count().await, 2);
        assert!(h.dispatcher.is_running(&key("prod")).await);

        wait_until_stopped(&h.dispatcher).await;

        let mut revisions = h.runner.revisions();
        revisions.sort();
        assert_eq!(revisions, vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_workflow_is_respawned_by_a_later_signal() {
        let h = harness(FakeRunner::new());
        h.dispatcher.new_revision("acme", "infra", "prod", merge("a")).await.unwrap();
        wait_until_stopped(&h.dispatcher).await;

        h.dispatcher.new_revision("acme", "infra", "prod", merge("b")).await.unwrap();
        wait_until_stopped(&h.dispatcher).await;

        assert_eq!(h.runner.revisions(), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn full_channel_does_not_block_other_roots() {
        let h = harness_with_store(
            FakeRunner::new(),
            FakeStore::new().with_fetch_delay(Duration::from_secs(600)),
        );
        let dispatcher = Arc::new(h.dispatcher);
        for i in 0..WORKFLOW_SIGNAL_BUFFER {
            dispatcher
                .new_revision("acme", "infra", "prod", merge(&format!("p{i}")))
                .await
                .unwrap();
        }
        let blocked = tokio::spawn({
            let dispatcher = Arc::clone(&dispatcher);
            async move {
                dispatcher
                    .new_revision("acme", "infra", "prod", merge("overflow"))
                    .await
            }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!blocked.is_finished());

        tokio::time::timeout(
            Duration::from_secs(5),
            dispatcher.new_revision("acme", "infra", "dev", merge("d")),
        )
        .await
        .expect("dev signal waited on prod's channel")
        .unwrap();
        assert_eq!(dispatcher.workflow_count().await, 2);

        blocked.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unknown_root_is_rejected() {
        let h = harness(FakeRunner::new());

        let err = h
            .dispatcher
            .new_revision("acme", "infra", "staging", merge("a"))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::UnknownRoot { .. }));
        assert_eq!(h.dispatcher.workflow_count().await, 0);
    }

    #[tokio::test]
    async fn plan_review_reaches_subscribed_job() {
        let h = harness(FakeRunner::new());
        let id = DeploymentId::new(uuid::Uuid::from_u128(3));
        let mut subscription = h.reviews.subscribe(id);

        h.dispatcher
            .plan_review(
                id,
                PlanReviewSignal {
                    status: PlanStatus::Approved,
                    user: "alice".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(subscription.recv().await.unwrap().user, "alice");
    }

    #[tokio::test]
    async fn plan_review_without_job_is_not_found() {
        let h = harness(FakeRunner::new());

        let err = h
            .dispatcher
            .plan_review(
                DeploymentId::new(uuid::Uuid::from_u128(3)),
                PlanReviewSignal {
                    status: PlanStatus::Rejected,
                    user: "bob".to_string(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Signal(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_running_deploys_and_refuses_new_signals() {
        let h = harness(FakeRunner::new().with_delay(Duration::from_secs(300)));
        h.dispatcher.new_revision("acme", "infra", "prod", merge("a")).await.unwrap();
        while h.runner.runs().is_empty() {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        h.dispatcher.shutdown().await;

        assert_eq!(h.dispatcher.workflow_count().await, 0);
        assert!(matches!(
            h.dispatcher
                .new_revision("acme", "infra", "prod", merge("b"))
                .await,
            Err(DispatchError::ShuttingDown)
        ));
    }
}
