//! The terraform job workflow: the child of a deployment.
//!
//! # Sequence
//!
//! 1. Fetch the root at the requested revision
//! 2. Plan job: run the plan steps (`init`, `plan`, ...)
//! 3. Wait at the [`PlanReviewGate`]
//! 4. Apply job: run the apply steps, unless the plan was rejected
//! 5. Remove the working directory, whatever happened above
//!
//! Every state change is forwarded to the parent through the job's
//! [`StateNotifier`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::error::{JobError, TerraformClientError};
use super::gate::{PlanReviewGate, PlanReviewSignal, PlanStatus};
use super::state::{
    CompletionReason, JobActions, JobStatus, StateNotifier, WorkflowState, WorkflowStore,
};
use super::steps::{ExecutionContext, StepRegistry};
use crate::activities::{CleanupRequest, FetchRootRequest, RootActivities};
use crate::engine::{ChildHandle, RetryConfig, SignalRegistry, retry_activity, spawn_child};
use crate::types::{DeploymentId, LocalRoot, Repo, Revision, Root, Step};

/// Input of one terraform job workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub deployment_id: DeploymentId,
    pub revision: Revision,
    pub root: Root,
    pub repo: Repo,
}

impl JobRequest {
    /// Workflow id of the child; one per deployment.
    pub fn workflow_id(&self) -> String {
        format!("{}-terraform", self.deployment_id)
    }

    fn envs(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("DEPLOY_TRAIN_REPO".to_string(), self.repo.full_name()),
            ("DEPLOY_TRAIN_ROOT".to_string(), self.root.name.clone()),
            ("DEPLOY_TRAIN_REVISION".to_string(), self.revision.to_string()),
            ("DEPLOY_TRAIN_DEPLOYMENT_ID".to_string(), self.deployment_id.to_string()),
        ])
    }
}

/// How a terraform job workflow ended.
#[derive(Debug)]
pub enum JobOutcome {
    Succeeded,
    Rejected { reason: Option<String> },
    Failed(JobError),
}

pub struct TerraformJobWorkflow<R> {
    roots: Arc<R>,
    steps: StepRegistry,
    gate: PlanReviewGate,
    retry: RetryConfig,
    job_url_base: Option<String>,
}

impl<R: RootActivities> TerraformJobWorkflow<R> {
    pub fn new(roots: Arc<R>, steps: StepRegistry, gate: PlanReviewGate) -> Self {
        TerraformJobWorkflow {
            roots,
            steps,
            gate,
            retry: RetryConfig::DEFAULT,
            job_url_base: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_job_url_base(mut self, base: Option<String>) -> Self {
        self.job_url_base = base;
        self
    }

    pub async fn run<N: StateNotifier>(
        &self,
        request: &JobRequest,
        notifier: N,
        reviews: &mut mpsc::Receiver<PlanReviewSignal>,
    ) -> JobOutcome {
        let roots = &*self.roots;
        let fetch = FetchRootRequest {
            repo: request.repo.clone(),
            root: request.root.clone(),
            deployment_id: request.deployment_id,
            revision: request.revision.clone(),
        };
        let fetched = match retry_activity(self.retry, move || roots.fetch_root(fetch.clone())).await {
            Ok(fetched) => fetched,
            Err(e) => return JobOutcome::Failed(JobError::FetchRoot(e)),
        };

        let mut store = WorkflowStore::new(notifier, self.job_url_base.clone());
        let outcome = match self
            .run_jobs(request, &fetched.local_root, &mut store, reviews)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => JobOutcome::Failed(e),
        };

        let cleanup = CleanupRequest {
            deploy_directory: fetched.deploy_directory,
        };
        if let Err(e) = retry_activity(self.retry, move || roots.cleanup(cleanup.clone())).await {
            warn!(deployment_id = %request.deployment_id, error = %e, "failed to clean up deploy directory");
        }

        outcome
    }

    async fn run_jobs<N: StateNotifier>(
        &self,
        request: &JobRequest,
        root: &LocalRoot,
        store: &mut WorkflowStore<N>,
        reviews: &mut mpsc::Receiver<PlanReviewSignal>,
    ) -> Result<JobOutcome, JobError> {
        let plan_job_id = format!("{}-plan", request.deployment_id);
        let apply_job_id = format!("{}-apply", request.deployment_id);

        // ─── Plan ───

        store.init_plan_job(&plan_job_id)?;
        store.update_plan_job_with_status(JobStatus::InProgress, None)?;

        let mut ctx = ExecutionContext::new(&plan_job_id, root).with_envs(request.envs());
        if let Err(e) = self
            .run_steps(&mut ctx, root, &request.root.plan.job.steps, "plan")
            .await
        {
            store.update_plan_job_with_status(JobStatus::Failed, None)?;
            store.update_completion(CompletionReason::InternalServiceError)?;
            return Ok(JobOutcome::Failed(e.into()));
        }

        let summary = ctx.plan_summary.clone().unwrap_or_default();
        store.update_plan_job_with_status(JobStatus::Success, Some(summary.clone()))?;

        // ─── Review ───

        store.init_apply_job(&apply_job_id)?;
        if self.gate.requires_review(&request.root, &summary) {
            store.update_apply_job_with_actions(JobActions::plan_review(
                request.root.plan.approval.reason.clone(),
            ))?;
        }

        if self.gate.await_review(reviews, &request.root, &summary).await == PlanStatus::Rejected {
            store.update_apply_job_with_status(JobStatus::Rejected)?;
            store.update_completion(CompletionReason::PlanRejected)?;
            return Ok(JobOutcome::Rejected { reason: None });
        }

        // ─── Apply ───

        store.update_apply_job_with_status(JobStatus::InProgress)?;
        ctx.job_id = apply_job_id;
        if let Err(e) = self
            .run_steps(&mut ctx, root, &request.root.apply.steps, "apply")
            .await
        {
            store.update_apply_job_with_status(JobStatus::Failed)?;
            store.update_completion(CompletionReason::InternalServiceError)?;
            return Ok(JobOutcome::Failed(e.into()));
        }

        store.update_apply_job_with_status(JobStatus::Success)?;
        store.update_completion(CompletionReason::SuccessfulCompletion)?;
        info!(deployment_id = %request.deployment_id, root = %request.root.name, "terraform job complete");
        Ok(JobOutcome::Succeeded)
    }

    async fn run_steps(
        &self,
        ctx: &mut ExecutionContext,
        root: &LocalRoot,
        steps: &[Step],
        job: &'static str,
    ) -> Result<(), TerraformClientError> {
        for step in steps {
            debug!(job_id = %ctx.job_id, step = %step.kind(), "running step");
            self.steps
                .run(ctx, root, step)
                .await
                .map_err(|source| TerraformClientError {
                    job,
                    step: step.kind(),
                    source,
                })?;
        }
        Ok(())
    }
}

/// Starts terraform job workflows as children of a deployment.
pub trait JobLauncher: Send + Sync {
    /// Spawns the job for `request`. State snapshots are sent on `states`.
    fn launch(
        &self,
        request: JobRequest,
        states: mpsc::UnboundedSender<WorkflowState>,
    ) -> ChildHandle<JobOutcome>;
}

/// Runs [`TerraformJobWorkflow`] on its own task, retrying retryable
/// failures, with plan reviews routed by deployment id.
pub struct JobWorkflowLauncher<R> {
    workflow: Arc<TerraformJobWorkflow<R>>,
    reviews: SignalRegistry<DeploymentId, PlanReviewSignal>,
    retry: RetryConfig,
}

impl<R> JobWorkflowLauncher<R> {
    pub fn new(
        workflow: TerraformJobWorkflow<R>,
        reviews: SignalRegistry<DeploymentId, PlanReviewSignal>,
    ) -> Self {
        JobWorkflowLauncher {
            workflow: Arc::new(workflow),
            reviews,
            retry: RetryConfig::CHILD_WORKFLOW,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl<R: RootActivities + 'static> JobLauncher for JobWorkflowLauncher<R> {
    fn launch(
        &self,
        request: JobRequest,
        states: mpsc::UnboundedSender<WorkflowState>,
    ) -> ChildHandle<JobOutcome> {
        let workflow = Arc::clone(&self.workflow);
        let retry = self.retry;
        // Subscribe before spawning so an early review is not lost.
        let mut subscription = self.reviews.subscribe(request.deployment_id);

        spawn_child(request.workflow_id(), async move {
            let mut attempt = 1;
            loop {
                let outcome = workflow
                    .run(&request, states.clone(), subscription.receiver())
                    .await;
                match outcome {
                    JobOutcome::Failed(e) if e.is_retryable() && attempt < retry.max_attempts() => {
                        let delay = retry.delay_for_attempt(attempt - 1);
                        warn!(attempt, ?delay, error = %e, "terraform job failed, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    outcome => return outcome,
                }
            }
        })
    }
}
