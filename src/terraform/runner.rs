//! Runs a deployment's terraform job as a child workflow and mirrors its
//! progress onto the deployment's check run.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::error::{JobError, PlanRejectionError, RunError};
use super::job::{JobLauncher, JobOutcome, JobRequest};
use super::receiver::StateReceiver;
use crate::activities::CheckRunClient;
use crate::checks::CheckRunCache;
use crate::engine::RetryConfig;
use crate::types::{DeploymentInfo, DiffDirection, PlanApproval, Trigger};

pub const DIVERGED_APPROVAL_REASON: &str = "This revision has diverged from the last deployed revision. \
     Review the plan carefully before confirming.";

pub const MANUAL_APPROVAL_REASON: &str = "This deploy was triggered manually. \
     Confirm the plan to proceed to apply.";

/// Executes the terraform workflow for one deployment.
pub trait WorkflowRunner: Send + Sync {
    fn run(
        &self,
        info: &DeploymentInfo,
        direction: DiffDirection,
    ) -> impl Future<Output = Result<(), RunError>> + Send;
}

/// Plan approval for a deployment: a human must confirm diverged or
/// manually triggered deploys.
pub fn approval_for(info: &DeploymentInfo, direction: DiffDirection) -> PlanApproval {
    if direction == DiffDirection::Diverged {
        PlanApproval::manual(DIVERGED_APPROVAL_REASON)
    } else if info.trigger() == Trigger::Manual {
        PlanApproval::manual(MANUAL_APPROVAL_REASON)
    } else {
        PlanApproval::default()
    }
}

pub struct TerraformWorkflowRunner<L, C> {
    launcher: Arc<L>,
    checks: Arc<C>,
    retry: RetryConfig,
}

impl<L, C> TerraformWorkflowRunner<L, C> {
    pub fn new(launcher: Arc<L>, checks: Arc<C>) -> Self {
        TerraformWorkflowRunner {
            launcher,
            checks,
            retry: RetryConfig::DEFAULT,
        }
    }

    /// Retry settings for check run updates.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl<L: JobLauncher, C: CheckRunClient> WorkflowRunner for TerraformWorkflowRunner<L, C> {
    async fn run(&self, info: &DeploymentInfo, direction: DiffDirection) -> Result<(), RunError> {
        let mut root = info.root.clone();
        root.plan.approval = approval_for(info, direction);
        if direction == DiffDirection::Diverged {
            info!(
                target: "deploy_train::metrics",
                metric = "deploy.diverged",
                repo = %info.repo,
                root = %info.root.name,
                "diverged deploy requires manual approval"
            );
        }

        let request = JobRequest {
            deployment_id: info.id,
            revision: info.revision.clone(),
            root,
            repo: info.repo.clone(),
        };

        let mut receiver = StateReceiver::new(
            CheckRunCache::new(Arc::clone(&self.checks)).with_retry(self.retry),
        );
        receiver.seed(info);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut child = self.launcher.launch(request, tx);
        debug!(workflow_id = child.id(), "terraform workflow started");

        let result = loop {
            tokio::select! {
                Some(state) = rx.recv() => receiver.receive(info, &state).await,
                result = &mut child => break result,
            }
        };
        // States sent just before the child returned.
        while let Ok(state) = rx.try_recv() {
            receiver.receive(info, &state).await;
        }

        match result {
            Ok(JobOutcome::Succeeded) => Ok(()),
            Ok(JobOutcome::Rejected { reason }) => Err(PlanRejectionError::new(reason).into()),
            Ok(JobOutcome::Failed(e)) => Err(e.into()),
            Err(e) => Err(JobError::Child(e).into()),
        }
    }
}
