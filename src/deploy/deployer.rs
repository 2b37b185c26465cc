//! Validates a popped revision against the last deployment, runs it, and
//! records the result.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use super::error::{DeployError, ValidationError};
use crate::activities::{
    ActivityError, CheckRunClient, CommitComparer, CompareCommitRequest, DeploymentStore,
    StoreLatestDeploymentRequest,
};
use crate::checks::{CheckRunExternalId, CheckRunRequest, CheckRunState, build_check_run_title};
use crate::engine::{RetryConfig, retry_activity};
use crate::terraform::{RunError, WorkflowRunner};
use crate::types::{DeploymentInfo, DeploymentRecord, DiffDirection};

pub const BEHIND_SUMMARY: &str = "This revision is behind the latest deployed revision. \
     Only revisions ahead of or diverged from the deployed revision can be deployed.";

pub const RERUN_NOT_IDENTICAL_SUMMARY: &str = "A rerun was requested, but this revision is not \
     the latest deployed revision. Only the deployed revision can be rerun.";

pub const COMPARE_FAILED_SUMMARY: &str =
    "Could not compare this revision with the latest deployed revision.";

pub struct Deployer<G, S, R> {
    github: Arc<G>,
    store: Arc<S>,
    runner: Arc<R>,
    retry: RetryConfig,
}

impl<G, S, R> Deployer<G, S, R>
where
    G: CommitComparer + CheckRunClient,
    S: DeploymentStore,
    R: WorkflowRunner,
{
    pub fn new(github: Arc<G>, store: Arc<S>, runner: Arc<R>) -> Self {
        Deployer {
            github,
            store,
            runner,
            retry: RetryConfig::DEFAULT,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Deploys `requested` on top of `last_deployed`.
    ///
    /// Returns the record persisted for this attempt. A terraform failure
    /// still persists, and the error carries the record.
    #[instrument(skip_all, fields(revision = %requested.revision, deployment_id = %requested.id))]
    pub async fn deploy(
        &self,
        requested: &DeploymentInfo,
        last_deployed: Option<&DeploymentRecord>,
    ) -> Result<DeploymentRecord, DeployError> {
        let direction = match last_deployed {
            None => DiffDirection::Ahead,
            Some(last) => match self.compare(requested, last).await {
                Ok(direction) => direction,
                Err(e) => {
                    self.fail_check_run(requested, COMPARE_FAILED_SUMMARY).await;
                    return Err(DeployError::Compare(e));
                }
            },
        };

        if let Err(e) = validate(requested, last_deployed, direction) {
            let summary = match e {
                ValidationError::Behind { .. } => BEHIND_SUMMARY,
                ValidationError::RerunNotIdentical { .. }
                | ValidationError::RerunWithoutDeployment { .. } => RERUN_NOT_IDENTICAL_SUMMARY,
            };
            self.fail_check_run(requested, summary).await;
            return Err(e.into());
        }

        let failure = match self.runner.run(requested, direction).await {
            Ok(()) => None,
            Err(RunError::PlanRejected(e)) => {
                info!(reason = %e, "plan rejected, deployment not recorded");
                return Err(e.into());
            }
            Err(RunError::Job(e)) => Some(e),
        };

        let record = requested.to_record();
        self.persist(&record).await;

        match failure {
            None => Ok(record),
            Some(source) => Err(DeployError::Terraform { record, source }),
        }
    }

    async fn compare(
        &self,
        requested: &DeploymentInfo,
        last: &DeploymentRecord,
    ) -> Result<DiffDirection, ActivityError> {
        let request = CompareCommitRequest {
            repo: requested.repo.clone(),
            deploy_request_revision: requested.revision.clone(),
            latest_deployed_revision: last.revision.clone(),
        };
        retry_activity(self.retry, || self.github.compare_commits(request.clone())).await
    }

    /// Storing is best effort: the caller's in-memory baseline still
    /// advances.
    async fn persist(&self, record: &DeploymentRecord) {
        let request = StoreLatestDeploymentRequest {
            deployment: record.clone(),
        };
        if let Err(e) = retry_activity(self.retry, || {
            self.store.store_latest_deployment(request.clone())
        })
        .await
        {
            error!(key = %record.key(), error = %e, "failed to persist latest deployment");
        }
    }

    async fn fail_check_run(&self, requested: &DeploymentInfo, summary: &str) {
        let request = CheckRunRequest {
            title: build_check_run_title(&requested.root.name),
            sha: requested.revision.clone(),
            repo: requested.repo.clone(),
            state: CheckRunState::Failure,
            actions: vec![],
            summary: summary.to_string(),
            external_id: CheckRunExternalId::new(requested.id, requested.root.name.clone()).encode(),
        };
        let result = match requested.check_run_id {
            Some(id) => {
                let update = request.into_update(id);
                retry_activity(self.retry, || self.github.update_check_run(update.clone())).await
            }
            None => {
                let create = request.into_create();
                retry_activity(self.retry, || self.github.create_check_run(create.clone())).await
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to mark check run as failed");
        }
    }
}

/// Checks the direction of `requested` relative to the last deployment.
///
/// Behind is never deployable. A rerun is only valid for the deployed
/// revision itself, so it also fails when nothing has been deployed yet.
fn validate(
    requested: &DeploymentInfo,
    last_deployed: Option<&DeploymentRecord>,
    direction: DiffDirection,
) -> Result<(), ValidationError> {
    let Some(last) = last_deployed else {
        if requested.root.rerun {
            return Err(ValidationError::RerunWithoutDeployment {
                requested: requested.revision.clone(),
            });
        }
        return Ok(());
    };
    if direction == DiffDirection::Behind {
        return Err(ValidationError::Behind {
            requested: requested.revision.clone(),
            deployed: last.revision.clone(),
        });
    }
    if requested.root.rerun && direction != DiffDirection::Identical {
        return Err(ValidationError::RerunNotIdentical {
            requested: requested.revision.clone(),
            deployed: last.revision.clone(),
            direction,
        });
    }
    Ok(())
}
