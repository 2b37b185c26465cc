//! Errors of the terraform job workflow and its runner.

use thiserror::Error;

use super::state::StoreError;
use super::steps::StepError;
use crate::activities::ActivityError;
use crate::engine::ChildError;
use crate::types::StepKind;

/// Message used when a plan was rejected without a stated reason.
pub const DEFAULT_PLAN_REJECTION_MESSAGE: &str = "plan has been rejected";

/// A terraform or shell step failed.
///
/// Remote state may have been partially mutated, so the attempted revision
/// is still recorded as the latest deployment. Never retried.
#[derive(Debug, Error)]
#[error("{job} job: {step} step failed: {source}")]
pub struct TerraformClientError {
    pub job: &'static str,
    pub step: StepKind,
    #[source]
    pub source: StepError,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("fetching root failed: {0}")]
    FetchRoot(#[source] ActivityError),

    #[error(transparent)]
    Terraform(#[from] TerraformClientError),

    #[error("updating job state failed: {0}")]
    UpdateJob(#[from] StoreError),

    #[error(transparent)]
    Child(#[from] ChildError),
}

impl JobError {
    /// Whether a fresh attempt of the whole job may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            JobError::FetchRoot(e) => e.is_transient(),
            JobError::Terraform(_) | JobError::UpdateJob(_) | JobError::Child(_) => false,
        }
    }
}

/// The plan was declined, explicitly or by review timeout. Nothing was
/// applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PlanRejectionError {
    pub message: String,
}

impl PlanRejectionError {
    pub fn new(reason: Option<String>) -> Self {
        PlanRejectionError {
            message: reason
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| DEFAULT_PLAN_REJECTION_MESSAGE.to_string()),
        }
    }
}

/// Failure of [`super::runner::TerraformWorkflowRunner::run`].
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    PlanRejected(#[from] PlanRejectionError),

    #[error("terraform workflow failed: {0}")]
    Job(#[from] JobError),
}
