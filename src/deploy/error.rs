//! Errors of the deploy layer.

use thiserror::Error;

use crate::activities::ActivityError;
use crate::terraform::{JobError, PlanRejectionError};
use crate::types::{DeploymentRecord, DiffDirection, Revision};

/// The requested revision may not be deployed. Nothing is run or recorded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("revision {requested} is behind the deployed revision {deployed}")]
    Behind {
        requested: Revision,
        deployed: Revision,
    },

    #[error("rerun of {requested} requested, but it is {direction} relative to the deployed revision {deployed}")]
    RerunNotIdentical {
        requested: Revision,
        deployed: Revision,
        direction: DiffDirection,
    },

    #[error("rerun of {requested} requested, but nothing has been deployed yet")]
    RerunWithoutDeployment { requested: Revision },
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    PlanRejected(#[from] PlanRejectionError),

    /// Terraform ran and failed. The attempt was still recorded, since
    /// remote state may have changed.
    #[error("deployment of {} failed: {source}", record.revision)]
    Terraform {
        record: DeploymentRecord,
        #[source]
        source: JobError,
    },

    #[error("comparing commits failed: {0}")]
    Compare(#[source] ActivityError),
}

impl DeployError {
    /// Record of a deployment that ran despite this error, if any. Callers
    /// advance their baseline to it.
    pub fn attempted_deployment(&self) -> Option<&DeploymentRecord> {
        match self {
            DeployError::Terraform { record, .. } => Some(record),
            DeployError::Validation(_) | DeployError::PlanRejected(_) | DeployError::Compare(_) => {
                None
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("fetching latest deployment failed: {0}")]
    FetchLatest(#[source] ActivityError),

    #[error("queue worker failed: {0}")]
    Worker(#[source] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no root {root} is configured for {repo}")]
    UnknownRoot { repo: String, root: String },

    #[error("deploy workflow for {0} is not accepting signals")]
    ChannelClosed(String),

    #[error(transparent)]
    Signal(#[from] crate::engine::SignalError),

    #[error("dispatcher is shutting down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, DispatchError>;
