//! Terraform execution for a single deployment.
//!
//! [`TerraformJobWorkflow`] runs a root's plan and apply jobs, gated by plan
//! review. It runs as a child of the deployment, streaming [`WorkflowState`]
//! snapshots that [`TerraformWorkflowRunner`] mirrors onto the check run.

mod error;
mod gate;
mod job;
mod receiver;
mod runner;
mod state;
mod steps;

pub use error::{
    DEFAULT_PLAN_REJECTION_MESSAGE, JobError, PlanRejectionError, RunError, TerraformClientError,
};
pub use gate::{DEFAULT_PLAN_REVIEW_TIMEOUT, PlanReviewGate, PlanReviewSignal, PlanStatus};
pub use job::{JobLauncher, JobOutcome, JobRequest, JobWorkflowLauncher, TerraformJobWorkflow};
pub use receiver::{StateReceiver, render};
pub use runner::{
    DIVERGED_APPROVAL_REASON, MANUAL_APPROVAL_REASON, TerraformWorkflowRunner, WorkflowRunner,
    approval_for,
};
pub use state::{
    CompletionReason, JobAction, JobActionId, JobActions, JobOutput, JobState, JobStatus,
    NotifyFn, StateNotifier, StoreError, WorkflowResult, WorkflowState, WorkflowStatus,
    WorkflowStore,
};
pub use steps::{
    ApplyStepRunner, EnvStepRunner, ExecutionContext, InitStepRunner, PlanStepRunner,
    RunStepRunner, StepError, StepRegistry, StepRunner,
};
