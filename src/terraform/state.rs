//! Terraform job state as streamed from the child workflow to its parent.
//!
//! # State machine
//!
//! Each job moves `Waiting -> InProgress -> {Success | Failed | Rejected}`.
//! Terminal statuses never change again. The apply job does not exist until
//! the plan job has succeeded.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::activities::PlanSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    InProgress,
    Success,
    Failed,
    Rejected,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed | JobStatus::Rejected)
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Waiting => 0,
            JobStatus::InProgress => 1,
            JobStatus::Success | JobStatus::Failed | JobStatus::Rejected => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobOutput {
    /// Where the job's logs can be viewed.
    pub url: Option<String>,
    pub plan_summary: Option<PlanSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobActionId {
    Confirm,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAction {
    pub id: JobActionId,
    pub info: String,
}

/// Choices offered while a job waits on a human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobActions {
    pub actions: Vec<JobAction>,
    pub summary: String,
}

impl JobActions {
    /// Confirm/reject choices for the plan review gate.
    pub fn plan_review(summary: impl Into<String>) -> Self {
        JobActions {
            actions: vec![
                JobAction {
                    id: JobActionId::Confirm,
                    info: "Confirm this plan to proceed to apply".to_string(),
                },
                JobAction {
                    id: JobActionId::Reject,
                    info: "Reject this plan to prevent the apply".to_string(),
                },
            ],
            summary: summary.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    pub status: JobStatus,
    pub output: JobOutput,
    pub on_waiting_actions: Option<JobActions>,
}

impl JobState {
    fn waiting(url: Option<String>) -> Self {
        JobState {
            status: JobStatus::Waiting,
            output: JobOutput {
                url,
                plan_summary: None,
            },
            on_waiting_actions: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    InProgress,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    SuccessfulCompletion,
    PlanRejected,
    InternalServiceError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub status: WorkflowStatus,
    pub reason: Option<CompletionReason>,
}

/// Snapshot of a terraform job workflow, sent to the parent on every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub plan: Option<JobState>,
    pub apply: Option<JobState>,
    pub result: WorkflowResult,
}

impl Default for WorkflowState {
    fn default() -> Self {
        WorkflowState {
            plan: None,
            apply: None,
            result: WorkflowResult {
                status: WorkflowStatus::InProgress,
                reason: None,
            },
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{job} job has not been initialized")]
    MissingJob { job: &'static str },

    #[error("{job} job cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        job: &'static str,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("apply job cannot start before the plan succeeds")]
    PlanNotSucceeded,

    #[error("failed to notify parent workflow: {0}")]
    Notify(String),
}

/// Receives every state change of a [`WorkflowStore`].
pub trait StateNotifier: Send {
    fn notify(&mut self, state: &WorkflowState) -> Result<(), StoreError>;
}

impl StateNotifier for mpsc::UnboundedSender<WorkflowState> {
    fn notify(&mut self, state: &WorkflowState) -> Result<(), StoreError> {
        self.send(state.clone())
            .map_err(|_| StoreError::Notify("parent stopped listening".to_string()))
    }
}

/// Adapts a closure into a [`StateNotifier`].
pub struct NotifyFn<F>(pub F);

impl<F> StateNotifier for NotifyFn<F>
where
    F: FnMut(&WorkflowState) -> Result<(), StoreError> + Send,
{
    fn notify(&mut self, state: &WorkflowState) -> Result<(), StoreError> {
        (self.0)(state)
    }
}

/// Owns a job workflow's state; every mutation is checked and forwarded.
pub struct WorkflowStore<N> {
    state: WorkflowState,
    notifier: N,
    job_url_base: Option<String>,
}

impl<N: StateNotifier> WorkflowStore<N> {
    pub fn new(notifier: N, job_url_base: Option<String>) -> Self {
        WorkflowStore {
            state: WorkflowState::default(),
            notifier,
            job_url_base,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// `{job_url_base}/jobs/{job_id}` when a base URL is configured.
    pub fn job_url(&self, job_id: &str) -> Option<String> {
        self.job_url_base
            .as_deref()
            .map(|base| format!("{}/jobs/{job_id}", base.trim_end_matches('/')))
    }

    pub fn init_plan_job(&mut self, job_id: &str) -> Result<(), StoreError> {
        self.state.plan = Some(JobState::waiting(self.job_url(job_id)));
        self.notify()
    }

    pub fn update_plan_job_with_status(
        &mut self,
        status: JobStatus,
        summary: Option<PlanSummary>,
    ) -> Result<(), StoreError> {
        let job = self
            .state
            .plan
            .as_mut()
            .ok_or(StoreError::MissingJob { job: "plan" })?;
        transition(job, "plan", status)?;
        if summary.is_some() {
            job.output.plan_summary = summary;
        }
        self.notify()
    }

    pub fn init_apply_job(&mut self, job_id: &str) -> Result<(), StoreError> {
        let plan_succeeded = self
            .state
            .plan
            .as_ref()
            .is_some_and(|plan| plan.status == JobStatus::Success);
        if !plan_succeeded {
            return Err(StoreError::PlanNotSucceeded);
        }
        self.state.apply = Some(JobState::waiting(self.job_url(job_id)));
        self.notify()
    }

    /// Offers confirm/reject on the waiting apply job.
    pub fn update_apply_job_with_actions(&mut self, actions: JobActions) -> Result<(), StoreError> {
        let job = self
            .state
            .apply
            .as_mut()
            .ok_or(StoreError::MissingJob { job: "apply" })?;
        if job.status != JobStatus::Waiting {
            return Err(StoreError::InvalidTransition {
                job: "apply",
                from: job.status,
                to: JobStatus::Waiting,
            });
        }
        job.on_waiting_actions = Some(actions);
        self.notify()
    }

    pub fn update_apply_job_with_status(&mut self, status: JobStatus) -> Result<(), StoreError> {
        let job = self
            .state
            .apply
            .as_mut()
            .ok_or(StoreError::MissingJob { job: "apply" })?;
        transition(job, "apply", status)?;
        job.on_waiting_actions = None;
        self.notify()
    }

    pub fn update_completion(&mut self, reason: CompletionReason) -> Result<(), StoreError> {
        self.state.result = WorkflowResult {
            status: WorkflowStatus::Complete,
            reason: Some(reason),
        };
        self.notify()
    }

    fn notify(&mut self) -> Result<(), StoreError> {
        self.notifier.notify(&self.state)
    }
}

fn transition(job: &mut JobState, name: &'static str, to: JobStatus) -> Result<(), StoreError> {
    if job.status.is_terminal() || to.rank() < job.status.rank() {
        return Err(StoreError::InvalidTransition {
            job: name,
            from: job.status,
            to,
        });
    }
    job.status = to;
    Ok(())
}
