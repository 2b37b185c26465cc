//! Turns terraform job state snapshots into check run updates.

use std::fmt::Write as _;

use tracing::error;

use super::state::{CompletionReason, JobState, JobStatus, WorkflowState, WorkflowStatus};
use crate::activities::CheckRunClient;
use crate::checks::{
    CheckRunAction, CheckRunCache, CheckRunExternalId, CheckRunRequest, CheckRunState,
    build_check_run_title,
};
use crate::types::DeploymentInfo;

pub struct StateReceiver<C> {
    cache: CheckRunCache<C>,
}

impl<C: CheckRunClient> StateReceiver<C> {
    pub fn new(cache: CheckRunCache<C>) -> Self {
        StateReceiver { cache }
    }

    /// Continues updating the check run created when `info` was queued.
    pub fn seed(&mut self, info: &DeploymentInfo) {
        if let Some(id) = info.check_run_id {
            self.cache
                .seed(info.id, &build_check_run_title(&info.root.name), id);
        }
    }

    /// Reflects `state` on the deployment's check run. Failures are logged;
    /// a missed update never fails the deployment.
    pub async fn receive(&mut self, info: &DeploymentInfo, state: &WorkflowState) {
        let request = render(info, state);
        if let Err(e) = self.cache.create_or_update(info.id, request).await {
            error!(deployment_id = %info.id, error = %e, "failed to update check run with job state");
        }
    }
}

/// Check run for a job state snapshot.
pub fn render(info: &DeploymentInfo, state: &WorkflowState) -> CheckRunRequest {
    let (check_state, actions) = check_run_state(state);
    CheckRunRequest {
        title: build_check_run_title(&info.root.name),
        sha: info.revision.clone(),
        repo: info.repo.clone(),
        state: check_state,
        actions,
        summary: summary(state),
        external_id: CheckRunExternalId::new(info.id, info.root.name.clone()).encode(),
    }
}

fn check_run_state(state: &WorkflowState) -> (CheckRunState, Vec<CheckRunAction>) {
    if state.result.status == WorkflowStatus::Complete {
        let check = match state.result.reason {
            Some(CompletionReason::SuccessfulCompletion) => CheckRunState::Success,
            _ => CheckRunState::Failure,
        };
        return (check, vec![]);
    }

    if let Some(apply) = &state.apply {
        return match apply.status {
            JobStatus::Waiting if apply.on_waiting_actions.is_some() => (
                CheckRunState::ActionRequired,
                vec![CheckRunAction::confirm(), CheckRunAction::reject()],
            ),
            JobStatus::Waiting | JobStatus::InProgress => (CheckRunState::InProgress, vec![]),
            JobStatus::Success => (CheckRunState::Success, vec![]),
            JobStatus::Failed | JobStatus::Rejected => (CheckRunState::Failure, vec![]),
        };
    }

    match state.plan.as_ref().map(|plan| plan.status) {
        None => (CheckRunState::Queued, vec![]),
        Some(JobStatus::Waiting | JobStatus::InProgress | JobStatus::Success) => {
            (CheckRunState::InProgress, vec![])
        }
        Some(JobStatus::Failed | JobStatus::Rejected) => (CheckRunState::Failure, vec![]),
    }
}

fn summary(state: &WorkflowState) -> String {
    let mut out = String::new();
    if let Some(plan) = &state.plan {
        job_line(&mut out, "Plan", plan);
        if let Some(summary) = &plan.output.plan_summary {
            let _ = writeln!(out, "> {summary}");
        }
    }
    if let Some(apply) = &state.apply {
        job_line(&mut out, "Apply", apply);
        if let Some(actions) = &apply.on_waiting_actions {
            if !actions.summary.is_empty() {
                let _ = writeln!(out, "\n{}", actions.summary);
            }
            for action in &actions.actions {
                let _ = writeln!(out, "- {}", action.info);
            }
        }
    }
    if let Some(CompletionReason::PlanRejected) = state.result.reason {
        let _ = writeln!(out, "\nThe plan was rejected; nothing was applied.");
    }
    out
}

fn job_line(out: &mut String, name: &str, job: &JobState) {
    let status = match job.status {
        JobStatus::Waiting => "waiting",
        JobStatus::InProgress => "in progress",
        JobStatus::Success => "succeeded",
        JobStatus::Failed => "failed",
        JobStatus::Rejected => "rejected",
    };
    match &job.output.url {
        Some(url) => {
            let _ = writeln!(out, "**{name}**: {status} ([logs]({url}))");
        }
        None => {
            let _ = writeln!(out, "**{name}**: {status}");
        }
    }
}
