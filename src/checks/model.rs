//! Check run requests, states and action buttons.

use serde::{Deserialize, Serialize};

use crate::types::{CheckRunId, DeploymentId, Repo, Revision};

pub const CHECK_RUN_TITLE_PREFIX: &str = "deploy-train/deploy";

/// Check run name for a root, e.g. `deploy-train/deploy: prod`.
pub fn build_check_run_title(root_name: &str) -> String {
    format!("{CHECK_RUN_TITLE_PREFIX}: {root_name}")
}

/// What a check run shows in the GitHub UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckRunState {
    Queued,
    InProgress,
    /// Completed, waiting on a button press.
    ActionRequired,
    Success,
    Failure,
    TimedOut,
}

impl CheckRunState {
    pub fn status(&self) -> CheckRunStatus {
        match self {
            CheckRunState::Queued => CheckRunStatus::Queued,
            CheckRunState::InProgress => CheckRunStatus::InProgress,
            CheckRunState::ActionRequired
            | CheckRunState::Success
            | CheckRunState::Failure
            | CheckRunState::TimedOut => CheckRunStatus::Completed,
        }
    }

    /// GitHub `conclusion`, present only for completed runs.
    pub fn conclusion(&self) -> Option<&'static str> {
        match self {
            CheckRunState::Queued | CheckRunState::InProgress => None,
            CheckRunState::ActionRequired => Some("action_required"),
            CheckRunState::Success => Some("success"),
            CheckRunState::Failure => Some("failure"),
            CheckRunState::TimedOut => Some("timed_out"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckRunStatus {
    Queued,
    InProgress,
    Completed,
}

impl CheckRunStatus {
    pub fn is_completed(&self) -> bool {
        *self == CheckRunStatus::Completed
    }
}

/// Identifier GitHub echoes back in a `requested_action` webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionId {
    Unlock,
    Confirm,
    Reject,
}

impl ActionId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionId::Unlock => "unlock",
            ActionId::Confirm => "confirm",
            ActionId::Reject => "reject",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unlock" => Some(ActionId::Unlock),
            "confirm" => Some(ActionId::Confirm),
            "reject" => Some(ActionId::Reject),
            _ => None,
        }
    }
}

/// A button on a check run. GitHub caps labels at 20 characters and
/// descriptions at 40.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRunAction {
    pub id: ActionId,
    pub label: &'static str,
    pub description: &'static str,
}

impl CheckRunAction {
    pub fn unlock() -> Self {
        CheckRunAction {
            id: ActionId::Unlock,
            label: "Unlock",
            description: "Unlock queued merge deploys",
        }
    }

    pub fn confirm() -> Self {
        CheckRunAction {
            id: ActionId::Confirm,
            label: "Confirm",
            description: "Confirm plan and proceed to apply",
        }
    }

    pub fn reject() -> Self {
        CheckRunAction {
            id: ActionId::Reject,
            label: "Reject",
            description: "Reject plan and skip the apply",
        }
    }
}

/// JSON carried in a check run's `external_id`, used to route button presses
/// back to the deployment that owns the check run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRunExternalId {
    pub deployment_id: DeploymentId,
    pub root: String,
}

impl CheckRunExternalId {
    pub fn new(deployment_id: DeploymentId, root: impl Into<String>) -> Self {
        CheckRunExternalId {
            deployment_id,
            root: root.into(),
        }
    }

    pub fn encode(&self) -> String {
        // Two plain fields; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Check run content, before it is known whether it is a create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRunRequest {
    pub title: String,
    pub sha: Revision,
    pub repo: Repo,
    pub state: CheckRunState,
    pub actions: Vec<CheckRunAction>,
    pub summary: String,
    pub external_id: String,
}

impl CheckRunRequest {
    pub fn into_create(self) -> CreateCheckRunRequest {
        CreateCheckRunRequest {
            title: self.title,
            sha: self.sha,
            repo: self.repo,
            state: self.state,
            actions: self.actions,
            summary: self.summary,
            external_id: self.external_id,
        }
    }

    pub fn into_update(self, id: CheckRunId) -> UpdateCheckRunRequest {
        UpdateCheckRunRequest {
            title: self.title,
            repo: self.repo,
            id,
            state: self.state,
            actions: self.actions,
            summary: self.summary,
            external_id: self.external_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCheckRunRequest {
    pub title: String,
    pub sha: Revision,
    pub repo: Repo,
    pub state: CheckRunState,
    pub actions: Vec<CheckRunAction>,
    pub summary: String,
    pub external_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCheckRunRequest {
    pub title: String,
    pub repo: Repo,
    pub id: CheckRunId,
    pub state: CheckRunState,
    pub actions: Vec<CheckRunAction>,
    pub summary: String,
    pub external_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckRunResponse {
    pub id: CheckRunId,
    pub status: CheckRunStatus,
}
