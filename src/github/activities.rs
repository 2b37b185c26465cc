//! Commit comparison and check runs over the GitHub REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::client::GitHubClient;
use super::error::GitHubApiError;
use crate::activities::{ActivityError, CheckRunClient, CommitComparer, CompareCommitRequest};
use crate::checks::{
    CheckRunAction, CheckRunResponse, CheckRunState, CheckRunStatus, CreateCheckRunRequest,
    UpdateCheckRunRequest,
};
use crate::types::{CheckRunId, DiffDirection};

// ─── Wire Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CompareResponse {
    status: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct ActionPayload {
    label: &'static str,
    description: &'static str,
    identifier: &'static str,
}

#[derive(Debug, Serialize, PartialEq)]
struct OutputPayload {
    title: String,
    summary: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct CheckRunPayload {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    head_sha: Option<String>,
    status: CheckRunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    conclusion: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
    external_id: String,
    output: OutputPayload,
    actions: Vec<ActionPayload>,
}

#[derive(Debug, Deserialize)]
struct CheckRunApiResponse {
    id: u64,
    status: CheckRunStatus,
}

impl From<CheckRunApiResponse> for CheckRunResponse {
    fn from(response: CheckRunApiResponse) -> Self {
        CheckRunResponse {
            id: CheckRunId(response.id),
            status: response.status,
        }
    }
}

fn parse_direction(status: &str) -> Result<DiffDirection, GitHubApiError> {
    match status {
        "ahead" => Ok(DiffDirection::Ahead),
        "behind" => Ok(DiffDirection::Behind),
        "identical" => Ok(DiffDirection::Identical),
        "diverged" => Ok(DiffDirection::Diverged),
        other => Err(GitHubApiError::permanent_without_source(format!(
            "unknown compare status {other:?}"
        ))),
    }
}

struct PayloadParts<'a> {
    title: &'a str,
    head_sha: Option<&'a str>,
    state: CheckRunState,
    actions: &'a [CheckRunAction],
    summary: &'a str,
    external_id: &'a str,
}

fn check_run_payload(parts: PayloadParts<'_>, now: DateTime<Utc>) -> CheckRunPayload {
    let status = parts.state.status();
    CheckRunPayload {
        name: parts.title.to_string(),
        head_sha: parts.head_sha.map(str::to_string),
        status,
        conclusion: parts.state.conclusion(),
        completed_at: status.is_completed().then_some(now),
        external_id: parts.external_id.to_string(),
        output: OutputPayload {
            title: parts.title.to_string(),
            summary: parts.summary.to_string(),
        },
        actions: parts
            .actions
            .iter()
            .map(|action| ActionPayload {
                label: action.label,
                description: action.description,
                identifier: action.id.as_str(),
            })
            .collect(),
    }
}

// ─── Activity Implementations ─────────────────────────────────────────────────

impl CommitComparer for GitHubClient {
    async fn compare_commits(
        &self,
        request: CompareCommitRequest,
    ) -> Result<DiffDirection, ActivityError> {
        let url = format!(
            "/repos/{}/{}/compare/{}...{}",
            request.repo.owner,
            request.repo.name,
            request.latest_deployed_revision,
            request.deploy_request_revision
        );
        let response: CompareResponse = self
            .inner()
            .get(&url, None::<&()>)
            .await
            .map_err(GitHubApiError::from_octocrab)?;
        let direction = parse_direction(&response.status)?;
        debug!(
            repo = %request.repo,
            base = %request.latest_deployed_revision,
            head = %request.deploy_request_revision,
            %direction,
            "compared commits"
        );
        Ok(direction)
    }
}

impl CheckRunClient for GitHubClient {
    async fn create_check_run(
        &self,
        request: CreateCheckRunRequest,
    ) -> Result<CheckRunResponse, ActivityError> {
        let url = format!(
            "/repos/{}/{}/check-runs",
            request.repo.owner, request.repo.name
        );
        let payload = check_run_payload(
            PayloadParts {
                title: &request.title,
                head_sha: Some(request.sha.as_str()),
                state: request.state,
                actions: &request.actions,
                summary: &request.summary,
                external_id: &request.external_id,
            },
            Utc::now(),
        );
        let response: CheckRunApiResponse = self
            .inner()
            .post(&url, Some(&payload))
            .await
            .map_err(GitHubApiError::from_octocrab)?;
        Ok(response.into())
    }

    async fn update_check_run(
        &self,
        request: UpdateCheckRunRequest,
    ) -> Result<CheckRunResponse, ActivityError> {
        let url = format!(
            "/repos/{}/{}/check-runs/{}",
            request.repo.owner, request.repo.name, request.id.0
        );
        let payload = check_run_payload(
            PayloadParts {
                title: &request.title,
                head_sha: None,
                state: request.state,
                actions: &request.actions,
                summary: &request.summary,
                external_id: &request.external_id,
            },
            Utc::now(),
        );
        let response: CheckRunApiResponse = self
            .inner()
            .patch(&url, Some(&payload))
            .await
            .map_err(GitHubApiError::from_octocrab)?;
        Ok(response.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn compare_status_maps_to_direction() {
        assert_eq!(parse_direction("ahead").unwrap(), DiffDirection::Ahead);
        assert_eq!(parse_direction("behind").unwrap(), DiffDirection::Behind);
        assert_eq!(parse_direction("identical").unwrap(), DiffDirection::Identical);
        assert_eq!(parse_direction("diverged").unwrap(), DiffDirection::Diverged);
        assert!(parse_direction("sideways").is_err());
    }

    #[test]
    fn queued_payload_has_no_conclusion() {
        let payload = check_run_payload(
            PayloadParts {
                title: "deploy-train/deploy: prod",
                head_sha: Some("abc123"),
                state: CheckRunState::Queued,
                actions: &[],
                summary: "Queued",
                external_id: "{}",
            },
            now(),
        );

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(json["head_sha"], "abc123");
        assert!(json.get("conclusion").is_none());
        assert!(json.get("completed_at").is_none());
        assert_eq!(json["output"]["summary"], "Queued");
    }

    #[test]
    fn action_required_payload_carries_buttons() {
        let actions = [CheckRunAction::confirm(), CheckRunAction::reject()];
        let payload = check_run_payload(
            PayloadParts {
                title: "deploy-train/deploy: prod",
                head_sha: None,
                state: CheckRunState::ActionRequired,
                actions: &actions,
                summary: "Review the plan",
                external_id: "{}",
            },
            now(),
        );

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["conclusion"], "action_required");
        assert_eq!(json["completed_at"], "2024-05-01T12:00:00Z");
        assert!(json.get("head_sha").is_none());
        assert_eq!(json["actions"][0]["identifier"], "confirm");
        assert_eq!(json["actions"][1]["identifier"], "reject");
    }

    #[test]
    fn api_response_is_parsed() {
        let response: CheckRunApiResponse =
            serde_json::from_str(r#"{"id": 99, "status": "in_progress", "name": "x"}"#).unwrap();
        let response = CheckRunResponse::from(response);
        assert_eq!(response.id, CheckRunId(99));
        assert_eq!(response.status, CheckRunStatus::InProgress);
    }
}
