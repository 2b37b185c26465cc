//! Parsing of `check_run` `requested_action` deliveries.
//!
//! Button presses on deploy check runs come back as `check_run` events with
//! `action: requested_action`. The check run's `external_id` names the
//! deployment and root the button belongs to. Every other event, and every
//! other `check_run` action, is ignored.

use serde::Deserialize;
use thiserror::Error;

use crate::checks::{ActionId, CheckRunExternalId};
use crate::deploy::UnlockSignal;
use crate::terraform::{PlanReviewSignal, PlanStatus};
use crate::types::{CheckRunId, DeploymentId, Repo, Revision};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("invalid field value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// A button pressed on one of our check runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedActionEvent {
    pub repo: Repo,
    pub check_run_id: CheckRunId,
    pub head_sha: Revision,
    pub external_id: CheckRunExternalId,
    pub action: ActionId,
    pub user: String,
}

/// What a requested action asks the deploy service to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionSignal {
    PlanReview {
        deployment_id: DeploymentId,
        signal: PlanReviewSignal,
    },
    Unlock {
        repo: Repo,
        root: String,
        signal: UnlockSignal,
    },
}

impl RequestedActionEvent {
    pub fn into_signal(self) -> ActionSignal {
        let review = |status| ActionSignal::PlanReview {
            deployment_id: self.external_id.deployment_id,
            signal: PlanReviewSignal {
                status,
                user: self.user.clone(),
            },
        };
        match self.action {
            ActionId::Confirm => review(PlanStatus::Approved),
            ActionId::Reject => review(PlanStatus::Rejected),
            ActionId::Unlock => ActionSignal::Unlock {
                repo: self.repo.clone(),
                root: self.external_id.root.clone(),
                signal: UnlockSignal {
                    user: self.user.clone(),
                },
            },
        }
    }
}

/// `Ok(None)` for deliveries that are not requested actions.
pub fn parse_webhook(
    event_type: &str,
    payload: &[u8],
) -> Result<Option<RequestedActionEvent>, ParseError> {
    if event_type != "check_run" {
        return Ok(None);
    }
    let raw: RawCheckRunPayload = serde_json::from_slice(payload)?;
    if raw.action != "requested_action" {
        return Ok(None);
    }
    let requested = raw.requested_action.ok_or(ParseError::InvalidField {
        field: "requested_action",
        value: "missing".to_string(),
    })?;
    let action = ActionId::parse(&requested.identifier).ok_or_else(|| ParseError::InvalidField {
        field: "requested_action.identifier",
        value: requested.identifier.clone(),
    })?;
    let external_id = raw.check_run.external_id.unwrap_or_default();
    let external_id =
        CheckRunExternalId::decode(&external_id).map_err(|_| ParseError::InvalidField {
            field: "check_run.external_id",
            value: external_id.clone(),
        })?;

    Ok(Some(RequestedActionEvent {
        repo: Repo::new(raw.repository.owner.login, raw.repository.name),
        check_run_id: CheckRunId(raw.check_run.id),
        head_sha: Revision::new(raw.check_run.head_sha),
        external_id,
        action,
        user: raw.sender.login,
    }))
}

// ─── Raw Payload ───

#[derive(Debug, Deserialize)]
struct RawCheckRunPayload {
    action: String,
    check_run: RawCheckRun,
    requested_action: Option<RawRequestedAction>,
    repository: RawRepository,
    sender: RawUser,
}

#[derive(Debug, Deserialize)]
struct RawCheckRun {
    id: u64,
    head_sha: String,
    external_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRequestedAction {
    identifier: String,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    owner: RawUser,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn payload(action: &str, identifier: &str, external_id: &str) -> Vec<u8> {
        serde_json::json!({
            "action": action,
            "check_run": {
                "id": 42,
                "head_sha": "abc123",
                "external_id": external_id,
                "status": "completed"
            },
            "requested_action": {"identifier": identifier},
            "repository": {"owner": {"login": "acme"}, "name": "infra"},
            "sender": {"login": "alice"}
        })
        .to_string()
        .into_bytes()
    }

    fn external_id() -> String {
        CheckRunExternalId::new(DeploymentId::new(Uuid::from_u128(9)), "prod").encode()
    }

    #[test]
    fn confirm_becomes_approval() {
        let event = parse_webhook("check_run", &payload("requested_action", "confirm", &external_id()))
            .unwrap()
            .unwrap();

        assert_eq!(event.check_run_id, CheckRunId(42));
        assert_eq!(event.head_sha, Revision::new("abc123"));
        assert_eq!(
            event.into_signal(),
            ActionSignal::PlanReview {
                deployment_id: DeploymentId::new(Uuid::from_u128(9)),
                signal: PlanReviewSignal {
                    status: PlanStatus::Approved,
                    user: "alice".to_string(),
                },
            }
        );
    }

    #[test]
    fn reject_becomes_rejection() {
        let event = parse_webhook("check_run", &payload("requested_action", "reject", &external_id()))
            .unwrap()
            .unwrap();

        assert!(matches!(
            event.into_signal(),
            ActionSignal::PlanReview { signal: PlanReviewSignal { status: PlanStatus::Rejected, .. }, .. }
        ));
    }

    #[test]
    fn unlock_targets_root_of_external_id() {
        let event = parse_webhook("check_run", &payload("requested_action", "unlock", &external_id()))
            .unwrap()
            .unwrap();

        assert_eq!(
            event.into_signal(),
            ActionSignal::Unlock {
                repo: Repo::new("acme", "infra"),
                root: "prod".to_string(),
                signal: UnlockSignal {
                    user: "alice".to_string(),
                },
            }
        );
    }

    #[test]
    fn other_events_and_actions_are_ignored() {
        assert!(parse_webhook("push", b"{}").unwrap().is_none());
        assert!(
            parse_webhook("check_run", &payload("completed", "confirm", &external_id()))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn unknown_identifier_is_invalid() {
        let err = parse_webhook("check_run", &payload("requested_action", "explode", &external_id()))
            .unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { field: "requested_action.identifier", .. }));
    }

    #[test]
    fn foreign_external_id_is_invalid() {
        let err = parse_webhook("check_run", &payload("requested_action", "confirm", "ci-run-7"))
            .unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { field: "check_run.external_id", .. }));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            parse_webhook("check_run", b"{not json"),
            Err(ParseError::JsonError(_))
        ));
    }
}
