//! Deployment units of work and the persisted "latest deployment" record.

use serde::{Deserialize, Serialize};

use super::ids::{CheckRunId, DeploymentId, Repo, Revision};
use super::root::{Root, Trigger};

/// Current version of the persisted [`DeploymentRecord`] format.
pub const RECORD_SCHEMA_VERSION: u32 = 1;

/// One revision of one root waiting in, or popped from, the revision queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentInfo {
    pub id: DeploymentId,
    pub revision: Revision,
    pub root: Root,
    pub repo: Repo,
    /// Set once the queued check run has been created.
    pub check_run_id: Option<CheckRunId>,
}

impl DeploymentInfo {
    pub fn trigger(&self) -> Trigger {
        self.root.trigger
    }

    /// Builds the record persisted after this deployment was attempted.
    pub fn to_record(&self) -> DeploymentRecord {
        DeploymentRecord {
            version: RECORD_SCHEMA_VERSION,
            id: self.id,
            revision: self.revision.clone(),
            root: RecordRoot {
                name: self.root.name.clone(),
                trigger: self.root.trigger,
            },
            repo: RecordRepo {
                owner: self.repo.owner.clone(),
                name: self.repo.name.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRoot {
    pub name: String,
    #[serde(default)]
    pub trigger: Trigger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRepo {
    pub owner: String,
    pub name: String,
}

/// The last deployment attempted against real infrastructure for a root.
///
/// At most one exists per (repo, root). It is overwritten after every deploy
/// that was not a plan rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub version: u32,
    pub id: DeploymentId,
    pub revision: Revision,
    pub root: RecordRoot,
    pub repo: RecordRepo,
}

impl DeploymentRecord {
    /// Blob key under which the record is stored.
    pub fn key(&self) -> String {
        record_key(&self.repo.owner, &self.repo.name, &self.root.name)
    }
}

/// `{owner}/{repo}/{root}/deployment.json`
pub fn record_key(owner: &str, repo: &str, root: &str) -> String {
    format!("{owner}/{repo}/{root}/deployment.json")
}

/// Relationship of a requested revision to the last deployed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffDirection {
    Ahead,
    Behind,
    Identical,
    /// No common lineage.
    Diverged,
}

impl std::fmt::Display for DiffDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DiffDirection::Ahead => "ahead",
            DiffDirection::Behind => "behind",
            DiffDirection::Identical => "identical",
            DiffDirection::Diverged => "diverged",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn info() -> DeploymentInfo {
        DeploymentInfo {
            id: DeploymentId::new(Uuid::from_u128(7)),
            revision: Revision::new("abc123"),
            root: Root::new("prod", "envs/prod").with_trigger(Trigger::Manual),
            repo: Repo::new("acme", "infra"),
            check_run_id: Some(CheckRunId(9)),
        }
    }

    #[test]
    fn record_keeps_identity_of_the_request() {
        let record = info().to_record();
        assert_eq!(record.version, RECORD_SCHEMA_VERSION);
        assert_eq!(record.id, info().id);
        assert_eq!(record.revision, Revision::new("abc123"));
        assert_eq!(record.root.name, "prod");
        assert_eq!(record.root.trigger, Trigger::Manual);
        assert_eq!(record.key(), "acme/infra/prod/deployment.json");
    }

    #[test]
    fn record_json_layout() {
        let json = serde_json::to_value(info().to_record()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "version": 1,
                "id": "00000000-0000-0000-0000-000000000007",
                "revision": "abc123",
                "root": {"name": "prod", "trigger": "manual"},
                "repo": {"owner": "acme", "name": "infra"},
            })
        );
    }

    #[test]
    fn record_without_trigger_defaults_to_merge() {
        let record: DeploymentRecord = serde_json::from_str(
            r#"{"version":1,"id":"00000000-0000-0000-0000-000000000001","revision":"r",
                "root":{"name":"prod"},"repo":{"owner":"a","name":"b"}}"#,
        )
        .unwrap();
        assert_eq!(record.root.trigger, Trigger::Merge);
    }
}
