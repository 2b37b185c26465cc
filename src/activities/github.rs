use std::future::Future;

use super::ActivityError;
use crate::checks::{CheckRunResponse, CreateCheckRunRequest, UpdateCheckRunRequest};
use crate::types::{DiffDirection, Repo, Revision};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareCommitRequest {
    pub repo: Repo,
    pub deploy_request_revision: Revision,
    pub latest_deployed_revision: Revision,
}

/// Commit lineage lookups.
pub trait CommitComparer: Send + Sync {
    /// Direction of `deploy_request_revision` relative to
    /// `latest_deployed_revision`.
    fn compare_commits(
        &self,
        request: CompareCommitRequest,
    ) -> impl Future<Output = Result<DiffDirection, ActivityError>> + Send;
}

/// Creates and updates check runs.
pub trait CheckRunClient: Send + Sync {
    fn create_check_run(
        &self,
        request: CreateCheckRunRequest,
    ) -> impl Future<Output = Result<CheckRunResponse, ActivityError>> + Send;

    fn update_check_run(
        &self,
        request: UpdateCheckRunRequest,
    ) -> impl Future<Output = Result<CheckRunResponse, ActivityError>> + Send;
}
