use std::future::Future;
use std::path::PathBuf;

use super::ActivityError;
use crate::types::{DeploymentId, LocalRoot, Repo, Revision, Root};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRootRequest {
    pub repo: Repo,
    pub root: Root,
    pub deployment_id: DeploymentId,
    pub revision: Revision,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRootResponse {
    pub local_root: LocalRoot,
    /// Removed by [`RootActivities::cleanup`] when the job ends.
    pub deploy_directory: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupRequest {
    pub deploy_directory: PathBuf,
}

/// Materializes a root on local disk and removes it afterwards.
pub trait RootActivities: Send + Sync {
    fn fetch_root(
        &self,
        request: FetchRootRequest,
    ) -> impl Future<Output = Result<FetchRootResponse, ActivityError>> + Send;

    fn cleanup(&self, request: CleanupRequest) -> impl Future<Output = Result<(), ActivityError>> + Send;
}
