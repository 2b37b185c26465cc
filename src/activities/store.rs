use std::future::Future;

use super::ActivityError;
use crate::types::DeploymentRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchLatestDeploymentRequest {
    /// `owner/name`
    pub full_repository_name: String,
    pub root_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLatestDeploymentRequest {
    pub deployment: DeploymentRecord,
}

/// Durable "latest deployment" record per (repo, root). Last writer wins.
pub trait DeploymentStore: Send + Sync {
    /// `None` if nothing has been deployed for this root yet.
    fn fetch_latest_deployment(
        &self,
        request: FetchLatestDeploymentRequest,
    ) -> impl Future<Output = Result<Option<DeploymentRecord>, ActivityError>> + Send;

    fn store_latest_deployment(
        &self,
        request: StoreLatestDeploymentRequest,
    ) -> impl Future<Output = Result<(), ActivityError>> + Send;
}
