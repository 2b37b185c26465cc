//! Activity traits: the narrow side-effecting capabilities the workflows
//! consume.
//!
//! Each consumer depends only on the capabilities it uses:
//!
//! - the deployer compares commits, updates check runs and stores the latest
//!   deployment
//! - the terraform runner updates check runs
//! - the terraform job fetches roots, runs terraform and shell commands, and
//!   cleans up
//!
//! The trait-based design enables:
//! - Fake implementations for testing (see `test_utils`)
//! - Real adapters in `github`, `persistence` and `local`

pub mod error;
pub mod github;
pub mod root;
pub mod store;
pub mod terraform;

pub use error::{ActivityError, ActivityErrorKind};
pub use github::{CheckRunClient, CommitComparer, CompareCommitRequest};
pub use root::{CleanupRequest, FetchRootRequest, FetchRootResponse, RootActivities};
pub use store::{DeploymentStore, FetchLatestDeploymentRequest, StoreLatestDeploymentRequest};
pub use terraform::{
    CommandActivities, ExecuteCommandRequest, PlanSummary, ResourceSummary, TerraformActivities,
    TerraformApplyRequest, TerraformInitRequest, TerraformOutput, TerraformPlanRequest,
    TerraformPlanResponse,
};
