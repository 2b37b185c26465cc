//! Core domain types for the deployment train.
//!
//! Everything the queue, deployer and terraform workflow pass between each
//! other lives here, so the wire and persistence formats are defined in one
//! place.

pub mod deployment;
pub mod ids;
pub mod root;

pub use deployment::{
    DeploymentInfo, DeploymentRecord, DiffDirection, RECORD_SCHEMA_VERSION, RecordRepo, RecordRoot,
    record_key,
};
pub use ids::{CheckRunId, DeploymentId, Repo, Revision};
pub use root::{
    ApprovalType, Job, LocalRoot, PlanApproval, PlanJob, PlanMode, Root, Step, StepKind, Trigger,
};
