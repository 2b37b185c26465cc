use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ActivityError;
use crate::types::PlanMode;

/// A resource touched by a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub address: String,
}

/// Resources a plan would create, delete or update.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlanSummary {
    #[serde(default)]
    pub creations: Vec<ResourceSummary>,
    #[serde(default)]
    pub deletions: Vec<ResourceSummary>,
    #[serde(default)]
    pub updates: Vec<ResourceSummary>,
}

impl PlanSummary {
    /// A no-op plan.
    pub fn is_empty(&self) -> bool {
        self.creations.is_empty() && self.deletions.is_empty() && self.updates.is_empty()
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to add, {} to change, {} to destroy",
            self.creations.len(),
            self.updates.len(),
            self.deletions.len()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerraformInitRequest {
    pub args: Vec<String>,
    pub envs: BTreeMap<String, String>,
    pub tf_version: Option<String>,
    pub path: PathBuf,
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerraformPlanRequest {
    pub args: Vec<String>,
    pub envs: BTreeMap<String, String>,
    pub tf_version: Option<String>,
    pub path: PathBuf,
    pub job_id: String,
    pub plan_file: PathBuf,
    pub plan_mode: PlanMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerraformApplyRequest {
    pub args: Vec<String>,
    pub envs: BTreeMap<String, String>,
    pub tf_version: Option<String>,
    pub path: PathBuf,
    pub job_id: String,
    pub plan_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TerraformOutput {
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TerraformPlanResponse {
    pub output: String,
    pub summary: PlanSummary,
}

/// Terraform CLI invocations. A failed invocation is a permanent error:
/// re-running a failed apply blindly is unsafe.
pub trait TerraformActivities: Send + Sync {
    fn terraform_init(
        &self,
        request: TerraformInitRequest,
    ) -> impl Future<Output = Result<TerraformOutput, ActivityError>> + Send;

    fn terraform_plan(
        &self,
        request: TerraformPlanRequest,
    ) -> impl Future<Output = Result<TerraformPlanResponse, ActivityError>> + Send;

    fn terraform_apply(
        &self,
        request: TerraformApplyRequest,
    ) -> impl Future<Output = Result<TerraformOutput, ActivityError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteCommandRequest {
    pub command: String,
    pub path: PathBuf,
    pub envs: BTreeMap<String, String>,
}

/// Arbitrary shell commands from `run` and `env` steps.
pub trait CommandActivities: Send + Sync {
    /// Returns captured stdout.
    fn execute_command(
        &self,
        request: ExecuteCommandRequest,
    ) -> impl Future<Output = Result<String, ActivityError>> + Send;
}
