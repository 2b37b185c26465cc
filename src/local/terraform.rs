//! Terraform CLI adapter.
//!
//! Versions are selected by binary name: a root pinned to `1.5.7` runs
//! `{bin}1.5.7`, matching how versioned terraform binaries are usually
//! installed side by side.

use std::path::Path;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use super::process::{combined_output, run};
use crate::activities::{
    ActivityError, PlanSummary, ResourceSummary, TerraformActivities, TerraformApplyRequest,
    TerraformInitRequest, TerraformOutput, TerraformPlanRequest, TerraformPlanResponse,
};
use crate::types::PlanMode;

#[derive(Debug, Clone)]
pub struct TerraformCli {
    bin: String,
}

impl TerraformCli {
    pub fn new(bin: impl Into<String>) -> Self {
        TerraformCli { bin: bin.into() }
    }

    fn binary(&self, tf_version: Option<&str>) -> String {
        match tf_version {
            Some(version) => format!("{}{version}", self.bin),
            None => self.bin.clone(),
        }
    }

    fn command<'a>(
        &self,
        tf_version: Option<&str>,
        path: &Path,
        envs: impl IntoIterator<Item = (&'a String, &'a String)>,
        args: &[String],
    ) -> (Command, String) {
        let bin = self.binary(tf_version);
        let display = format!("{bin} {}", args.join(" "));
        let mut command = Command::new(&bin);
        command
            .args(args)
            .current_dir(path)
            .env("TF_IN_AUTOMATION", "true")
            .envs(envs);
        (command, display)
    }
}

impl Default for TerraformCli {
    fn default() -> Self {
        TerraformCli::new("terraform")
    }
}

fn init_args(extra: &[String]) -> Vec<String> {
    let mut args = vec![
        "init".to_string(),
        "-input=false".to_string(),
        "-no-color".to_string(),
    ];
    args.extend_from_slice(extra);
    args
}

fn plan_args(request: &TerraformPlanRequest) -> Vec<String> {
    let mut args = vec![
        "plan".to_string(),
        "-input=false".to_string(),
        "-no-color".to_string(),
        format!("-out={}", request.plan_file.display()),
    ];
    if request.plan_mode == PlanMode::Destroy {
        args.push("-destroy".to_string());
    }
    args.extend_from_slice(&request.args);
    args
}

fn apply_args(request: &TerraformApplyRequest) -> Vec<String> {
    let mut args = vec![
        "apply".to_string(),
        "-input=false".to_string(),
        "-no-color".to_string(),
    ];
    args.extend_from_slice(&request.args);
    args.push(request.plan_file.display().to_string());
    args
}

// ─── Plan JSON ───

#[derive(Debug, Deserialize)]
struct ShowPlan {
    #[serde(default)]
    resource_changes: Vec<ResourceChange>,
}

#[derive(Debug, Deserialize)]
struct ResourceChange {
    address: String,
    change: Change,
}

#[derive(Debug, Deserialize)]
struct Change {
    actions: Vec<String>,
}

/// Summarizes `terraform show -json` output. A replacement counts as both a
/// deletion and a creation; `read` and `no-op` changes are ignored.
pub fn summarize_plan(json: &str) -> Result<PlanSummary, serde_json::Error> {
    let plan: ShowPlan = serde_json::from_str(json)?;
    let mut summary = PlanSummary::default();
    for change in plan.resource_changes {
        let resource = || ResourceSummary {
            address: change.address.clone(),
        };
        for action in &change.change.actions {
            match action.as_str() {
                "create" => summary.creations.push(resource()),
                "delete" => summary.deletions.push(resource()),
                "update" => summary.updates.push(resource()),
                _ => {}
            }
        }
    }
    Ok(summary)
}

impl TerraformActivities for TerraformCli {
    async fn terraform_init(
        &self,
        request: TerraformInitRequest,
    ) -> Result<TerraformOutput, ActivityError> {
        let (command, cmd_display) = self.command(
            request.tf_version.as_deref(),
            &request.path,
            &request.envs,
            &init_args(&request.args),
        );
        debug!(job_id = %request.job_id, display = %cmd_display, "running terraform init");
        let output = run(command, &cmd_display).await?;
        Ok(TerraformOutput {
            output: combined_output(&output),
        })
    }

    async fn terraform_plan(
        &self,
        request: TerraformPlanRequest,
    ) -> Result<TerraformPlanResponse, ActivityError> {
        let (command, cmd_display) = self.command(
            request.tf_version.as_deref(),
            &request.path,
            &request.envs,
            &plan_args(&request),
        );
        debug!(job_id = %request.job_id, display = %cmd_display, "running terraform plan");
        let output = run(command, &cmd_display).await?;

        let show_args = vec![
            "show".to_string(),
            "-json".to_string(),
            request.plan_file.display().to_string(),
        ];
        let (show, show_display) = self.command(
            request.tf_version.as_deref(),
            &request.path,
            &request.envs,
            &show_args,
        );
        let shown = run(show, &show_display).await?;
        let summary = summarize_plan(&String::from_utf8_lossy(&shown.stdout)).map_err(|e| {
            ActivityError::permanent(format!("unreadable plan json: {e}")).with_source(e)
        })?;
        info!(job_id = %request.job_id, %summary, "terraform plan finished");

        Ok(TerraformPlanResponse {
            output: combined_output(&output),
            summary,
        })
    }

    async fn terraform_apply(
        &self,
        request: TerraformApplyRequest,
    ) -> Result<TerraformOutput, ActivityError> {
        let (command, cmd_display) = self.command(
            request.tf_version.as_deref(),
            &request.path,
            &request.envs,
            &apply_args(&request),
        );
        debug!(job_id = %request.job_id, display = %cmd_display, "running terraform apply");
        let output = run(command, &cmd_display).await?;
        Ok(TerraformOutput {
            output: combined_output(&output),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn plan_request(mode: PlanMode) -> TerraformPlanRequest {
        TerraformPlanRequest {
            args: vec!["-parallelism=5".to_string()],
            envs: BTreeMap::new(),
            tf_version: None,
            path: PathBuf::from("/work/prod"),
            job_id: "job".to_string(),
            plan_file: PathBuf::from("/work/prod/output.tfplan"),
            plan_mode: mode,
        }
    }

    #[test]
    fn plan_args_follow_mode() {
        assert_eq!(
            plan_args(&plan_request(PlanMode::Normal)),
            vec![
                "plan",
                "-input=false",
                "-no-color",
                "-out=/work/prod/output.tfplan",
                "-parallelism=5"
            ]
        );
        assert!(plan_args(&plan_request(PlanMode::Destroy)).contains(&"-destroy".to_string()));
    }

    #[test]
    fn apply_uses_saved_plan_last() {
        let args = apply_args(&TerraformApplyRequest {
            args: vec!["-lock-timeout=5m".to_string()],
            envs: BTreeMap::new(),
            tf_version: None,
            path: PathBuf::from("/work/prod"),
            job_id: "job".to_string(),
            plan_file: PathBuf::from("/work/prod/output.tfplan"),
        });
        assert_eq!(args.last().unwrap(), "/work/prod/output.tfplan");
        assert_eq!(args[3], "-lock-timeout=5m");
    }

    #[test]
    fn version_selects_binary() {
        let cli = TerraformCli::default();
        assert_eq!(cli.binary(None), "terraform");
        assert_eq!(cli.binary(Some("1.5.7")), "terraform1.5.7");
    }

    #[test]
    fn plan_json_is_summarized() {
        let json = r#"{
            "format_version": "1.2",
            "resource_changes": [
                {"address": "aws_s3_bucket.logs", "change": {"actions": ["create"]}},
                {"address": "aws_iam_role.ci", "change": {"actions": ["update"]}},
                {"address": "aws_instance.web", "change": {"actions": ["delete", "create"]}},
                {"address": "data.aws_caller_identity.me", "change": {"actions": ["read"]}},
                {"address": "aws_vpc.main", "change": {"actions": ["no-op"]}}
            ]
        }"#;

        let summary = summarize_plan(json).unwrap();

        assert_eq!(summary.to_string(), "2 to add, 1 to change, 1 to destroy");
        assert_eq!(summary.deletions[0].address, "aws_instance.web");
    }

    #[test]
    fn plan_without_changes_is_empty() {
        assert!(summarize_plan(r#"{"format_version": "1.2"}"#).unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_invocation_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let cli = TerraformCli::new("false");

        let err = cli
            .terraform_init(TerraformInitRequest {
                args: vec![],
                envs: BTreeMap::new(),
                tf_version: None,
                path: dir.path().to_path_buf(),
                job_id: "job".to_string(),
            })
            .await
            .unwrap_err();

        assert!(!err.is_transient());
    }
}
