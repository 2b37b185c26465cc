//! Terraform root configuration.
//!
//! A [`Root`] is one terraform working directory inside a repository. It
//! carries the ordered plan and apply steps and says how the deploy was
//! triggered.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ids::Repo;

/// Why a deployment was requested.
///
/// Manual deploys outrank merge deploys in the revision queue and always
/// require plan confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Automatic, on merge to the default branch.
    #[default]
    #[serde(alias = "merged")]
    Merge,
    /// Human initiated.
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    #[default]
    Normal,
    Destroy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalType {
    #[default]
    Auto,
    Manual,
}

/// How a computed plan gets approved.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlanApproval {
    #[serde(rename = "type", default)]
    pub approval_type: ApprovalType,
    /// Shown to reviewers next to the confirm/reject buttons.
    #[serde(default)]
    pub reason: String,
}

impl PlanApproval {
    pub fn manual(reason: impl Into<String>) -> Self {
        PlanApproval {
            approval_type: ApprovalType::Manual,
            reason: reason.into(),
        }
    }
}

/// Discriminant used to look up the runner for a [`Step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Init,
    Plan,
    Apply,
    Run,
    Env,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StepKind::Init => "init",
            StepKind::Plan => "plan",
            StepKind::Apply => "apply",
            StepKind::Run => "run",
            StepKind::Env => "env",
        };
        f.write_str(name)
    }
}

/// One step of a plan or apply job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Init {
        #[serde(default)]
        extra_args: Vec<String>,
    },
    Plan {
        #[serde(default)]
        extra_args: Vec<String>,
    },
    Apply {
        #[serde(default)]
        extra_args: Vec<String>,
    },
    /// A custom shell command run in the root directory.
    Run { command: String },
    /// Sets a variable for every later step, either from a literal value or
    /// from the stdout of a command.
    Env {
        name: String,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        command: Option<String>,
    },
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::Init { .. } => StepKind::Init,
            Step::Plan { .. } => StepKind::Plan,
            Step::Apply { .. } => StepKind::Apply,
            Step::Run { .. } => StepKind::Run,
            Step::Env { .. } => StepKind::Env,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Job {
    pub steps: Vec<Step>,
}

impl Job {
    pub fn new(steps: Vec<Step>) -> Self {
        Job { steps }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlanJob {
    #[serde(flatten)]
    pub job: Job,
    #[serde(default)]
    pub approval: PlanApproval,
}

/// A named terraform working directory within a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    pub name: String,
    /// Repo-relative path of the working directory.
    pub path: String,
    #[serde(default)]
    pub tf_version: Option<String>,
    #[serde(default = "default_plan_job")]
    pub plan: PlanJob,
    #[serde(default = "default_apply_job")]
    pub apply: Job,
    #[serde(default)]
    pub plan_mode: PlanMode,
    #[serde(default)]
    pub trigger: Trigger,
    /// Redeploy the currently deployed revision.
    #[serde(default)]
    pub rerun: bool,
    /// Globs of files that mark this root as modified.
    #[serde(default = "default_tracked_files")]
    pub tracked_files: Vec<String>,
}

fn default_tracked_files() -> Vec<String> {
    vec!["**/*.tf".to_string()]
}

fn default_plan_job() -> PlanJob {
    PlanJob {
        job: Job::new(vec![
            Step::Init { extra_args: vec![] },
            Step::Plan { extra_args: vec![] },
        ]),
        approval: PlanApproval::default(),
    }
}

fn default_apply_job() -> Job {
    Job::new(vec![Step::Apply { extra_args: vec![] }])
}

impl Root {
    /// Creates a root with the default `init, plan` / `apply` jobs.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Root {
            name: name.into(),
            path: path.into(),
            tf_version: None,
            plan: default_plan_job(),
            apply: default_apply_job(),
            plan_mode: PlanMode::Normal,
            trigger: Trigger::Merge,
            rerun: false,
            tracked_files: default_tracked_files(),
        }
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_rerun(mut self, rerun: bool) -> Self {
        self.rerun = rerun;
        self
    }

    pub fn with_approval(mut self, approval: PlanApproval) -> Self {
        self.plan.approval = approval;
        self
    }
}

/// A root that has been fetched onto local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRoot {
    pub root: Root,
    pub repo: Repo,
    /// Absolute path of the root's working directory.
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_root_gets_default_jobs() {
        let root: Root = serde_json::from_str(r#"{"name":"prod","path":"envs/prod"}"#).unwrap();
        assert_eq!(root.trigger, Trigger::Merge);
        assert_eq!(
            root.plan.job.steps.iter().map(Step::kind).collect::<Vec<_>>(),
            vec![StepKind::Init, StepKind::Plan]
        );
        assert_eq!(root.apply.steps, vec![Step::Apply { extra_args: vec![] }]);
        assert_eq!(root.plan.approval.approval_type, ApprovalType::Auto);
    }

    #[test]
    fn configured_root_matches_constructed_root() {
        let root: Root = serde_json::from_str(r#"{"name":"prod","path":"envs/prod"}"#).unwrap();
        assert_eq!(root.tracked_files, vec!["**/*.tf"]);
        assert_eq!(root.tracked_files, Root::new("prod", "envs/prod").tracked_files);
    }

    #[test]
    fn steps_are_tagged_by_name() {
        let steps: Vec<Step> = serde_json::from_str(
            r#"[
                {"step":"env","name":"REGION","value":"us-east-1"},
                {"step":"run","command":"make lint"},
                {"step":"plan","extra_args":["-parallelism=5"]}
            ]"#,
        )
        .unwrap();

        assert_eq!(
            steps[0],
            Step::Env {
                name: "REGION".to_string(),
                value: Some("us-east-1".to_string()),
                command: None,
            }
        );
        assert_eq!(steps[1].kind(), StepKind::Run);
        assert_eq!(
            steps[2],
            Step::Plan {
                extra_args: vec!["-parallelism=5".to_string()]
            }
        );
    }

    #[test]
    fn legacy_merged_trigger_is_accepted() {
        let trigger: Trigger = serde_json::from_str("\"merged\"").unwrap();
        assert_eq!(trigger, Trigger::Merge);
        assert_eq!(serde_json::to_string(&Trigger::Manual).unwrap(), "\"manual\"");
    }

    #[test]
    fn plan_job_flattens_steps_next_to_approval() {
        let plan: PlanJob = serde_json::from_str(
            r#"{"steps":[{"step":"plan"}],"approval":{"type":"manual","reason":"prod"}}"#,
        )
        .unwrap();
        assert_eq!(plan.job.steps.len(), 1);
        assert_eq!(plan.approval, PlanApproval::manual("prod"));
    }
}
