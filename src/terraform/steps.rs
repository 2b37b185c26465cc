//! Step runners for plan and apply jobs.
//!
//! Each [`StepKind`] has one [`StepRunner`], looked up in a [`StepRegistry`].
//! A new step kind needs only a runner and a registration.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::activities::{
    ActivityError, CommandActivities, ExecuteCommandRequest, PlanSummary, TerraformActivities,
    TerraformApplyRequest, TerraformInitRequest, TerraformPlanRequest,
};
use crate::types::{LocalRoot, PlanMode, Step, StepKind};

/// State shared by the steps of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub job_id: String,
    /// Working directory of the root.
    pub path: PathBuf,
    /// Environment for every step; `env` steps add to it.
    pub envs: BTreeMap<String, String>,
    pub tf_version: Option<String>,
    pub plan_mode: PlanMode,
    /// Written by `plan`, read by `apply`.
    pub plan_file: PathBuf,
    /// Set by the `plan` step.
    pub plan_summary: Option<PlanSummary>,
}

impl ExecutionContext {
    pub fn new(job_id: impl Into<String>, root: &LocalRoot) -> Self {
        ExecutionContext {
            job_id: job_id.into(),
            path: root.path.clone(),
            envs: BTreeMap::new(),
            tf_version: root.root.tf_version.clone(),
            plan_mode: root.root.plan_mode,
            plan_file: root.path.join(format!("{}.tfplan", root.root.name)),
            plan_summary: None,
        }
    }

    pub fn with_envs(mut self, envs: BTreeMap<String, String>) -> Self {
        self.envs.extend(envs);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("no runner registered for {0} steps")]
    Unsupported(StepKind),

    #[error("{runner} runner cannot run a {step} step")]
    Mismatch { runner: StepKind, step: StepKind },

    #[error("env step {0} needs a value or a command")]
    EmptyEnv(String),

    #[error(transparent)]
    Activity(#[from] ActivityError),
}

#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Runs `step`, returning its captured output.
    async fn run(
        &self,
        ctx: &mut ExecutionContext,
        root: &LocalRoot,
        step: &Step,
    ) -> Result<String, StepError>;
}

pub struct InitStepRunner<T> {
    terraform: Arc<T>,
}

#[async_trait]
impl<T: TerraformActivities + 'static> StepRunner for InitStepRunner<T> {
    async fn run(
        &self,
        ctx: &mut ExecutionContext,
        _root: &LocalRoot,
        step: &Step,
    ) -> Result<String, StepError> {
        let Step::Init { extra_args } = step else {
            return Err(mismatch(StepKind::Init, step));
        };
        let response = self
            .terraform
            .terraform_init(TerraformInitRequest {
                args: extra_args.clone(),
                envs: ctx.envs.clone(),
                tf_version: ctx.tf_version.clone(),
                path: ctx.path.clone(),
                job_id: ctx.job_id.clone(),
            })
            .await?;
        Ok(response.output)
    }
}

pub struct PlanStepRunner<T> {
    terraform: Arc<T>,
}

#[async_trait]
impl<T: TerraformActivities + 'static> StepRunner for PlanStepRunner<T> {
    async fn run(
        &self,
        ctx: &mut ExecutionContext,
        _root: &LocalRoot,
        step: &Step,
    ) -> Result<String, StepError> {
        let Step::Plan { extra_args } = step else {
            return Err(mismatch(StepKind::Plan, step));
        };
        let response = self
            .terraform
            .terraform_plan(TerraformPlanRequest {
                args: extra_args.clone(),
                envs: ctx.envs.clone(),
                tf_version: ctx.tf_version.clone(),
                path: ctx.path.clone(),
                job_id: ctx.job_id.clone(),
                plan_file: ctx.plan_file.clone(),
                plan_mode: ctx.plan_mode,
            })
            .await?;
        debug!(job_id = %ctx.job_id, summary = %response.summary, "plan computed");
        ctx.plan_summary = Some(response.summary);
        Ok(response.output)
    }
}

pub struct ApplyStepRunner<T> {
    terraform: Arc<T>,
}

#[async_trait]
impl<T: TerraformActivities + 'static> StepRunner for ApplyStepRunner<T> {
    async fn run(
        &self,
        ctx: &mut ExecutionContext,
        _root: &LocalRoot,
        step: &Step,
    ) -> Result<String, StepError> {
        let Step::Apply { extra_args } = step else {
            return Err(mismatch(StepKind::Apply, step));
        };
        let response = self
            .terraform
            .terraform_apply(TerraformApplyRequest {
                args: extra_args.clone(),
                envs: ctx.envs.clone(),
                tf_version: ctx.tf_version.clone(),
                path: ctx.path.clone(),
                job_id: ctx.job_id.clone(),
                plan_file: ctx.plan_file.clone(),
            })
            .await?;
        Ok(response.output)
    }
}

pub struct RunStepRunner<C> {
    commands: Arc<C>,
}

#[async_trait]
impl<C: CommandActivities + 'static> StepRunner for RunStepRunner<C> {
    async fn run(
        &self,
        ctx: &mut ExecutionContext,
        _root: &LocalRoot,
        step: &Step,
    ) -> Result<String, StepError> {
        let Step::Run { command } = step else {
            return Err(mismatch(StepKind::Run, step));
        };
        let output = self
            .commands
            .execute_command(ExecuteCommandRequest {
                command: command.clone(),
                path: ctx.path.clone(),
                envs: ctx.envs.clone(),
            })
            .await?;
        Ok(output)
    }
}

/// Sets a variable for later steps. A command's stdout loses its trailing
/// newline.
pub struct EnvStepRunner<C> {
    commands: Arc<C>,
}

#[async_trait]
impl<C: CommandActivities + 'static> StepRunner for EnvStepRunner<C> {
    async fn run(
        &self,
        ctx: &mut ExecutionContext,
        _root: &LocalRoot,
        step: &Step,
    ) -> Result<String, StepError> {
        let Step::Env {
            name,
            value,
            command,
        } = step
        else {
            return Err(mismatch(StepKind::Env, step));
        };

        let value = match (value, command) {
            (Some(value), _) => value.clone(),
            (None, Some(command)) => {
                let output = self
                    .commands
                    .execute_command(ExecuteCommandRequest {
                        command: command.clone(),
                        path: ctx.path.clone(),
                        envs: ctx.envs.clone(),
                    })
                    .await?;
                output.strip_suffix('\n').unwrap_or(&output).to_string()
            }
            (None, None) => return Err(StepError::EmptyEnv(name.clone())),
        };

        ctx.envs.insert(name.clone(), value.clone());
        Ok(value)
    }
}

fn mismatch(runner: StepKind, step: &Step) -> StepError {
    StepError::Mismatch {
        runner,
        step: step.kind(),
    }
}

/// Runner lookup by step kind.
#[derive(Clone, Default)]
pub struct StepRegistry {
    runners: HashMap<StepKind, Arc<dyn StepRunner>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        StepRegistry::default()
    }

    /// Registers the built-in runners for every step kind.
    pub fn standard<T, C>(terraform: Arc<T>, commands: Arc<C>) -> Self
    where
        T: TerraformActivities + 'static,
        C: CommandActivities + 'static,
    {
        StepRegistry::new()
            .register(
                StepKind::Init,
                Arc::new(InitStepRunner {
                    terraform: terraform.clone(),
                }),
            )
            .register(
                StepKind::Plan,
                Arc::new(PlanStepRunner {
                    terraform: terraform.clone(),
                }),
            )
            .register(StepKind::Apply, Arc::new(ApplyStepRunner { terraform }))
            .register(
                StepKind::Run,
                Arc::new(RunStepRunner {
                    commands: commands.clone(),
                }),
            )
            .register(StepKind::Env, Arc::new(EnvStepRunner { commands }))
    }

    pub fn register(mut self, kind: StepKind, runner: Arc<dyn StepRunner>) -> Self {
        self.runners.insert(kind, runner);
        self
    }

    pub async fn run(
        &self,
        ctx: &mut ExecutionContext,
        root: &LocalRoot,
        step: &Step,
    ) -> Result<String, StepError> {
        let runner = self
            .runners
            .get(&step.kind())
            .ok_or(StepError::Unsupported(step.kind()))?;
        runner.run(ctx, root, step).await
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<String> = self.runners.keys().map(ToString::to_string).collect();
        kinds.sort();
        f.debug_struct("StepRegistry").field("kinds", &kinds).finish()
    }
}
