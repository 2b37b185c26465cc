//! Shared fixtures and in-memory fakes for every activity trait.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use uuid::Uuid;

use crate::activities::{
    ActivityError, ActivityErrorKind, CheckRunClient, CleanupRequest, CommandActivities,
    CommitComparer, CompareCommitRequest, DeploymentStore, ExecuteCommandRequest,
    FetchLatestDeploymentRequest, FetchRootRequest, FetchRootResponse, PlanSummary,
    ResourceSummary, RootActivities, StoreLatestDeploymentRequest, TerraformActivities,
    TerraformApplyRequest, TerraformInitRequest, TerraformOutput, TerraformPlanRequest,
    TerraformPlanResponse,
};
use crate::checks::{
    CheckRunResponse, CheckRunState, CheckRunStatus, CreateCheckRunRequest, UpdateCheckRunRequest,
};
use crate::terraform::{JobError, PlanRejectionError, RunError, WorkflowRunner};
use crate::types::{
    CheckRunId, DeploymentId, DeploymentInfo, DeploymentRecord, DiffDirection, LocalRoot, Repo,
    Revision, Root, Trigger,
};

// ─── Fixtures ───

/// A fresh deployment of root `prod` in `acme/infra`.
pub fn deployment(revision: &str, trigger: Trigger) -> DeploymentInfo {
    DeploymentInfo {
        id: DeploymentId::new(Uuid::new_v4()),
        revision: Revision::new(revision),
        root: Root::new("prod", "envs/prod").with_trigger(trigger),
        repo: Repo::new("acme", "infra"),
        check_run_id: None,
    }
}

pub fn local_root() -> LocalRoot {
    LocalRoot {
        root: Root::new("prod", "envs/prod"),
        repo: Repo::new("acme", "infra"),
        path: PathBuf::from("/work/acme/infra/envs/prod"),
    }
}

/// Job request with a fixed deployment id.
pub fn job_request() -> crate::terraform::JobRequest {
    crate::terraform::JobRequest {
        deployment_id: DeploymentId::new(Uuid::from_u128(7)),
        revision: Revision::new("abc123"),
        root: Root::new("prod", "envs/prod"),
        repo: Repo::new("acme", "infra"),
    }
}

// ─── GitHub ───

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCheckRun {
    Create(CreateCheckRunRequest),
    Update(UpdateCheckRunRequest),
}

#[derive(Default)]
struct GitHubInner {
    check_runs: Vec<RecordedCheckRun>,
    states: HashMap<CheckRunId, CheckRunState>,
    next_id: u64,
    comparisons: Vec<CompareCommitRequest>,
}

/// Records check run calls and answers commit comparisons with a fixed
/// direction.
pub struct FakeGitHub {
    inner: Mutex<GitHubInner>,
    direction: DiffDirection,
    fail_compare: bool,
    fail_check_runs: bool,
}

impl FakeGitHub {
    pub fn new() -> Self {
        FakeGitHub {
            inner: Mutex::new(GitHubInner::default()),
            direction: DiffDirection::Ahead,
            fail_compare: false,
            fail_check_runs: false,
        }
    }

    pub fn with_direction(mut self, direction: DiffDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn failing_compare(mut self) -> Self {
        self.fail_compare = true;
        self
    }

    pub fn failing_check_runs(mut self) -> Self {
        self.fail_check_runs = true;
        self
    }

    pub fn check_runs(&self) -> Vec<RecordedCheckRun> {
        self.inner.lock().unwrap().check_runs.clone()
    }

    pub fn comparisons(&self) -> Vec<CompareCommitRequest> {
        self.inner.lock().unwrap().comparisons.clone()
    }

    pub fn last_state(&self, id: CheckRunId) -> Option<CheckRunState> {
        self.inner.lock().unwrap().states.get(&id).copied()
    }

    pub fn last_status(&self, id: CheckRunId) -> Option<CheckRunStatus> {
        self.last_state(id).map(|s| s.status())
    }
}

impl CommitComparer for FakeGitHub {
    async fn compare_commits(
        &self,
        request: CompareCommitRequest,
    ) -> Result<DiffDirection, ActivityError> {
        self.inner.lock().unwrap().comparisons.push(request);
        if self.fail_compare {
            return Err(ActivityError::permanent("compare failed"));
        }
        Ok(self.direction)
    }
}

impl CheckRunClient for FakeGitHub {
    async fn create_check_run(
        &self,
        request: CreateCheckRunRequest,
    ) -> Result<CheckRunResponse, ActivityError> {
        if self.fail_check_runs {
            return Err(ActivityError::permanent("check runs unavailable"));
        }
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = CheckRunId(inner.next_id);
        inner.states.insert(id, request.state);
        let status = request.state.status();
        inner.check_runs.push(RecordedCheckRun::Create(request));
        Ok(CheckRunResponse { id, status })
    }

    async fn update_check_run(
        &self,
        request: UpdateCheckRunRequest,
    ) -> Result<CheckRunResponse, ActivityError> {
        if self.fail_check_runs {
            return Err(ActivityError::permanent("check runs unavailable"));
        }
        let mut inner = self.inner.lock().unwrap();
        let (id, status) = (request.id, request.state.status());
        inner.states.insert(id, request.state);
        inner.check_runs.push(RecordedCheckRun::Update(request));
        Ok(CheckRunResponse { id, status })
    }
}

// ─── Terraform and shell ───

#[derive(Default)]
struct TerraformCalls {
    inits: Vec<TerraformInitRequest>,
    plans: Vec<TerraformPlanRequest>,
    applies: Vec<TerraformApplyRequest>,
}

pub struct FakeTerraform {
    calls: Mutex<TerraformCalls>,
    summary: PlanSummary,
    fail_plan: bool,
    fail_apply: bool,
}

impl FakeTerraform {
    /// Plans come back empty.
    pub fn new() -> Self {
        FakeTerraform {
            calls: Mutex::new(TerraformCalls::default()),
            summary: PlanSummary::default(),
            fail_plan: false,
            fail_apply: false,
        }
    }

    /// Plans create one resource.
    pub fn with_changes(mut self) -> Self {
        self.summary.creations.push(ResourceSummary {
            address: "aws_s3_bucket.logs".to_string(),
        });
        self
    }

    pub fn failing_plan(mut self) -> Self {
        self.fail_plan = true;
        self
    }

    pub fn failing_apply(mut self) -> Self {
        self.fail_apply = true;
        self
    }

    pub fn inits(&self) -> Vec<TerraformInitRequest> {
        self.calls.lock().unwrap().inits.clone()
    }

    pub fn plans(&self) -> Vec<TerraformPlanRequest> {
        self.calls.lock().unwrap().plans.clone()
    }

    pub fn applies(&self) -> Vec<TerraformApplyRequest> {
        self.calls.lock().unwrap().applies.clone()
    }
}

impl TerraformActivities for FakeTerraform {
    async fn terraform_init(
        &self,
        request: TerraformInitRequest,
    ) -> Result<TerraformOutput, ActivityError> {
        self.calls.lock().unwrap().inits.push(request);
        Ok(TerraformOutput {
            output: "Terraform has been successfully initialized!".to_string(),
        })
    }

    async fn terraform_plan(
        &self,
        request: TerraformPlanRequest,
    ) -> Result<TerraformPlanResponse, ActivityError> {
        self.calls.lock().unwrap().plans.push(request);
        if self.fail_plan {
            return Err(ActivityError::permanent("terraform plan exited with status 1"));
        }
        Ok(TerraformPlanResponse {
            output: self.summary.to_string(),
            summary: self.summary.clone(),
        })
    }

    async fn terraform_apply(
        &self,
        request: TerraformApplyRequest,
    ) -> Result<TerraformOutput, ActivityError> {
        self.calls.lock().unwrap().applies.push(request);
        if self.fail_apply {
            return Err(ActivityError::permanent("terraform apply exited with status 1"));
        }
        Ok(TerraformOutput {
            output: "Apply complete!".to_string(),
        })
    }
}

/// Answers commands from a fixed table; unknown commands print nothing.
pub struct FakeCommands {
    outputs: HashMap<String, String>,
    executed: Mutex<Vec<ExecuteCommandRequest>>,
}

impl FakeCommands {
    pub fn new() -> Self {
        FakeCommands {
            outputs: HashMap::new(),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_output(mut self, command: &str, stdout: &str) -> Self {
        self.outputs.insert(command.to_string(), stdout.to_string());
        self
    }

    pub fn executed(&self) -> Vec<ExecuteCommandRequest> {
        self.executed.lock().unwrap().clone()
    }
}

impl CommandActivities for FakeCommands {
    async fn execute_command(&self, request: ExecuteCommandRequest) -> Result<String, ActivityError> {
        let out = self.outputs.get(&request.command).cloned().unwrap_or_default();
        self.executed.lock().unwrap().push(request);
        Ok(out)
    }
}

// ─── Roots ───

#[derive(Default)]
struct RootCalls {
    fetches: usize,
    cleanups: Vec<PathBuf>,
}

pub struct FakeRoots {
    calls: Mutex<RootCalls>,
    fail_fetches: usize,
    fail_kind: ActivityErrorKind,
    fail_cleanup: bool,
}

impl FakeRoots {
    pub fn new() -> Self {
        FakeRoots {
            calls: Mutex::new(RootCalls::default()),
            fail_fetches: 0,
            fail_kind: ActivityErrorKind::Permanent,
            fail_cleanup: false,
        }
    }

    /// Every fetch fails with `kind`.
    pub fn failing_fetch(self, kind: ActivityErrorKind) -> Self {
        self.failing_fetch_times(usize::MAX, kind)
    }

    /// The first `times` fetches fail with `kind`.
    pub fn failing_fetch_times(mut self, times: usize, kind: ActivityErrorKind) -> Self {
        self.fail_fetches = times;
        self.fail_kind = kind;
        self
    }

    pub fn failing_cleanup(mut self) -> Self {
        self.fail_cleanup = true;
        self
    }

    pub fn fetches(&self) -> usize {
        self.calls.lock().unwrap().fetches
    }

    pub fn cleanups(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().cleanups.clone()
    }
}

impl RootActivities for FakeRoots {
    async fn fetch_root(&self, request: FetchRootRequest) -> Result<FetchRootResponse, ActivityError> {
        let mut calls = self.calls.lock().unwrap();
        calls.fetches += 1;
        if calls.fetches <= self.fail_fetches {
            return Err(ActivityError {
                kind: self.fail_kind,
                message: "clone failed".to_string(),
                source: None,
            });
        }
        let deploy_directory = PathBuf::from("/work").join(request.deployment_id.to_string());
        Ok(FetchRootResponse {
            local_root: LocalRoot {
                path: deploy_directory.join(&request.root.path),
                root: request.root,
                repo: request.repo,
            },
            deploy_directory,
        })
    }

    async fn cleanup(&self, request: CleanupRequest) -> Result<(), ActivityError> {
        self.calls.lock().unwrap().cleanups.push(request.deploy_directory);
        if self.fail_cleanup {
            return Err(ActivityError::permanent("rm failed"));
        }
        Ok(())
    }
}

// ─── Deployment store ───

pub struct FakeStore {
    latest: Mutex<Option<DeploymentRecord>>,
    stored: Mutex<Vec<DeploymentRecord>>,
    fail_store: bool,
    fetch_delay: Duration,
}

impl FakeStore {
    pub fn new() -> Self {
        FakeStore {
            latest: Mutex::new(None),
            stored: Mutex::new(Vec::new()),
            fail_store: false,
            fetch_delay: Duration::ZERO,
        }
    }

    pub fn with_latest(self, record: DeploymentRecord) -> Self {
        *self.latest.lock().unwrap() = Some(record);
        self
    }

    pub fn failing_store(mut self) -> Self {
        self.fail_store = true;
        self
    }

    /// Stalls every workflow start for `delay`.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn stored(&self) -> Vec<DeploymentRecord> {
        self.stored.lock().unwrap().clone()
    }
}

impl DeploymentStore for FakeStore {
    async fn fetch_latest_deployment(
        &self,
        _request: FetchLatestDeploymentRequest,
    ) -> Result<Option<DeploymentRecord>, ActivityError> {
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        Ok(self.latest.lock().unwrap().clone())
    }

    async fn store_latest_deployment(
        &self,
        request: StoreLatestDeploymentRequest,
    ) -> Result<(), ActivityError> {
        if self.fail_store {
            return Err(ActivityError::transient("disk full"));
        }
        *self.latest.lock().unwrap() = Some(request.deployment.clone());
        self.stored.lock().unwrap().push(request.deployment);
        Ok(())
    }
}

// ─── Workflow runner ───

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedRun {
    Fail,
    Reject,
}

/// Succeeds unless a revision is scripted to fail or be rejected.
pub struct FakeRunner {
    scripted: HashMap<Revision, ScriptedRun>,
    delay: Duration,
    runs: Mutex<Vec<(DeploymentInfo, DiffDirection)>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        FakeRunner {
            scripted: HashMap::new(),
            delay: Duration::ZERO,
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn with(mut self, revision: &str, run: ScriptedRun) -> Self {
        self.scripted.insert(Revision::new(revision), run);
        self
    }

    /// Every run takes `delay` before returning.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn runs(&self) -> Vec<(DeploymentInfo, DiffDirection)> {
        self.runs.lock().unwrap().clone()
    }

    pub fn revisions(&self) -> Vec<String> {
        self.runs()
            .into_iter()
            .map(|(info, _)| info.revision.to_string())
            .collect()
    }
}

impl WorkflowRunner for FakeRunner {
    async fn run(&self, info: &DeploymentInfo, direction: DiffDirection) -> Result<(), RunError> {
        self.runs.lock().unwrap().push((info.clone(), direction));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.scripted.get(&info.revision) {
            None => Ok(()),
            Some(ScriptedRun::Reject) => Err(PlanRejectionError::new(None).into()),
            Some(ScriptedRun::Fail) => Err(RunError::Job(JobError::FetchRoot(
                ActivityError::permanent("terraform exploded"),
            ))),
        }
    }
}
