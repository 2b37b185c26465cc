//! Fetches roots by cloning their repository at the requested revision.
//!
//! Each deployment gets its own checkout under `{workspace}/{deployment_id}`,
//! so concurrent roots never share a working tree.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, warn};

use super::process::{CommandError, run};
use crate::activities::{
    ActivityError, CleanupRequest, FetchRootRequest, FetchRootResponse, RootActivities,
};
use crate::types::{DeploymentId, LocalRoot};

/// A git command with system and user configuration disabled, so hooks and
/// aliases on the host cannot change behavior.
fn git_command(workdir: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.current_dir(workdir)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        .env("GIT_TERMINAL_PROMPT", "0");
    cmd
}

async fn run_git(workdir: &Path, args: &[&str]) -> Result<(), CommandError> {
    let mut cmd = git_command(workdir);
    cmd.args(args);
    run(cmd, &format!("git {}", args.join(" "))).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct GitRootFetcher {
    workspace_dir: PathBuf,
}

impl GitRootFetcher {
    pub fn new(workspace_dir: impl Into<PathBuf>) -> Self {
        GitRootFetcher {
            workspace_dir: workspace_dir.into(),
        }
    }

    pub fn deploy_directory(&self, deployment_id: DeploymentId) -> PathBuf {
        self.workspace_dir.join(deployment_id.to_string())
    }
}

impl RootActivities for GitRootFetcher {
    async fn fetch_root(&self, request: FetchRootRequest) -> Result<FetchRootResponse, ActivityError> {
        let deploy_directory = self.deploy_directory(request.deployment_id);
        // Left over from an attempt that failed before cleanup.
        if tokio::fs::try_exists(&deploy_directory).await? {
            tokio::fs::remove_dir_all(&deploy_directory).await?;
        }
        tokio::fs::create_dir_all(&self.workspace_dir).await?;

        let target = deploy_directory.to_string_lossy().into_owned();
        debug!(repo = %request.repo, revision = %request.revision, directory = %target, "cloning repository");
        // Clone failures are usually the network or the remote.
        run_git(
            &self.workspace_dir,
            &["clone", "--quiet", "--no-checkout", &request.repo.url, &target],
        )
        .await
        .map_err(|e| ActivityError::transient(e.to_string()).with_source(e))?;
        run_git(
            &deploy_directory,
            &["checkout", "--quiet", "--detach", request.revision.as_str()],
        )
        .await?;

        let path = deploy_directory.join(&request.root.path);
        if !tokio::fs::try_exists(&path).await? {
            return Err(ActivityError::permanent(format!(
                "root {} has no directory {} at {}",
                request.root.name, request.root.path, request.revision
            )));
        }

        Ok(FetchRootResponse {
            local_root: LocalRoot {
                root: request.root,
                repo: request.repo,
                path,
            },
            deploy_directory,
        })
    }

    async fn cleanup(&self, request: CleanupRequest) -> Result<(), ActivityError> {
        match tokio::fs::remove_dir_all(&request.deploy_directory).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(directory = %request.deploy_directory.display(), "deploy directory already removed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
