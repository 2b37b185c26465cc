use tokio::process::Command;
use tracing::debug;

use super::process::run;
use crate::activities::{ActivityError, CommandActivities, ExecuteCommandRequest};

/// Runs `run` and `env` step commands with `sh -c` in the root directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellCommands;

impl CommandActivities for ShellCommands {
    async fn execute_command(&self, request: ExecuteCommandRequest) -> Result<String, ActivityError> {
        debug!(command = %request.command, path = %request.path.display(), "executing command");
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&request.command)
            .current_dir(&request.path)
            .envs(&request.envs);
        let output = run(command, &request.command).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
