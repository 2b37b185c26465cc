//! Child process execution shared by the local adapters.

use std::process::Output;

use thiserror::Error;
use tokio::process::Command;

use crate::activities::ActivityError;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {}\nstderr: {stderr}", .code.map_or("a signal".to_string(), |c| format!("code {c}")))]
    Failed {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

impl From<CommandError> for ActivityError {
    fn from(err: CommandError) -> Self {
        ActivityError::permanent(err.to_string()).with_source(err)
    }
}

/// Runs `command` to completion, failing on a non-zero exit. `display` names
/// the command in errors.
pub async fn run(mut command: Command, display: &str) -> Result<Output, CommandError> {
    command.kill_on_drop(true);
    let output = command.output().await.map_err(|source| CommandError::Spawn {
        command: display.to_string(),
        source,
    })?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(CommandError::Failed {
            command: display.to_string(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// stdout followed by stderr.
pub fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    text
}
