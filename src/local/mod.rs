//! Adapters that run on the deploy host: git checkouts, the terraform CLI
//! and shell commands.

mod git;
mod process;
mod shell;
mod terraform;

pub use git::GitRootFetcher;
pub use process::CommandError;
pub use shell::ShellCommands;
pub use terraform::{TerraformCli, summarize_plan};
