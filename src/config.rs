//! Service configuration.
//!
//! [`DeployConfig`] comes from `DEPLOY_TRAIN_*` environment variables; the
//! set of deployable roots comes from a JSON file ([`RootsConfig`]).

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::terraform::DEFAULT_PLAN_REVIEW_TIMEOUT;
use crate::types::{Repo, Root};

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_STATE_DIR: &str = "./state";
pub const DEFAULT_WORKSPACE_DIR: &str = "./workspaces";
pub const DEFAULT_ROOTS_FILE: &str = "roots.json";
pub const DEFAULT_TERRAFORM_BIN: &str = "terraform";
pub const DEFAULT_REVISION_RECEIVE_TIMEOUT_MINS: u64 = 60;

const ENV_PREFIX: &str = "DEPLOY_TRAIN_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },

    #[error("failed to read roots file {path}: {source}")]
    ReadRoots {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse roots: {0}")]
    ParseRoots(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub listen_addr: SocketAddr,
    pub state_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub revision_receive_timeout: Duration,
    pub plan_review_timeout: Duration,
    /// Prefix of the job links shown in check runs. Empty means no links.
    pub job_url_base: String,
    pub roots_file: PathBuf,
    pub terraform_bin: String,
    pub github_token: String,
    pub webhook_secret: String,
}

impl DeployConfig {
    /// Defaults for everything except the two secrets.
    pub fn new(github_token: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        DeployConfig {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            workspace_dir: PathBuf::from(DEFAULT_WORKSPACE_DIR),
            revision_receive_timeout: Duration::from_secs(
                DEFAULT_REVISION_RECEIVE_TIMEOUT_MINS * 60,
            ),
            plan_review_timeout: DEFAULT_PLAN_REVIEW_TIMEOUT,
            job_url_base: String::new(),
            roots_file: PathBuf::from(DEFAULT_ROOTS_FILE),
            terraform_bin: DEFAULT_TERRAFORM_BIN.to_string(),
            github_token: github_token.into(),
            webhook_secret: webhook_secret.into(),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup` instead of the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token = lookup("GITHUB_TOKEN")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("GITHUB_TOKEN"))?;
        let secret = lookup("GITHUB_WEBHOOK_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("GITHUB_WEBHOOK_SECRET"))?;
        let mut config = DeployConfig::new(token, secret);

        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

        if let Some(addr) = var("LISTEN_ADDR") {
            config.listen_addr = parse("LISTEN_ADDR", &addr)?;
        }
        if let Some(dir) = var("STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("WORKSPACE_DIR") {
            config.workspace_dir = PathBuf::from(dir);
        }
        if let Some(mins) = var("REVISION_RECEIVE_TIMEOUT_MINS") {
            config.revision_receive_timeout = minutes("REVISION_RECEIVE_TIMEOUT_MINS", &mins)?;
        }
        if let Some(mins) = var("PLAN_REVIEW_TIMEOUT_MINS") {
            config.plan_review_timeout = minutes("PLAN_REVIEW_TIMEOUT_MINS", &mins)?;
        }
        if let Some(base) = var("JOB_URL_BASE") {
            config.job_url_base = base.trim_end_matches('/').to_string();
        }
        if let Some(file) = var("ROOTS_FILE") {
            config.roots_file = PathBuf::from(file);
        }
        if let Some(bin) = var("TERRAFORM_BIN") {
            config.terraform_bin = bin;
        }
        Ok(config)
    }

    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    pub fn with_workspace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_dir = dir.into();
        self
    }

    pub fn with_job_url_base(mut self, base: impl Into<String>) -> Self {
        self.job_url_base = base.into();
        self
    }
}

fn parse<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        name: format!("{ENV_PREFIX}{name}"),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn minutes(name: &str, value: &str) -> Result<Duration> {
    let mins: u64 = parse(name, value)?;
    if mins == 0 {
        return Err(ConfigError::Invalid {
            name: format!("{ENV_PREFIX}{name}"),
            value: value.to_string(),
            reason: "must be at least one minute".to_string(),
        });
    }
    Ok(Duration::from_secs(mins * 60))
}

// ─── Roots ───

/// Deployable roots of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRoots {
    /// Clone URL. Defaults to `https://github.com/{owner}/{repo}.git`.
    #[serde(default)]
    pub url: Option<String>,
    pub roots: Vec<Root>,
}

/// Roots keyed by `owner/repo`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RootsConfig {
    repos: BTreeMap<String, RepoRoots>,
}

impl RootsConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadRoots {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn lookup(&self, owner: &str, repo: &str, root: &str) -> Option<(Repo, Root)> {
        let roots = self.repos.get(&format!("{owner}/{repo}"))?;
        let root = roots.roots.iter().find(|r| r.name == root)?;
        let mut repo = Repo::new(owner, repo);
        if let Some(url) = &roots.url {
            repo = repo.with_url(url.clone());
        }
        Some((repo, root.clone()))
    }

    pub fn repo_count(&self) -> usize {
        self.repos.len()
    }
}
