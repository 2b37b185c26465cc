//! GitHub API error classification.
//!
//! - **Transient**: 5xx, 429, 403 rate limits, network failures. Retried.
//! - **Permanent**: everything else. Surfaced to the caller.

use std::fmt;
use thiserror::Error;

use crate::activities::{ActivityError, ActivityErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitHubErrorKind {
    Transient,
    Permanent,
}

impl GitHubErrorKind {
    pub fn is_retriable(&self) -> bool {
        matches!(self, GitHubErrorKind::Transient)
    }
}

#[derive(Debug, Error)]
pub struct GitHubApiError {
    pub kind: GitHubErrorKind,
    pub status_code: Option<u16>,
    pub message: String,
    #[source]
    pub source: Option<octocrab::Error>,
}

impl fmt::Display for GitHubApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "GitHub API error (HTTP {code}): {}", self.message),
            None => write!(f, "GitHub API error: {}", self.message),
        }
    }
}

impl GitHubApiError {
    /// An error found in a response GitHub returned successfully, e.g. an
    /// unknown compare status.
    pub fn permanent_without_source(message: impl Into<String>) -> Self {
        GitHubApiError {
            kind: GitHubErrorKind::Permanent,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn from_octocrab(err: octocrab::Error) -> Self {
        let status_code = extract_status_code(&err);
        let message = err.to_string();
        let kind = classify(status_code, &message);
        GitHubApiError {
            kind,
            status_code,
            message,
            source: Some(err),
        }
    }
}

impl From<GitHubApiError> for ActivityError {
    fn from(err: GitHubApiError) -> Self {
        let kind = if err.kind.is_retriable() {
            ActivityErrorKind::Transient
        } else {
            ActivityErrorKind::Permanent
        };
        ActivityError {
            kind,
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

fn classify(status_code: Option<u16>, message: &str) -> GitHubErrorKind {
    if message.to_lowercase().contains("try again") {
        return GitHubErrorKind::Transient;
    }
    match status_code {
        Some(429) => GitHubErrorKind::Transient,
        Some(403) if is_rate_limit_error(message) => GitHubErrorKind::Transient,
        Some(code) if (500..600).contains(&code) => GitHubErrorKind::Transient,
        Some(_) => GitHubErrorKind::Permanent,
        None if is_network_error(message) => GitHubErrorKind::Transient,
        None => GitHubErrorKind::Permanent,
    }
}

/// octocrab does not expose the status of every error variant, so this
/// falls back to reading the rendered message.
fn extract_status_code(err: &octocrab::Error) -> Option<u16> {
    if let octocrab::Error::GitHub { source, .. } = err {
        return Some(source.status_code.as_u16());
    }
    status_from_message(&err.to_string())
}

fn status_from_message(message: &str) -> Option<u16> {
    if let Some(idx) = message.find("status: ") {
        let digits: String = message[idx + 8..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(code) = digits.parse() {
            return Some(code);
        }
    }
    [404, 422, 403, 401, 429, 500, 502, 503]
        .into_iter()
        .find(|code| message.contains(&code.to_string()))
}

fn is_rate_limit_error(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("rate limit")
        || message.contains("api rate")
        || message.contains("secondary rate")
        || message.contains("abuse detection")
}

fn is_network_error(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("timeout")
        || message.contains("connection")
        || message.contains("network")
        || message.contains("dns")
        || message.contains("timed out")
}
