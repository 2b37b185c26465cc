//! GitHub API adapters.
//!
//! Implements the commit comparison and check run activities over octocrab,
//! classifying failures as transient or permanent for the retry layer.

mod activities;
mod client;
mod error;

pub use client::GitHubClient;
pub use error::{GitHubApiError, GitHubErrorKind};
