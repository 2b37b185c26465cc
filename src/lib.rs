//! Deploy Train - serializes Terraform deployments per repository root.
//!
//! Revisions for a root are queued, validated against the last deployed
//! revision, planned, optionally held for review, and applied one at a time.
//! Progress is reported through GitHub check runs.

pub mod activities;
pub mod checks;
pub mod config;
pub mod deploy;
pub mod engine;
pub mod github;
pub mod local;
pub mod persistence;
pub mod queue;
pub mod server;
pub mod terraform;
pub mod types;
pub mod webhooks;

#[cfg(test)]
mod test_utils;
