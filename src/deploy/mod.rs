//! Deployment orchestration for each (repo, root).
//!
//! ```text
//!  signals ──► Dispatcher ──► DeployWorkflow (owns RevisionQueue)
//!                                   │  pop / lock
//!                                   ▼
//!                              QueueWorker ──► Deployer ──► WorkflowRunner
//! ```
//!
//! - [`Dispatcher`] spawns one [`DeployWorkflow`] per root on demand
//! - [`DeployWorkflow`] queues revisions and reports them as queued check runs
//! - [`QueueWorker`] pops one revision at a time and hands it to the
//!   [`Deployer`]
//! - [`Deployer`] validates the revision against the last deployment, runs
//!   terraform and records the result

mod deployer;
mod dispatch;
mod error;
mod message;
mod worker;
mod workflow;

pub use deployer::{
    BEHIND_SUMMARY, COMPARE_FAILED_SUMMARY, Deployer, RERUN_NOT_IDENTICAL_SUMMARY,
};
pub use dispatch::{Dispatcher, WorkflowKey};
pub use error::{DeployError, DispatchError, ValidationError, WorkflowError};
pub use message::{
    NewRevisionSignal, QueueRequest, SignalSenders, UnlockSignal, WorkflowSignals,
    signal_channels,
};
pub use worker::{QueueHandle, QueueWorker, RevisionSource, WorkerState};
pub use workflow::{
    DEFAULT_RECEIVE_TIMEOUT, DeployWorkflow, LOCKED_SUMMARY, QUEUED_SUMMARY, WorkflowExit,
};
