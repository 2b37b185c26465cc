//! Plan review gate.
//!
//! Holds a computed plan until someone confirms or rejects it. Plans with no
//! changes, and roots configured for automatic approval, pass straight
//! through. A plan nobody reviews before the timeout is rejected.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::activities::PlanSummary;
use crate::types::{ApprovalType, Root};

/// Default time a plan waits for review before it is rejected.
pub const DEFAULT_PLAN_REVIEW_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Approved,
    Rejected,
}

/// A reviewer's decision on a waiting plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanReviewSignal {
    pub status: PlanStatus,
    #[serde(default)]
    pub user: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PlanReviewGate {
    timeout: Duration,
}

impl Default for PlanReviewGate {
    fn default() -> Self {
        PlanReviewGate::new(DEFAULT_PLAN_REVIEW_TIMEOUT)
    }
}

impl PlanReviewGate {
    pub fn new(timeout: Duration) -> Self {
        PlanReviewGate { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a human has to look at this plan.
    pub fn requires_review(&self, root: &Root, summary: &PlanSummary) -> bool {
        root.plan.approval.approval_type == ApprovalType::Manual && !summary.is_empty()
    }

    /// Waits for a review of `summary`, or rejects it on timeout.
    pub async fn await_review(
        &self,
        signals: &mut mpsc::Receiver<PlanReviewSignal>,
        root: &Root,
        summary: &PlanSummary,
    ) -> PlanStatus {
        let started = Instant::now();

        let status = if !self.requires_review(root, summary) {
            PlanStatus::Approved
        } else {
            let deadline = tokio::time::sleep(self.timeout);
            tokio::pin!(deadline);

            tokio::select! {
                Some(signal) = signals.recv() => {
                    info!(root = %root.name, user = %signal.user, status = ?signal.status, "plan reviewed");
                    signal.status
                }
                _ = &mut deadline => {
                    warn!(root = %root.name, timeout = ?self.timeout, "plan review timed out, rejecting");
                    PlanStatus::Rejected
                }
            }
        };

        info!(
            target: "deploy_train::metrics",
            metric = "plan_review_gate.wait",
            root = %root.name,
            wait_ms = started.elapsed().as_millis() as u64,
            outcome = ?status,
            "plan review gate resolved"
        );
        status
    }
}
