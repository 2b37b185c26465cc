//! Signals accepted by a deploy workflow, and the worker's requests to it.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::queue::LockState;
use crate::types::{DeploymentInfo, Revision, Trigger};

/// A revision to deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRevisionSignal {
    pub revision: Revision,
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(default)]
    pub rerun: bool,
}

/// Lets merge-triggered revisions through again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockSignal {
    pub user: String,
}

/// Channels a deploy workflow receives its signals on.
#[derive(Debug)]
pub struct WorkflowSignals {
    pub revisions: mpsc::Receiver<NewRevisionSignal>,
    pub unlocks: mpsc::Receiver<UnlockSignal>,
}

impl WorkflowSignals {
    /// Whether signals are buffered that nobody has received yet.
    pub fn has_pending(&self) -> bool {
        !self.revisions.is_empty() || !self.unlocks.is_empty()
    }

    /// Refuses further signals. Buffered ones can still be received.
    pub fn close(&mut self) {
        self.revisions.close();
        self.unlocks.close();
    }

    /// Closes these channels and moves everything still buffered onto fresh
    /// ones, returning their senders.
    pub fn reopen(&mut self, buffer: usize) -> SignalSenders {
        self.close();
        let capacity = buffer.max(self.revisions.len()).max(self.unlocks.len());
        let (senders, fresh) = signal_channels(capacity);
        while let Ok(signal) = self.revisions.try_recv() {
            // Capacity covers everything that was buffered.
            let _ = senders.revisions.try_send(signal);
        }
        while let Ok(signal) = self.unlocks.try_recv() {
            let _ = senders.unlocks.try_send(signal);
        }
        *self = fresh;
        senders
    }
}

/// Sending half of [`WorkflowSignals`].
#[derive(Debug, Clone)]
pub struct SignalSenders {
    pub revisions: mpsc::Sender<NewRevisionSignal>,
    pub unlocks: mpsc::Sender<UnlockSignal>,
}

/// Creates connected signal channels with room for `buffer` signals each.
pub fn signal_channels(buffer: usize) -> (SignalSenders, WorkflowSignals) {
    let (revisions_tx, revisions) = mpsc::channel(buffer);
    let (unlocks_tx, unlocks) = mpsc::channel(buffer);
    (
        SignalSenders {
            revisions: revisions_tx,
            unlocks: unlocks_tx,
        },
        WorkflowSignals { revisions, unlocks },
    )
}

/// Requests from the queue worker to the workflow that owns the queue.
#[derive(Debug)]
pub enum QueueRequest {
    /// Answered with the next item once one can be popped.
    Pop(oneshot::Sender<DeploymentInfo>),
    /// Replaces the lock on merge-triggered items.
    SetLock(LockState),
}
