//! Revision queue with lock gating for merge-triggered deploys.

use serde::{Deserialize, Serialize};

use super::priority::{Priority, PriorityQueue};
use crate::types::{DeploymentInfo, Revision, Trigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    #[default]
    Unlocked,
    Locked,
}

/// Gate on merge-triggered deploys.
///
/// Locked after a manual deploy so that queued merges don't silently undo it.
/// `revision` is the manual revision holding the lock.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LockState {
    pub status: LockStatus,
    #[serde(default)]
    pub revision: Option<Revision>,
}

impl LockState {
    pub fn locked(revision: Revision) -> Self {
        LockState {
            status: LockStatus::Locked,
            revision: Some(revision),
        }
    }

    pub fn unlocked() -> Self {
        LockState::default()
    }

    pub fn is_locked(&self) -> bool {
        self.status == LockStatus::Locked
    }
}

/// Returned by [`RevisionQueue::pop`] when nothing may be popped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no deployment can be popped (queued: {queued}, locked: {locked})")]
pub struct EmptyQueueError {
    pub queued: usize,
    pub locked: bool,
}

/// Pending deployments for one root, plus the merge lock.
#[derive(Debug, Default)]
pub struct RevisionQueue {
    queue: PriorityQueue,
    lock: LockState,
}

impl RevisionQueue {
    pub fn new() -> Self {
        RevisionQueue::default()
    }

    pub fn with_lock(lock: LockState) -> Self {
        RevisionQueue {
            queue: PriorityQueue::new(),
            lock,
        }
    }

    pub fn push(&mut self, item: DeploymentInfo) {
        self.queue.push(item);
    }

    /// Removes the next eligible item.
    ///
    /// Fails when the queue is empty, or when only merge-triggered items are
    /// queued and the lock is held.
    pub fn pop(&mut self) -> Result<DeploymentInfo, EmptyQueueError> {
        if !self.can_pop() {
            return Err(EmptyQueueError {
                queued: self.queue.len(),
                locked: self.lock.is_locked(),
            });
        }
        self.queue.pop().ok_or(EmptyQueueError {
            queued: 0,
            locked: self.lock.is_locked(),
        })
    }

    pub fn peek(&self) -> Option<&DeploymentInfo> {
        self.queue.peek()
    }

    pub fn can_pop(&self) -> bool {
        match self.queue.peek() {
            None => false,
            Some(top) => top.trigger() == Trigger::Manual || !self.lock.is_locked(),
        }
    }

    /// Changes the lock on merge-triggered items. Queued items stay queued.
    pub fn set_lock_status_for_merged_trigger(&mut self, status: LockStatus, revision: Option<Revision>) {
        self.lock = LockState { status, revision };
    }

    pub fn lock_state(&self) -> &LockState {
        &self.lock
    }

    pub fn scan(&self, priority: Priority) -> Vec<DeploymentInfo> {
        self.queue.scan(priority)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether a merge-triggered item sits behind the lock.
    pub fn is_blocked(&self, item: &DeploymentInfo) -> bool {
        item.trigger() == Trigger::Merge && self.lock.is_locked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::deployment;
    use proptest::prelude::*;

    #[test]
    fn empty_queue_cannot_pop_regardless_of_lock() {
        let mut queue = RevisionQueue::new();
        assert!(!queue.can_pop());
        queue.set_lock_status_for_merged_trigger(LockStatus::Locked, Some(Revision::new("r")));
        assert!(!queue.can_pop());
        assert_eq!(
            queue.pop(),
            Err(EmptyQueueError {
                queued: 0,
                locked: true
            })
        );
    }

    #[test]
    fn manual_item_pops_while_locked() {
        let mut queue = RevisionQueue::with_lock(LockState::locked(Revision::new("m")));
        queue.push(deployment("1", Trigger::Manual));
        assert!(queue.can_pop());
        assert_eq!(queue.pop().unwrap().revision.as_str(), "1");
    }

    #[test]
    fn merge_items_wait_for_unlock() {
        let mut queue = RevisionQueue::new();
        queue.set_lock_status_for_merged_trigger(LockStatus::Locked, Some(Revision::new("m")));
        queue.push(deployment("1", Trigger::Merge));

        assert!(!queue.can_pop());
        assert_eq!(
            queue.pop(),
            Err(EmptyQueueError {
                queued: 1,
                locked: true
            })
        );
        assert_eq!(queue.len(), 1, "locking never evicts");

        queue.set_lock_status_for_merged_trigger(LockStatus::Unlocked, None);
        assert!(queue.can_pop());
        assert_eq!(queue.pop().unwrap().revision.as_str(), "1");
    }

    #[test]
    fn manual_items_jump_ahead_of_locked_merges() {
        let mut queue = RevisionQueue::with_lock(LockState::locked(Revision::new("m")));
        queue.push(deployment("1", Trigger::Merge));
        queue.push(deployment("2", Trigger::Manual));

        assert_eq!(queue.pop().unwrap().revision.as_str(), "2");
        assert!(!queue.can_pop());
    }

    #[test]
    fn blocked_only_applies_to_merge_items_under_lock() {
        let mut queue = RevisionQueue::new();
        let merge = deployment("1", Trigger::Merge);
        let manual = deployment("2", Trigger::Manual);
        assert!(!queue.is_blocked(&merge));

        queue.set_lock_status_for_merged_trigger(LockStatus::Locked, Some(Revision::new("2")));
        assert!(queue.is_blocked(&merge));
        assert!(!queue.is_blocked(&manual));
    }

    proptest! {
        /// can_pop is exactly: non-empty and (manual on top or unlocked).
        #[test]
        fn prop_can_pop_matches_gating_rule(
            manual in 0usize..3,
            merge in 0usize..3,
            locked: bool,
        ) {
            let mut queue = RevisionQueue::new();
            if locked {
                queue.set_lock_status_for_merged_trigger(LockStatus::Locked, Some(Revision::new("x")));
            }
            for i in 0..merge {
                queue.push(deployment(&format!("g{i}"), Trigger::Merge));
            }
            for i in 0..manual {
                queue.push(deployment(&format!("m{i}"), Trigger::Manual));
            }

            let expected = manual > 0 || (merge > 0 && !locked);
            prop_assert_eq!(queue.can_pop(), expected);
            prop_assert_eq!(queue.pop().is_ok(), expected);
        }
    }
}
