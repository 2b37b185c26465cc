//! Two-tier priority queue.
//!
//! # Priority Levels
//!
//! - `High`: manually triggered deploys
//! - `Low`: merge-triggered deploys
//!
//! Every queued `High` item is dequeued before any `Low` item. Within a level
//! items come out in the order they were pushed.

use std::collections::VecDeque;

use crate::types::{DeploymentInfo, Trigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    Low,
    High,
}

impl Priority {
    /// Highest first.
    pub const ORDER: [Priority; 2] = [Priority::High, Priority::Low];

    pub fn for_trigger(trigger: Trigger) -> Self {
        match trigger {
            Trigger::Manual => Priority::High,
            Trigger::Merge => Priority::Low,
        }
    }

    fn index(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Low => 1,
        }
    }
}

/// Pending deployments, one FIFO lane per priority.
#[derive(Debug, Default)]
pub struct PriorityQueue {
    lanes: [VecDeque<DeploymentInfo>; 2],
}

impl PriorityQueue {
    pub fn new() -> Self {
        PriorityQueue::default()
    }

    pub fn len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(VecDeque::is_empty)
    }

    /// Appends to the lane matching the item's trigger.
    pub fn push(&mut self, item: DeploymentInfo) {
        let priority = Priority::for_trigger(item.trigger());
        self.lanes[priority.index()].push_back(item);
    }

    /// Removes the highest-priority item.
    pub fn pop(&mut self) -> Option<DeploymentInfo> {
        self.lanes.iter_mut().find_map(VecDeque::pop_front)
    }

    /// Returns the item `pop` would return, without removing it.
    pub fn peek(&self) -> Option<&DeploymentInfo> {
        self.lanes.iter().find_map(VecDeque::front)
    }

    /// Items of one priority in dequeue order.
    pub fn scan(&self, priority: Priority) -> Vec<DeploymentInfo> {
        self.lanes[priority.index()].iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::deployment;
    use proptest::prelude::*;

    fn revisions(items: Vec<DeploymentInfo>) -> Vec<String> {
        items.into_iter().map(|i| i.revision.0).collect()
    }

    fn drain(queue: &mut PriorityQueue) -> Vec<DeploymentInfo> {
        std::iter::from_fn(|| queue.pop()).collect()
    }

    // ─── Basic queue operations ───

    #[test]
    fn new_queue_is_empty() {
        let mut queue = PriorityQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert!(queue.peek().is_none());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn peek_does_not_remove() {
        let mut queue = PriorityQueue::new();
        queue.push(deployment("1", Trigger::Merge));
        queue.push(deployment("2", Trigger::Manual));

        assert_eq!(queue.peek().unwrap().revision.as_str(), "2");
        assert_eq!(queue.len(), 2);
    }

    // ─── Priority ordering ───

    #[test]
    fn manual_before_merge_then_fifo() {
        let mut queue = PriorityQueue::new();
        queue.push(deployment("1", Trigger::Merge));
        queue.push(deployment("2", Trigger::Manual));
        queue.push(deployment("3", Trigger::Manual));
        queue.push(deployment("4", Trigger::Merge));

        assert_eq!(revisions(drain(&mut queue)), vec!["2", "3", "1", "4"]);
    }

    #[test]
    fn scan_is_read_only_and_ordered() {
        let mut queue = PriorityQueue::new();
        queue.push(deployment("1", Trigger::Merge));
        queue.push(deployment("2", Trigger::Manual));
        queue.push(deployment("3", Trigger::Merge));

        assert_eq!(revisions(queue.scan(Priority::Low)), vec!["1", "3"]);
        assert_eq!(revisions(queue.scan(Priority::High)), vec!["2"]);
        assert_eq!(queue.len(), 3);
    }

    // ─── Property tests ───

    fn arb_trigger() -> impl Strategy<Value = Trigger> {
        prop_oneof![Just(Trigger::Merge), Just(Trigger::Manual)]
    }

    proptest! {
        /// Every manual item comes out before any merge item, and each lane
        /// keeps its push order.
        #[test]
        fn prop_manual_before_merge_fifo_within(
            triggers in prop::collection::vec(arb_trigger(), 0..20),
        ) {
            let mut queue = PriorityQueue::new();
            for (i, trigger) in triggers.iter().enumerate() {
                queue.push(deployment(&i.to_string(), *trigger));
            }

            let expected: Vec<String> = Priority::ORDER
                .iter()
                .flat_map(|p| {
                    triggers
                        .iter()
                        .enumerate()
                        .filter(move |(_, t)| Priority::for_trigger(**t) == *p)
                        .map(|(i, _)| i.to_string())
                })
                .collect();

            prop_assert_eq!(revisions(drain(&mut queue)), expected);
        }

        #[test]
        fn prop_length_accurate(
            push_count in 0usize..20,
            pop_count in 0usize..20,
        ) {
            let mut queue = PriorityQueue::new();
            for i in 0..push_count {
                queue.push(deployment(&i.to_string(), Trigger::Merge));
            }
            let actual_pops = pop_count.min(push_count);
            for _ in 0..actual_pops {
                queue.pop();
            }
            prop_assert_eq!(queue.len(), push_count - actual_pops);
        }
    }
}
