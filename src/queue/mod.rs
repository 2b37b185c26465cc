//! Revision queue for one (repo, root).
//!
//! Items are ordered by trigger priority (manual deploys first), then by
//! arrival (FIFO within the same priority). A lock lets a human pause
//! merge-triggered deploys without dropping the revisions already queued.

pub mod priority;
pub mod revision;

pub use priority::{Priority, PriorityQueue};
pub use revision::{EmptyQueueError, LockState, LockStatus, RevisionQueue};
