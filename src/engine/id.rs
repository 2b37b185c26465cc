//! Deployment id generation.
//!
//! Ids are generated once, when a revision is accepted, and then treated as
//! immutable input everywhere downstream.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use crate::types::DeploymentId;

pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> DeploymentId;
}

/// Random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> DeploymentId {
        DeploymentId::new(Uuid::new_v4())
    }
}

/// Ids `1, 2, 3, ...`, for predictable tests and replays.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        SequentialIds::default()
    }
}

impl IdGenerator for SequentialIds {
    fn generate(&self) -> DeploymentId {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        DeploymentId::new(Uuid::from_u128(u128::from(n)))
    }
}
