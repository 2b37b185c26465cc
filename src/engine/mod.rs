//! In-process execution substrate for the deployment workflows.
//!
//! Provides what the workflows assume from their host: retries with backoff
//! for activities, signal delivery by key, child workflow handles and id
//! generation.

pub mod child;
pub mod id;
pub mod retry;
pub mod signal;

pub use child::{ChildError, ChildHandle, spawn_child};
pub use id::{IdGenerator, SequentialIds, UuidGenerator};
pub use retry::{RetryConfig, retry_activity};
pub use signal::{SignalError, SignalRegistry, Subscription};
