//! Bounded retries for activity calls and child workflows.
//!
//! An activity that fails transiently is called again after a doubling
//! delay; a permanent failure is returned as is. The terraform child workflow
//! reuses the same attempt and delay arithmetic through
//! [`RetryConfig::CHILD_WORKFLOW`].

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::activities::{ActivityError, ActivityErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Calls made before giving up, the first one included.
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Activity calls: four attempts, waiting 2s, 4s then 8s.
    pub const DEFAULT: Self = Self {
        attempts: 4,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(16),
    };

    /// Terraform child workflow launches: three attempts.
    pub const CHILD_WORKFLOW: Self = Self {
        attempts: 3,
        initial_delay: Duration::from_secs(5),
        max_delay: Duration::from_secs(30),
    };

    /// Same attempts as [`RetryConfig::DEFAULT`] without waiting. Used by tests.
    pub const IMMEDIATE: Self = Self {
        attempts: 4,
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    };

    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    /// Wait after the `failed`-th failed attempt, counting from zero.
    pub fn delay_for_attempt(&self, failed: u32) -> Duration {
        let factor = 1u32.checked_shl(failed).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Calls `operation` until it succeeds, fails permanently, or runs out of
/// attempts. The last error is returned.
pub async fn retry_activity<T, F, Fut>(config: RetryConfig, mut operation: F) -> Result<T, ActivityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ActivityError>>,
{
    let mut failed = 0;
    loop {
        let e = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        failed += 1;
        if e.kind == ActivityErrorKind::Permanent || failed >= config.max_attempts() {
            return Err(e);
        }
        let delay = config.delay_for_attempt(failed - 1);
        debug!(attempt = failed, ?delay, error = %e, "activity failed, retrying");
        tokio::time::sleep(delay).await;
    }
}
