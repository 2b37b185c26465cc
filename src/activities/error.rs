//! Error type shared by every activity.
//!
//! Activities are side-effecting calls to collaborators (GitHub, storage,
//! terraform). Each failure is classified as transient or permanent so retry
//! loops know whether another attempt can help.

use std::fmt;

/// Classification of activity errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityErrorKind {
    /// Rate limits, timeouts, 5xx. Retry with backoff.
    Transient,
    /// Bad input, missing resources, failed terraform runs. Never retried.
    Permanent,
}

impl fmt::Display for ActivityErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityErrorKind::Transient => write!(f, "transient"),
            ActivityErrorKind::Permanent => write!(f, "permanent"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{kind} activity error: {message}")]
pub struct ActivityError {
    pub kind: ActivityErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ActivityError {
    pub fn transient(message: impl Into<String>) -> Self {
        ActivityError {
            kind: ActivityErrorKind::Transient,
            message: message.into(),
            source: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        ActivityError {
            kind: ActivityErrorKind::Permanent,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ActivityErrorKind::Transient
    }
}

impl From<std::io::Error> for ActivityError {
    fn from(e: std::io::Error) -> Self {
        let kind = match e.kind() {
            std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::WouldBlock => ActivityErrorKind::Transient,
            _ => ActivityErrorKind::Permanent,
        };
        ActivityError {
            kind,
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_timeouts_are_transient() {
        let err: ActivityError = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into();
        assert!(err.is_transient());

        let err: ActivityError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(!err.is_transient());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn display_includes_kind() {
        let err = ActivityError::permanent("bad request");
        assert_eq!(err.to_string(), "permanent activity error: bad request");
    }
}
