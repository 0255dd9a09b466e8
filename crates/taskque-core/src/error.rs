use thiserror::Error;

use crate::domain::TaskKey;

/// Errors returned synchronously by queue operations.
///
/// Timer-driven work (timeout, retry) never produces these; races there are
/// resolved by presence checks and end as no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Capacity exhausted for a non-blocking put, or a timed-out blocking put
    /// that never saw free capacity.
    #[error("queue is full")]
    Full,

    /// Nothing to get or peek (non-blocking, or timed out while still empty).
    #[error("queue is empty")]
    Empty,

    /// Deadline elapsed, or the queue was frozen while the caller waited.
    #[error("operation timed out")]
    Timeout,

    /// The key is currently retained (handed out, not acknowledged).
    #[error("key={0} is in progress")]
    KeyConflict(TaskKey),

    #[error("key={0} not found")]
    NotFound(TaskKey),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl QueueError {
    /// `Full`, `Empty` and `Timeout` describe a transient queue condition;
    /// retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Full | QueueError::Empty | QueueError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_key() {
        let err = QueueError::KeyConflict(TaskKey::new("job-7"));
        assert_eq!(err.to_string(), "key=job-7 is in progress");

        let err = QueueError::NotFound(TaskKey::new("job-7"));
        assert!(err.to_string().contains("job-7"));
    }

    #[test]
    fn capacity_errors_are_transient() {
        assert!(QueueError::Full.is_transient());
        assert!(QueueError::Timeout.is_transient());
        assert!(!QueueError::NotFound(TaskKey::new("a")).is_transient());
        assert!(!QueueError::InvalidArgument("x".into()).is_transient());
    }
}
