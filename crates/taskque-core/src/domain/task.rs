use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CallbackSet, LifecycleEvent, TaskKey, TaskNotice};
use crate::error::QueueError;

/// A task as handed back by `retrieve` and `peek`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry<V, P> {
    pub key: TaskKey,
    pub value: V,
    pub priority: Option<P>,
}

impl<V, P> TaskEntry<V, P> {
    pub fn into_parts(self) -> (TaskKey, V, Option<P>) {
        (self.key, self.value, self.priority)
    }
}

/// Ordering position of a task: any explicit priority sorts before an absent one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Rank<P> {
    Set(P),
    Unset,
}

impl<P> From<Option<P>> for Rank<P> {
    fn from(priority: Option<P>) -> Self {
        match priority {
            Some(p) => Rank::Set(p),
            None => Rank::Unset,
        }
    }
}

impl<P: Clone> Rank<P> {
    pub(crate) fn to_option(&self) -> Option<P> {
        match self {
            Rank::Set(p) => Some(p.clone()),
            Rank::Unset => None,
        }
    }
}

/// Arguments of a single admission.
///
/// # 使用例
/// ```ignore
/// let key = queue.admit(
///     Admission::new("payload").key("x").priority(5),
///     WaitOptions::blocking(),
/// )?;
/// ```
pub struct Admission<V, P> {
    pub(crate) key: Option<TaskKey>,
    pub(crate) value: V,
    pub(crate) priority: Option<P>,
    pub(crate) time_limit: Option<Duration>,
    pub(crate) update_only: bool,
    pub(crate) callbacks: CallbackSet<V, P>,
}

impl<V, P> Admission<V, P> {
    pub fn new(value: V) -> Self {
        Self {
            key: None,
            value,
            priority: None,
            time_limit: None,
            update_only: false,
            callbacks: CallbackSet::new(),
        }
    }

    /// Caller-supplied key. Only valid when the queue does not generate keys.
    pub fn key(mut self, key: impl Into<TaskKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn priority(mut self, priority: P) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Expire the task this long after admission, overriding the queue default.
    pub fn time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Only update an already queued key; fail with `NotFound` otherwise.
    pub fn update_only(mut self) -> Self {
        self.update_only = true;
        self
    }

    pub fn callbacks(mut self, callbacks: CallbackSet<V, P>) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn on<F>(mut self, event: LifecycleEvent, f: F) -> Self
    where
        F: Fn(TaskNotice<V, P>) + Send + Sync + 'static,
    {
        self.callbacks = self.callbacks.on(event, f);
        self
    }

    pub fn key_ref(&self) -> Option<&TaskKey> {
        self.key.as_ref()
    }

    /// Argument checks that do not depend on queue contents.
    pub(crate) fn validate(&self, auto_key: bool) -> Result<(), QueueError> {
        match (auto_key, &self.key) {
            (true, Some(key)) => {
                return Err(QueueError::InvalidArgument(format!(
                    "key={key} supplied but keys are generated"
                )));
            }
            (false, None) => {
                return Err(QueueError::InvalidArgument(
                    "key is required when keys are not generated".to_string(),
                ));
            }
            _ => {}
        }
        if self.time_limit.is_some_and(|limit| limit.is_zero()) {
            return Err(QueueError::InvalidArgument(
                "time_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
