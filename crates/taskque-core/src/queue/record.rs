//! Task record: the single source of truth for a live task.

use std::time::{Duration, Instant};

use crate::domain::{CallbackSet, Rank, TaskEntry, TaskKey};

/// Everything the registry knows about a live (queued or retained) task.
///
/// Design:
/// - Records live in one table keyed by `TaskKey`.
/// - The priority map and retained set hold keys only.
/// - A record is removed exactly once, at finalize.
pub(crate) struct TaskRecord<V, P> {
    pub key: TaskKey,
    pub value: V,
    pub rank: Rank<P>,
    pub callbacks: CallbackSet<V, P>,

    /// Effective limit (explicit or queue default) at the last admission.
    pub time_limit: Option<Duration>,

    pub created_at: Instant,
}

impl<V: Clone, P: Clone> TaskRecord<V, P> {
    pub fn new(
        key: TaskKey,
        value: V,
        rank: Rank<P>,
        callbacks: CallbackSet<V, P>,
        time_limit: Option<Duration>,
    ) -> Self {
        Self {
            key,
            value,
            rank,
            callbacks,
            time_limit,
            created_at: Instant::now(),
        }
    }

    /// Replace payload and metadata on update, keeping the creation instant.
    pub fn update(
        &mut self,
        value: V,
        rank: Rank<P>,
        callbacks: CallbackSet<V, P>,
        time_limit: Option<Duration>,
    ) {
        self.value = value;
        self.rank = rank;
        self.callbacks = callbacks;
        self.time_limit = time_limit;
    }

    pub fn priority(&self) -> Option<P> {
        self.rank.to_option()
    }

    pub fn entry(&self) -> TaskEntry<V, P> {
        TaskEntry {
            key: self.key.clone(),
            value: self.value.clone(),
            priority: self.priority(),
        }
    }
}
