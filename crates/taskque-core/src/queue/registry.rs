//! TaskQueue - タスクレジストリの公開ハンドル
//!
//! # 役割
//! - QueueCore（待機・容量・レート制限）と TaskBook（タスク管理）をまとめる
//! - タイマー発火（timeout / retry）を TimerCommand として受け取り、
//!   TaskBook に振り分ける
//!
//! ハンドルは安価に clone でき、スレッド間で共有できる。

use std::sync::Arc;

use super::blocking::{FrozenScope, QueueBackend, QueueCore, WaitOptions};
use super::book::TaskBook;
use super::state::TaskState;
use super::timer::{TimerCommand, TimerOp, TimerSink};
use crate::config::SpeedLimit;
use crate::domain::{Admission, CallbackSet, TaskEntry, TaskKey, TaskTrace};
use crate::error::QueueError;
use crate::observability::QueueCounts;

pub(crate) struct Shared<V, P> {
    pub(crate) core: QueueCore<TaskBook<V, P>>,
    pub(crate) auto_key: bool,
}

impl<V, P> TimerSink for Shared<V, P>
where
    V: Clone + Send + Sync + 'static,
    P: Ord + Clone + Send + Sync + 'static,
{
    fn fire(&self, command: TimerCommand) {
        let TimerCommand {
            op,
            key,
            generation,
        } = command;
        match op {
            TimerOp::Timeout => {
                if self.core.with_backend(|book| book.expire(&key, generation)) {
                    self.core.notify_not_full();
                }
            }
            TimerOp::Retry => {
                if self.core.with_backend(|book| book.requeue(&key, generation)) {
                    self.core.notify_not_empty();
                }
            }
        }
    }
}

/// Priority task queue with retention, retry, timeouts and callbacks.
///
/// Build one with [`TaskQueueBuilder`](super::TaskQueueBuilder).
///
/// # 使用例
/// ```ignore
/// let queue: TaskQueue<String, u32> = TaskQueueBuilder::new()
///     .retry_after(Duration::from_secs(30))
///     .build()?;
/// let admission = Admission::new("payload".to_string()).priority(1);
/// let key = queue.admit(admission, WaitOptions::blocking())?;
/// let task = queue.retrieve(WaitOptions::blocking())?;
/// queue.acknowledge(&task.key)?;
/// ```
pub struct TaskQueue<V, P> {
    shared: Arc<Shared<V, P>>,
}

impl<V, P> Clone for TaskQueue<V, P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V, P> TaskQueue<V, P>
where
    V: Clone + Send + Sync + 'static,
    P: Ord + Clone + Send + Sync + 'static,
{
    pub(crate) fn from_shared(shared: Arc<Shared<V, P>>) -> Self {
        Self { shared }
    }

    fn core(&self) -> &QueueCore<TaskBook<V, P>> {
        &self.shared.core
    }

    // ---------------------------------------------------------------------
    // Admission
    // ---------------------------------------------------------------------

    /// Add a task, or update it in place when its key is already queued.
    pub fn admit(
        &self,
        admission: Admission<V, P>,
        opts: WaitOptions,
    ) -> Result<TaskKey, QueueError> {
        admission.validate(self.shared.auto_key)?;
        self.core().put(admission, opts)
    }

    pub fn admit_nowait(&self, admission: Admission<V, P>) -> Result<TaskKey, QueueError> {
        self.admit(admission, WaitOptions::nowait())
    }

    // ---------------------------------------------------------------------
    // Retrieval
    // ---------------------------------------------------------------------

    /// Take the highest-priority task. With retention it stays in flight until
    /// acknowledged (or retried).
    pub fn retrieve(&self, opts: WaitOptions) -> Result<TaskEntry<V, P>, QueueError> {
        self.core().get(None, opts)
    }

    pub fn retrieve_nowait(&self) -> Result<TaskEntry<V, P>, QueueError> {
        self.retrieve(WaitOptions::nowait())
    }

    /// Remove a queued task by key. The task is finalized with `drop`.
    pub fn retrieve_key(
        &self,
        key: &TaskKey,
        opts: WaitOptions,
    ) -> Result<TaskEntry<V, P>, QueueError> {
        self.core().get(Some(key), opts)
    }

    pub fn peek(&self, opts: WaitOptions) -> Result<TaskEntry<V, P>, QueueError> {
        self.core().peek(None, opts)
    }

    pub fn peek_nowait(&self) -> Result<TaskEntry<V, P>, QueueError> {
        self.peek(WaitOptions::nowait())
    }

    pub fn peek_key(
        &self,
        key: &TaskKey,
        opts: WaitOptions,
    ) -> Result<TaskEntry<V, P>, QueueError> {
        self.core().peek(Some(key), opts)
    }

    /// Confirm a retained task. Fails with `NotFound` unless `key` is retained.
    pub fn acknowledge(&self, key: &TaskKey) -> Result<(), QueueError> {
        self.core().with_backend(|book| book.acknowledge(key))
    }

    // ---------------------------------------------------------------------
    // Configuration
    // ---------------------------------------------------------------------

    pub fn set_default_callbacks(&self, callbacks: CallbackSet<V, P>) {
        self.core()
            .with_backend(|book| book.set_default_callbacks(callbacks));
    }

    /// Merge into the default callbacks; present entries replace existing ones.
    pub fn update_default_callbacks(&self, callbacks: CallbackSet<V, P>) {
        self.core()
            .with_backend(|book| book.update_default_callbacks(callbacks));
    }

    pub fn set_speed_limit(&self, speed: SpeedLimit) {
        self.core().set_speed_limit(speed);
    }

    pub fn speed_limit(&self) -> SpeedLimit {
        self.core().speed_limit()
    }

    /// Make blocking calls fail fast with `Timeout`.
    pub fn freeze(&self) {
        self.core().freeze();
    }

    pub fn unfreeze(&self) {
        self.core().unfreeze();
    }

    pub fn is_frozen(&self) -> bool {
        self.core().is_frozen()
    }

    /// Freeze until the guard is dropped.
    pub fn frozen_scope(&self) -> FrozenScope<'_, TaskBook<V, P>> {
        self.core().frozen_scope()
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    /// Queued tasks (retained ones are not counted).
    pub fn len(&self) -> usize {
        self.core().with_backend(|book| book.size())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn retained_len(&self) -> usize {
        self.core().with_backend(|book| book.retained_len())
    }

    pub fn max_size(&self) -> usize {
        self.core().max_size()
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.state_of(key) == Some(TaskState::Queued)
    }

    pub fn is_retained(&self, key: &TaskKey) -> bool {
        self.state_of(key) == Some(TaskState::Retained)
    }

    pub fn state_of(&self, key: &TaskKey) -> Option<TaskState> {
        self.core().with_backend(|book| book.state_of(key))
    }

    /// Trace of a live task. Finalized tasks hand theirs to the finalize callback.
    pub fn trace(&self, key: &TaskKey) -> Option<TaskTrace> {
        self.core().with_backend(|book| book.trace_of(key))
    }

    pub fn counts(&self) -> QueueCounts {
        let state = self.core().lock();
        let (puts, gets) = state.op_counts();
        QueueCounts {
            queued: state.backend.size(),
            retained: state.backend.retained_len(),
            armed_timers: state.backend.armed_timers(),
            puts,
            gets,
        }
    }
}
