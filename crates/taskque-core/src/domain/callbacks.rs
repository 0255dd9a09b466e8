//! Callbacks - ライフサイクルイベントごとのコールバック
//!
//! コールバックは Executor 経由で非同期に実行される。キューのロックを
//! 保持したまま呼ばれることはない。

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{FinalizeReason, TaskKey, TaskTrace};

/// Lifecycle event a callback can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Put,
    Update,
    Get,
    Drop,
    Accept,
    Retry,
    Timeout,
    Finalize,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 8] = [
        LifecycleEvent::Put,
        LifecycleEvent::Update,
        LifecycleEvent::Get,
        LifecycleEvent::Drop,
        LifecycleEvent::Accept,
        LifecycleEvent::Retry,
        LifecycleEvent::Timeout,
        LifecycleEvent::Finalize,
    ];
}

/// What a callback receives.
///
/// `trace` and `reason` are only filled for [`LifecycleEvent::Finalize`]
/// (`trace` additionally requires tracing to be enabled).
#[derive(Debug, Clone)]
pub struct TaskNotice<V, P> {
    pub event: LifecycleEvent,
    pub key: TaskKey,
    pub value: V,
    pub priority: Option<P>,
    pub trace: Option<TaskTrace>,
    pub reason: Option<FinalizeReason>,
}

pub type Callback<V, P> = Arc<dyn Fn(TaskNotice<V, P>) + Send + Sync>;

/// One optional callback per lifecycle event.
///
/// Used both for per-task callbacks (attached at admission) and for the
/// queue-wide defaults. When both are present for an event, the per-task one
/// is dispatched first.
pub struct CallbackSet<V, P> {
    on_put: Option<Callback<V, P>>,
    on_update: Option<Callback<V, P>>,
    on_get: Option<Callback<V, P>>,
    on_drop: Option<Callback<V, P>>,
    on_accept: Option<Callback<V, P>>,
    on_retry: Option<Callback<V, P>>,
    on_timeout: Option<Callback<V, P>>,
    on_finalize: Option<Callback<V, P>>,
}

impl<V, P> CallbackSet<V, P> {
    pub fn new() -> Self {
        Self {
            on_put: None,
            on_update: None,
            on_get: None,
            on_drop: None,
            on_accept: None,
            on_retry: None,
            on_timeout: None,
            on_finalize: None,
        }
    }

    /// Set the callback for `event`, replacing any previous one.
    pub fn on<F>(mut self, event: LifecycleEvent, f: F) -> Self
    where
        F: Fn(TaskNotice<V, P>) + Send + Sync + 'static,
    {
        *self.slot_mut(event) = Some(Arc::new(f));
        self
    }

    pub fn set(&mut self, event: LifecycleEvent, callback: Callback<V, P>) {
        *self.slot_mut(event) = Some(callback);
    }

    pub fn get(&self, event: LifecycleEvent) -> Option<&Callback<V, P>> {
        match event {
            LifecycleEvent::Put => self.on_put.as_ref(),
            LifecycleEvent::Update => self.on_update.as_ref(),
            LifecycleEvent::Get => self.on_get.as_ref(),
            LifecycleEvent::Drop => self.on_drop.as_ref(),
            LifecycleEvent::Accept => self.on_accept.as_ref(),
            LifecycleEvent::Retry => self.on_retry.as_ref(),
            LifecycleEvent::Timeout => self.on_timeout.as_ref(),
            LifecycleEvent::Finalize => self.on_finalize.as_ref(),
        }
    }

    /// Lookup used for per-task callbacks: an update falls back to the put
    /// callback and a drop to the get callback.
    pub fn resolve(&self, event: LifecycleEvent) -> Option<&Callback<V, P>> {
        match event {
            LifecycleEvent::Update => self.on_update.as_ref().or(self.on_put.as_ref()),
            LifecycleEvent::Drop => self.on_drop.as_ref().or(self.on_get.as_ref()),
            other => self.get(other),
        }
    }

    /// Overlay `other` on top of `self`: present callbacks in `other` win.
    pub fn merge(&mut self, other: CallbackSet<V, P>) {
        for event in LifecycleEvent::ALL {
            if let Some(cb) = other.get(event) {
                self.set(event, Arc::clone(cb));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        LifecycleEvent::ALL.iter().all(|e| self.get(*e).is_none())
    }

    fn slot_mut(&mut self, event: LifecycleEvent) -> &mut Option<Callback<V, P>> {
        match event {
            LifecycleEvent::Put => &mut self.on_put,
            LifecycleEvent::Update => &mut self.on_update,
            LifecycleEvent::Get => &mut self.on_get,
            LifecycleEvent::Drop => &mut self.on_drop,
            LifecycleEvent::Accept => &mut self.on_accept,
            LifecycleEvent::Retry => &mut self.on_retry,
            LifecycleEvent::Timeout => &mut self.on_timeout,
            LifecycleEvent::Finalize => &mut self.on_finalize,
        }
    }
}

impl<V, P> Default for CallbackSet<V, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, P> Clone for CallbackSet<V, P> {
    fn clone(&self) -> Self {
        Self {
            on_put: self.on_put.clone(),
            on_update: self.on_update.clone(),
            on_get: self.on_get.clone(),
            on_drop: self.on_drop.clone(),
            on_accept: self.on_accept.clone(),
            on_retry: self.on_retry.clone(),
            on_timeout: self.on_timeout.clone(),
            on_finalize: self.on_finalize.clone(),
        }
    }
}

impl<V, P> fmt::Debug for CallbackSet<V, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events: Vec<LifecycleEvent> = LifecycleEvent::ALL
            .into_iter()
            .filter(|e| self.get(*e).is_some())
            .collect();
        f.debug_struct("CallbackSet").field("events", &events).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn notice(event: LifecycleEvent) -> TaskNotice<i32, i32> {
        TaskNotice {
            event,
            key: TaskKey::new("k"),
            value: 1,
            priority: None,
            trace: None,
            reason: None,
        }
    }

    #[test]
    fn per_task_lookup_falls_back() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let set: CallbackSet<i32, i32> = CallbackSet::new().on(LifecycleEvent::Put, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(set.get(LifecycleEvent::Update).is_none());
        let cb = set.resolve(LifecycleEvent::Update).unwrap();
        cb(notice(LifecycleEvent::Update));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(set.resolve(LifecycleEvent::Drop).is_none());
    }

    #[test]
    fn merge_keeps_existing_and_overrides_present() {
        let mut base: CallbackSet<i32, i32> = CallbackSet::new()
            .on(LifecycleEvent::Get, |_| {})
            .on(LifecycleEvent::Timeout, |_| {});
        let update = CallbackSet::new().on(LifecycleEvent::Finalize, |_| {});

        base.merge(update);
        assert!(base.get(LifecycleEvent::Get).is_some());
        assert!(base.get(LifecycleEvent::Timeout).is_some());
        assert!(base.get(LifecycleEvent::Finalize).is_some());
        assert!(base.get(LifecycleEvent::Accept).is_none());
        assert!(!base.is_empty());
        assert!(CallbackSet::<i32, i32>::new().is_empty());
    }
}
