//! TaskBook: the task-aware backend of the queue core.
//!
//! Holds every table of the registry (records, priority map, retained set,
//! traces, armed timers) and implements admission, retrieval, acknowledgment,
//! timeout, retry and finalize. All methods run under the core mutex; user
//! callbacks are handed to the executor and never run here.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, warn};

use super::blocking::QueueBackend;
use super::priority_map::PriorityMap;
use super::record::TaskRecord;
use super::state::TaskState;
use super::timer::{Armed, ArmedTimers, TimerCommand, TimerOp, TimerSink};
use crate::config::QueueConfig;
use crate::domain::{
    Admission, CallbackSet, FinalizeReason, LifecycleEvent, Rank, TaskEntry, TaskKey, TaskNotice,
    TaskTrace, TraceOp,
};
use crate::error::QueueError;
use crate::ports::{Clock, Executor, KeyGenerator};

/// Options the book needs after the queue is built.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BookSettings {
    pub auto_key: bool,
    pub use_retain: bool,
    pub use_trace: bool,
    pub max_retain: usize,
    pub retry_after: Option<Duration>,
    pub time_limit: Option<Duration>,
}

impl From<&QueueConfig> for BookSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            auto_key: config.auto_key,
            use_retain: config.use_retain,
            use_trace: config.use_trace,
            max_retain: config.max_retain,
            retry_after: config.retry_delay(),
            time_limit: config.time_limit,
        }
    }
}

/// Collaborators injected at build time.
pub(crate) struct BookPorts {
    pub executor: Arc<dyn Executor>,
    pub clock: Arc<dyn Clock>,
    pub keys: Arc<dyn KeyGenerator>,
    pub sink: Weak<dyn TimerSink>,
}

pub struct TaskBook<V, P> {
    settings: BookSettings,
    records: HashMap<TaskKey, TaskRecord<V, P>>,
    queued: PriorityMap<TaskKey, (), Rank<P>>,
    /// Retained keys; insertion order doubles as eviction order.
    retained: PriorityMap<TaskKey, (), ()>,
    traces: HashMap<TaskKey, TaskTrace>,
    timers: HashMap<TaskKey, ArmedTimers>,
    next_generation: u64,
    defaults: CallbackSet<V, P>,
    ports: BookPorts,
}

impl<V, P> TaskBook<V, P>
where
    V: Clone + Send + Sync + 'static,
    P: Ord + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        settings: BookSettings,
        defaults: CallbackSet<V, P>,
        ports: BookPorts,
    ) -> Self {
        Self {
            settings,
            records: HashMap::new(),
            queued: PriorityMap::new(),
            retained: PriorityMap::new(),
            traces: HashMap::new(),
            timers: HashMap::new(),
            next_generation: 0,
            defaults,
            ports,
        }
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Retained → finalized(`ok`).
    pub(crate) fn acknowledge(&mut self, key: &TaskKey) -> Result<(), QueueError> {
        if !self.retained.contains(key) {
            return Err(QueueError::NotFound(key.clone()));
        }
        self.trace(key, TraceOp::Accept);
        self.notify(key, LifecycleEvent::Accept);
        self.finalize(key, true, FinalizeReason::Ok);
        debug!(key = %key, "task acknowledged");
        Ok(())
    }

    /// Timer-driven expiry. Returns whether a queued slot was freed.
    pub(crate) fn expire(&mut self, key: &TaskKey, generation: u64) -> bool {
        if !self.disarm_fired(key, TimerOp::Timeout, generation) {
            return false;
        }
        if !self.records.contains_key(key) {
            return false;
        }
        let was_queued = self.queued.contains(key);
        self.trace(key, TraceOp::Timeout);
        self.notify(key, LifecycleEvent::Timeout);
        self.finalize(key, true, FinalizeReason::Timeout);
        debug!(key = %key, was_queued, "task timed out");
        was_queued
    }

    /// Timer-driven retry: retained → queued with the original priority.
    /// Returns whether the key was re-queued.
    pub(crate) fn requeue(&mut self, key: &TaskKey, generation: u64) -> bool {
        if !self.disarm_fired(key, TimerOp::Retry, generation) {
            return false;
        }
        if self.retained.pop_key(key).is_none() {
            return false;
        }
        let Some(rank) = self.records.get(key).map(|record| record.rank.clone()) else {
            return false;
        };
        self.queued.push(key.clone(), (), rank);
        self.trace(key, TraceOp::Retry);
        self.notify(key, LifecycleEvent::Retry);
        debug!(key = %key, "unacknowledged task re-queued");
        true
    }

    /// Terminal cleanup of `key`. With `clean`, the key is first removed from
    /// the priority map / retained set. Returns `false` if the key was already
    /// finalized.
    fn finalize(&mut self, key: &TaskKey, clean: bool, reason: FinalizeReason) -> bool {
        if clean {
            self.queued.pop_key(key);
            self.retained.pop_key(key);
        }
        if let Some(timers) = self.timers.remove(key) {
            for token in timers.tokens() {
                self.ports.executor.cancel(token);
            }
        }
        let Some(record) = self.records.remove(key) else {
            return false;
        };
        let trace = self.traces.remove(key).map(|mut trace| {
            trace.finish(reason);
            trace
        });
        self.dispatch(&record, LifecycleEvent::Finalize, trace, Some(reason));
        debug!(
            key = %key,
            %reason,
            age_ms = record.created_at.elapsed().as_millis() as u64,
            "task finalized"
        );
        true
    }

    // ---------------------------------------------------------------------
    // Callbacks
    // ---------------------------------------------------------------------

    pub(crate) fn set_default_callbacks(&mut self, callbacks: CallbackSet<V, P>) {
        self.defaults = callbacks;
    }

    pub(crate) fn update_default_callbacks(&mut self, callbacks: CallbackSet<V, P>) {
        self.defaults.merge(callbacks);
    }

    fn notify(&self, key: &TaskKey, event: LifecycleEvent) {
        if let Some(record) = self.records.get(key) {
            self.dispatch(record, event, None, None);
        }
    }

    /// Hand the per-task callback, then the default one, to the executor.
    fn dispatch(
        &self,
        record: &TaskRecord<V, P>,
        event: LifecycleEvent,
        trace: Option<TaskTrace>,
        reason: Option<FinalizeReason>,
    ) {
        let callbacks: Vec<_> = [record.callbacks.resolve(event), self.defaults.get(event)]
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        if callbacks.is_empty() {
            return;
        }
        let notice = TaskNotice {
            event,
            key: record.key.clone(),
            value: record.value.clone(),
            priority: record.priority(),
            trace,
            reason,
        };
        // one job per notice keeps item-then-default order; one lane per key
        // keeps a task's notices in the order they were raised
        self.ports.executor.run_now(
            lane_of(&record.key),
            Box::new(move || {
                for callback in callbacks {
                    let notice = notice.clone();
                    let key = notice.key.clone();
                    if panic::catch_unwind(AssertUnwindSafe(|| callback(notice))).is_err() {
                        warn!(key = %key, ?event, "callback panicked");
                    }
                }
            }),
        );
    }

    // ---------------------------------------------------------------------
    // Timers
    // ---------------------------------------------------------------------

    /// Arm `op` for `key`, replacing (and cancelling) any timer of the same kind.
    fn arm(&mut self, key: &TaskKey, op: TimerOp, delay: Duration) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let command = TimerCommand {
            op,
            key: key.clone(),
            generation,
        };
        let sink = self.ports.sink.clone();
        let token = self.ports.executor.run_after(
            delay,
            Box::new(move || {
                if let Some(sink) = sink.upgrade() {
                    sink.fire(command);
                }
            }),
        );

        let slot = self.timers.entry(key.clone()).or_default().slot_mut(op);
        if let Some(previous) = slot.replace(Armed { token, generation }) {
            self.ports.executor.cancel(previous.token);
        }
    }

    /// Cancel an armed timer of `op` for `key`, if any.
    fn disarm(&mut self, key: &TaskKey, op: TimerOp) {
        let Some(timers) = self.timers.get_mut(key) else {
            return;
        };
        if let Some(armed) = timers.slot_mut(op).take() {
            self.ports.executor.cancel(armed.token);
        }
        if timers.is_empty() {
            self.timers.remove(key);
        }
    }

    /// Clear the slot of a timer that just fired. `false` means the timer
    /// was cancelled or replaced in the meantime.
    fn disarm_fired(&mut self, key: &TaskKey, op: TimerOp, generation: u64) -> bool {
        let Some(timers) = self.timers.get_mut(key) else {
            return false;
        };
        let current = timers.take(op, generation);
        if timers.is_empty() {
            self.timers.remove(key);
        }
        current
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    fn trace(&mut self, key: &TaskKey, op: TraceOp) {
        if self.settings.use_trace {
            let at = self.ports.clock.now();
            self.traces.entry(key.clone()).or_default().record(op, at);
        }
    }

    pub(crate) fn trace_of(&self, key: &TaskKey) -> Option<TaskTrace> {
        self.traces.get(key).cloned()
    }

    pub(crate) fn state_of(&self, key: &TaskKey) -> Option<TaskState> {
        if self.queued.contains(key) {
            Some(TaskState::Queued)
        } else if self.retained.contains(key) {
            Some(TaskState::Retained)
        } else {
            None
        }
    }

    pub(crate) fn retained_len(&self) -> usize {
        self.retained.len()
    }

    pub(crate) fn armed_timers(&self) -> usize {
        self.timers.len()
    }

    #[cfg(test)]
    fn live_records(&self) -> usize {
        self.records.len()
    }

    fn event_for(op: TraceOp) -> LifecycleEvent {
        match op {
            TraceOp::Put => LifecycleEvent::Put,
            TraceOp::Update => LifecycleEvent::Update,
            TraceOp::Get => LifecycleEvent::Get,
            TraceOp::Drop => LifecycleEvent::Drop,
            TraceOp::Accept => LifecycleEvent::Accept,
            TraceOp::Retry => LifecycleEvent::Retry,
            TraceOp::Timeout => LifecycleEvent::Timeout,
        }
    }

    fn entry_of(&self, key: &TaskKey) -> Result<TaskEntry<V, P>, QueueError> {
        self.records
            .get(key)
            .map(TaskRecord::entry)
            .ok_or_else(|| QueueError::NotFound(key.clone()))
    }
}

/// Executor lane for a task's notices.
fn lane_of(key: &TaskKey) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

impl<V, P> QueueBackend for TaskBook<V, P>
where
    V: Clone + Send + Sync + 'static,
    P: Ord + Clone + Send + Sync + 'static,
{
    type Item = Admission<V, P>;
    type Key = TaskKey;
    type Output = TaskEntry<V, P>;

    fn size(&self) -> usize {
        self.queued.len()
    }

    /// Admissions that cannot take a new slot skip the capacity wait: updates
    /// of queued keys, and requests that are bound to be rejected.
    fn contains(&self, item: &Admission<V, P>) -> bool {
        match item.key_ref() {
            Some(key) => {
                self.queued.contains(key) || self.retained.contains(key) || item.update_only
            }
            None => false,
        }
    }

    fn do_put(&mut self, item: Admission<V, P>) -> Result<TaskKey, QueueError> {
        let Admission {
            key,
            value,
            priority,
            time_limit,
            update_only,
            callbacks,
        } = item;
        let key = match key {
            Some(key) => key,
            None if self.settings.auto_key => self.ports.keys.next_key(),
            None => {
                return Err(QueueError::InvalidArgument(
                    "key is required when keys are not generated".to_string(),
                ));
            }
        };

        if self.retained.contains(&key) {
            return Err(QueueError::KeyConflict(key));
        }
        let updating = self.queued.contains(&key);
        if update_only && !updating {
            return Err(QueueError::NotFound(key));
        }

        let op = if updating { TraceOp::Update } else { TraceOp::Put };
        let rank = Rank::from(priority);
        let limit = time_limit.or(self.settings.time_limit);

        self.queued.push(key.clone(), (), rank.clone());
        match self.records.get_mut(&key) {
            Some(record) => record.update(value, rank, callbacks, limit),
            None => {
                let record = TaskRecord::new(key.clone(), value, rank, callbacks, limit);
                self.records.insert(key.clone(), record);
            }
        }
        self.trace(&key, op);

        if updating {
            self.disarm(&key, TimerOp::Timeout);
        }
        if let Some(limit) = limit {
            self.arm(&key, TimerOp::Timeout, limit);
        }
        self.notify(&key, Self::event_for(op));
        debug!(key = %key, ?op, "task admitted");
        Ok(key)
    }

    fn do_get(&mut self, key: Option<&TaskKey>) -> Result<TaskEntry<V, P>, QueueError> {
        let (key, op) = match key {
            None => {
                let (key, _, _) = self.queued.pop().ok_or(QueueError::Empty)?;
                (key, TraceOp::Get)
            }
            Some(key) => {
                let (key, _, _) = self
                    .queued
                    .pop_key(key)
                    .ok_or_else(|| QueueError::NotFound(key.clone()))?;
                (key, TraceOp::Drop)
            }
        };
        let entry = self.entry_of(&key)?;
        self.trace(&key, op);

        let retain = op == TraceOp::Get && self.settings.use_retain;
        if retain {
            if self.retained.len() >= self.settings.max_retain
                && let Some((oldest, _, _)) = self.retained.pop()
            {
                warn!(
                    key = %oldest,
                    max_retain = self.settings.max_retain,
                    "retained set full, evicting oldest"
                );
                self.finalize(&oldest, false, FinalizeReason::Clean);
            }
            self.retained.push(key.clone(), (), ());
            if let Some(delay) = self.settings.retry_after {
                self.arm(&key, TimerOp::Retry, delay);
            }
        }

        self.notify(&key, Self::event_for(op));
        debug!(key = %key, ?op, retain, "task retrieved");

        if !retain {
            let reason = if op == TraceOp::Drop {
                FinalizeReason::Drop
            } else {
                FinalizeReason::Ok
            };
            self.finalize(&key, false, reason);
        }
        Ok(entry)
    }

    fn do_peek(&self, key: Option<&TaskKey>) -> Result<TaskEntry<V, P>, QueueError> {
        match key {
            None => {
                let (key, _, _) = self.queued.peek().ok_or(QueueError::Empty)?;
                self.entry_of(key)
            }
            Some(key) if self.queued.contains(key) => self.entry_of(key),
            Some(key) => Err(QueueError::NotFound(key.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, Job, SequentialKeys, TimerToken};
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Runs `run_now` jobs inline and parks delayed jobs until fired by hand.
    #[derive(Default)]
    struct ManualExecutor {
        next: AtomicU64,
        delayed: Mutex<Vec<(TimerToken, Duration, Job)>>,
    }

    impl ManualExecutor {
        fn armed(&self) -> Vec<Duration> {
            self.delayed.lock().unwrap().iter().map(|(_, d, _)| *d).collect()
        }

        fn fire_all(&self) {
            let jobs: Vec<_> = self.delayed.lock().unwrap().drain(..).collect();
            for (_, _, job) in jobs {
                job();
            }
        }
    }

    impl Executor for ManualExecutor {
        fn run_now(&self, _lane: u64, job: Job) {
            job();
        }

        fn run_after(&self, delay: Duration, job: Job) -> TimerToken {
            let token = TimerToken::new(self.next.fetch_add(1, Ordering::SeqCst));
            self.delayed.lock().unwrap().push((token, delay, job));
            token
        }

        fn cancel(&self, token: TimerToken) {
            self.delayed.lock().unwrap().retain(|(t, _, _)| *t != token);
        }
    }

    #[derive(Default)]
    struct Recorder {
        fired: Mutex<Vec<TimerCommand>>,
    }

    impl TimerSink for Recorder {
        fn fire(&self, command: TimerCommand) {
            self.fired.lock().unwrap().push(command);
        }
    }

    struct Fixture {
        book: TaskBook<&'static str, i32>,
        executor: Arc<ManualExecutor>,
        recorder: Arc<Recorder>,
        notices: Arc<Mutex<Vec<TaskNotice<&'static str, i32>>>>,
    }

    impl Fixture {
        fn new(config: QueueConfig) -> Self {
            let executor = Arc::new(ManualExecutor::default());
            let recorder = Arc::new(Recorder::default());
            let notices = Arc::new(Mutex::new(Vec::new()));
            let sink: Weak<dyn TimerSink> = Arc::<Recorder>::downgrade(&recorder);

            let mut defaults = CallbackSet::new();
            for event in LifecycleEvent::ALL {
                let notices = Arc::clone(&notices);
                defaults = defaults.on(event, move |n| notices.lock().unwrap().push(n));
            }
            let ports = BookPorts {
                executor: executor.clone(),
                clock: Arc::new(FixedClock::new(
                    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                )),
                keys: Arc::new(SequentialKeys::new()),
                sink,
            };
            Self {
                book: TaskBook::new(BookSettings::from(&config), defaults, ports),
                executor,
                recorder,
                notices,
            }
        }

        fn put(&mut self, value: &'static str, priority: i32) -> TaskKey {
            self.book
                .do_put(Admission::new(value).priority(priority))
                .unwrap()
        }

        fn events(&self) -> Vec<(LifecycleEvent, String)> {
            self.notices
                .lock()
                .unwrap()
                .iter()
                .map(|n| (n.event, n.key.to_string()))
                .collect()
        }

        fn fire_timers(&mut self) -> Vec<TimerCommand> {
            self.executor.fire_all();
            self.recorder.fired.lock().unwrap().drain(..).collect()
        }
    }

    #[test]
    fn put_get_ack_walks_the_lifecycle() {
        let mut fx = Fixture::new(QueueConfig::default());
        let key = fx.put("a", 1);
        assert_eq!(key.as_str(), "0");
        assert_eq!(fx.book.state_of(&key), Some(TaskState::Queued));

        let entry = fx.book.do_get(None).unwrap();
        assert_eq!(entry.into_parts(), (key.clone(), "a", Some(1)));
        assert_eq!(fx.book.state_of(&key), Some(TaskState::Retained));

        fx.book.acknowledge(&key).unwrap();
        assert_eq!(fx.book.state_of(&key), None);
        assert_eq!(fx.book.live_records(), 0);

        let events: Vec<_> = fx.events().into_iter().map(|(e, _)| e).collect();
        assert_eq!(
            events,
            vec![
                LifecycleEvent::Put,
                LifecycleEvent::Get,
                LifecycleEvent::Accept,
                LifecycleEvent::Finalize
            ]
        );
        let last = fx.notices.lock().unwrap().pop().unwrap();
        assert_eq!(last.reason, Some(FinalizeReason::Ok));
        let trace = last.trace.unwrap();
        assert_eq!(trace.reason(), Some(FinalizeReason::Ok));
        assert_eq!(trace.last_op(), Some(TraceOp::Accept));
    }

    #[test]
    fn double_acknowledge_is_not_found() {
        let mut fx = Fixture::new(QueueConfig::default());
        let key = fx.put("a", 1);
        fx.book.do_get(None).unwrap();
        fx.book.acknowledge(&key).unwrap();
        assert_eq!(fx.book.acknowledge(&key), Err(QueueError::NotFound(key)));
    }

    #[test]
    fn acknowledge_of_queued_key_is_not_found() {
        let mut fx = Fixture::new(QueueConfig::default());
        let key = fx.put("a", 1);
        assert!(matches!(fx.book.acknowledge(&key), Err(QueueError::NotFound(_))));
        assert_eq!(fx.book.state_of(&key), Some(TaskState::Queued));
    }

    #[test]
    fn update_keeps_single_record_and_fires_update() {
        let config = QueueConfig {
            auto_key: false,
            ..QueueConfig::default()
        };
        let mut fx = Fixture::new(config);
        fx.book.do_put(Admission::new("a").key("x").priority(5)).unwrap();
        fx.book.do_put(Admission::new("b").key("x").priority(1)).unwrap();

        assert_eq!(fx.book.size(), 1);
        let trace = fx.book.trace_of(&TaskKey::new("x")).unwrap();
        assert_eq!(trace.count(TraceOp::Put), 1);
        assert_eq!(trace.count(TraceOp::Update), 1);
        assert_eq!(fx.book.do_peek(None).unwrap().value, "b");
        assert_eq!(fx.events()[1].0, LifecycleEvent::Update);
    }

    #[test]
    fn retained_key_conflicts_and_update_only_needs_queued_key() {
        let config = QueueConfig {
            auto_key: false,
            ..QueueConfig::default()
        };
        let mut fx = Fixture::new(config);
        fx.book.do_put(Admission::new("a").key("x")).unwrap();
        fx.book.do_get(None).unwrap();

        let again = Admission::new("b").key("x");
        assert!(fx.book.contains(&again));
        assert_eq!(
            fx.book.do_put(again),
            Err(QueueError::KeyConflict(TaskKey::new("x")))
        );
        assert_eq!(
            fx.book.do_put(Admission::new("c").key("y").update_only()),
            Err(QueueError::NotFound(TaskKey::new("y")))
        );
    }

    #[test]
    fn drop_by_key_finalizes_with_drop() {
        let mut fx = Fixture::new(QueueConfig::default());
        let a = fx.put("a", 1);
        let b = fx.put("b", 2);

        let entry = fx.book.do_get(Some(&b)).unwrap();
        assert_eq!(entry.value, "b");
        assert_eq!(fx.book.state_of(&b), None);
        assert_eq!(fx.book.state_of(&a), Some(TaskState::Queued));
        assert_eq!(
            fx.book.do_get(Some(&b)),
            Err(QueueError::NotFound(b.clone()))
        );

        let last = fx.notices.lock().unwrap().pop().unwrap();
        assert_eq!(last.event, LifecycleEvent::Finalize);
        assert_eq!(last.reason, Some(FinalizeReason::Drop));
        assert_eq!(last.trace.unwrap().last_op(), Some(TraceOp::Drop));
    }

    #[test]
    fn without_retention_get_finalizes_ok() {
        let config = QueueConfig {
            use_retain: false,
            ..QueueConfig::default()
        };
        let mut fx = Fixture::new(config);
        let key = fx.put("a", 1);
        fx.book.do_get(None).unwrap();
        assert_eq!(fx.book.state_of(&key), None);
        assert_eq!(fx.book.retained_len(), 0);
        let last = fx.notices.lock().unwrap().pop().unwrap();
        assert_eq!(last.reason, Some(FinalizeReason::Ok));
    }

    #[test]
    fn full_retained_set_evicts_oldest_with_clean() {
        let config = QueueConfig {
            max_retain: 2,
            ..QueueConfig::default()
        };
        let mut fx = Fixture::new(config);
        let keys: Vec<_> = (0..3).map(|i| fx.put("v", i)).collect();
        for _ in 0..3 {
            fx.book.do_get(None).unwrap();
        }

        assert_eq!(fx.book.retained_len(), 2);
        assert_eq!(fx.book.state_of(&keys[0]), None);
        let cleaned: Vec<_> = fx
            .notices
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.reason == Some(FinalizeReason::Clean))
            .map(|n| n.key.clone())
            .collect();
        assert_eq!(cleaned, vec![keys[0].clone()]);
    }

    #[test]
    fn retry_timer_requeues_with_original_priority() {
        let config = QueueConfig {
            retry_after: Duration::from_millis(50),
            ..QueueConfig::default()
        };
        let mut fx = Fixture::new(config);
        let key = fx.put("a", 3);
        fx.put("b", 9);
        fx.book.do_get(None).unwrap();
        assert_eq!(fx.executor.armed(), vec![Duration::from_millis(50)]);

        let fired = fx.fire_timers();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].op, TimerOp::Retry);
        assert!(fx.book.requeue(&fired[0].key, fired[0].generation));

        assert_eq!(fx.book.state_of(&key), Some(TaskState::Queued));
        assert_eq!(fx.book.do_peek(None).unwrap().key, key);
        assert_eq!(fx.book.trace_of(&key).unwrap().count(TraceOp::Retry), 1);
        assert_eq!(fx.book.armed_timers(), 0);
    }

    #[test]
    fn stale_retry_after_ack_is_noop() {
        let config = QueueConfig {
            retry_after: Duration::from_millis(50),
            ..QueueConfig::default()
        };
        let mut fx = Fixture::new(config);
        let key = fx.put("a", 1);
        fx.book.do_get(None).unwrap();
        fx.book.acknowledge(&key).unwrap();

        // cancelled at finalize
        assert!(fx.executor.armed().is_empty());
        assert!(!fx.book.requeue(&key, 1));
        assert_eq!(fx.book.state_of(&key), None);
    }

    #[test]
    fn timeout_finalizes_queued_task_and_reports_freed_slot() {
        let mut fx = Fixture::new(QueueConfig::default());
        let key = fx
            .book
            .do_put(Admission::new("a").time_limit(Duration::from_millis(10)))
            .unwrap();

        let fired = fx.fire_timers();
        assert_eq!(fired[0].op, TimerOp::Timeout);
        assert!(fx.book.expire(&key, fired[0].generation));
        assert_eq!(fx.book.state_of(&key), None);

        let last = fx.notices.lock().unwrap().pop().unwrap();
        assert_eq!(last.reason, Some(FinalizeReason::Timeout));
        assert_eq!(last.trace.unwrap().last_op(), Some(TraceOp::Timeout));
    }

    #[test]
    fn timeout_wins_over_retained_task() {
        let config = QueueConfig {
            time_limit: Some(Duration::from_millis(10)),
            ..QueueConfig::default()
        };
        let mut fx = Fixture::new(config);
        let key = fx.put("a", 1);
        fx.book.do_get(None).unwrap();

        let fired = fx.fire_timers();
        // retained slot is not a queued slot
        assert!(!fx.book.expire(&key, fired[0].generation));
        assert_eq!(fx.book.state_of(&key), None);
        assert_eq!(fx.book.acknowledge(&key), Err(QueueError::NotFound(key)));
    }

    #[test]
    fn update_replaces_the_timeout_timer() {
        let config = QueueConfig {
            auto_key: false,
            ..QueueConfig::default()
        };
        let mut fx = Fixture::new(config);
        fx.book
            .do_put(Admission::new("a").key("x").time_limit(Duration::from_millis(10)))
            .unwrap();
        fx.book
            .do_put(Admission::new("b").key("x").time_limit(Duration::from_millis(20)))
            .unwrap();
        assert_eq!(fx.executor.armed(), vec![Duration::from_millis(20)]);

        fx.book.do_put(Admission::new("c").key("x")).unwrap();
        assert!(fx.executor.armed().is_empty());
        assert_eq!(fx.book.armed_timers(), 0);
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut fx = Fixture::new(QueueConfig::default());
        let key = fx.put("a", 1);
        assert!(fx.book.finalize(&key, true, FinalizeReason::Drop));
        assert!(!fx.book.finalize(&key, true, FinalizeReason::Drop));
        let finals = fx
            .events()
            .iter()
            .filter(|(e, _)| *e == LifecycleEvent::Finalize)
            .count();
        assert_eq!(finals, 1);
    }

    #[test]
    fn item_callback_runs_before_default() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut fx = Fixture::new(QueueConfig::default());
        let default_order = Arc::clone(&order);
        fx.book.update_default_callbacks(
            CallbackSet::new().on(LifecycleEvent::Put, move |_| {
                default_order.lock().unwrap().push("default")
            }),
        );
        let item_order = Arc::clone(&order);
        fx.book
            .do_put(Admission::new("a").on(LifecycleEvent::Put, move |_| {
                item_order.lock().unwrap().push("item")
            }))
            .unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["item", "default"]);
    }

    #[test]
    fn trace_disabled_hands_no_trace_to_finalize() {
        let config = QueueConfig {
            use_trace: false,
            use_retain: false,
            ..QueueConfig::default()
        };
        let mut fx = Fixture::new(config);
        let key = fx.put("a", 1);
        assert!(fx.book.trace_of(&key).is_none());
        fx.book.do_get(None).unwrap();
        let last = fx.notices.lock().unwrap().pop().unwrap();
        assert_eq!(last.reason, Some(FinalizeReason::Ok));
        assert!(last.trace.is_none());
    }
}
