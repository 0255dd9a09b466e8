//! Queue core: capacity, blocking, rate limiting and wait-free admission.
//!
//! The core knows nothing about tasks. It guards a [`QueueBackend`] with one
//! mutex and two condition variables (`not_full`, `not_empty`) and decides
//! *when* a put or get may proceed; the backend decides *what* happens.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::rate::{Gate, RateWindow};
use crate::config::SpeedLimit;
use crate::error::QueueError;

/// Storage driven by [`QueueCore`]. Every method runs with the core mutex held.
pub trait QueueBackend {
    type Item;
    type Key;
    type Output;

    /// Number of queued items (what capacity is measured against).
    fn size(&self) -> usize;

    /// Whether `item` would update an entry in place rather than add one.
    fn contains(&self, item: &Self::Item) -> bool;

    fn do_put(&mut self, item: Self::Item) -> Result<Self::Key, QueueError>;

    fn do_get(&mut self, key: Option<&Self::Key>) -> Result<Self::Output, QueueError>;

    fn do_peek(&self, key: Option<&Self::Key>) -> Result<Self::Output, QueueError>;
}

/// How a put/get/peek waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Wait for capacity (put) or items (get). `false` fails immediately.
    pub block: bool,

    /// Overall deadline for the call, measured from entry.
    pub timeout: Option<Duration>,

    /// Only proceed once no put (resp. get) has happened for this long.
    /// Ignored by non-blocking calls and by peek.
    pub wait_free: Option<Duration>,
}

impl WaitOptions {
    pub fn blocking() -> Self {
        Self {
            block: true,
            timeout: None,
            wait_free: None,
        }
    }

    pub fn nowait() -> Self {
        Self {
            block: false,
            ..Self::blocking()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn wait_free(mut self, idle: Duration) -> Self {
        self.wait_free = Some(idle);
        self
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::blocking()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Put,
    Get,
}

impl Side {
    fn unavailable(self) -> QueueError {
        match self {
            Side::Put => QueueError::Full,
            Side::Get => QueueError::Empty,
        }
    }
}

pub(crate) struct CoreState<B> {
    pub(crate) backend: B,
    frozen: bool,
    /// Live [`FrozenScope`] guards.
    scopes: usize,
    speed: SpeedLimit,
    puts: RateWindow,
    gets: RateWindow,
    put_count: u64,
    get_count: u64,
}

impl<B> CoreState<B> {
    /// `(puts, gets)` completed so far.
    pub(crate) fn op_counts(&self) -> (u64, u64) {
        (self.put_count, self.get_count)
    }

    fn is_frozen(&self) -> bool {
        self.frozen || self.scopes > 0
    }

    fn window(&self, side: Side) -> &RateWindow {
        match side {
            Side::Put => &self.puts,
            Side::Get => &self.gets,
        }
    }

    fn rate_window(&self, side: Side) -> Option<Duration> {
        match side {
            Side::Put => self.speed.put_window(),
            Side::Get => self.speed.get_window(),
        }
    }

    fn record(&mut self, side: Side, at: Instant) {
        let limited = self.rate_window(side).is_some();
        match side {
            Side::Put => {
                self.puts.record(at, limited);
                self.put_count += 1;
            }
            Side::Get => {
                self.gets.record(at, limited);
                self.get_count += 1;
            }
        }
    }
}

/// Generic blocking queue engine.
pub struct QueueCore<B> {
    state: Mutex<CoreState<B>>,
    not_full: Condvar,
    not_empty: Condvar,
    max_size: usize,
}

impl<B: QueueBackend> QueueCore<B> {
    pub fn new(backend: B, max_size: usize, speed: SpeedLimit) -> Self {
        Self {
            state: Mutex::new(CoreState {
                backend,
                frozen: false,
                scopes: 0,
                puts: RateWindow::new(speed.max_puts),
                gets: RateWindow::new(speed.max_gets),
                speed,
                put_count: 0,
                get_count: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            max_size,
        }
    }

    /// Add (or update in place) an item.
    ///
    /// Updates bypass capacity, waiting and rate limiting entirely.
    pub fn put(&self, item: B::Item, opts: WaitOptions) -> Result<B::Key, QueueError> {
        let deadline = deadline_of(&opts);
        let mut state = self.lock();
        if state.backend.contains(&item) {
            return state.backend.do_put(item);
        }

        state = self.wait_turn(state, Side::Put, &opts, deadline, true)?;
        let key = state.backend.do_put(item)?;
        state.record(Side::Put, Instant::now());
        drop(state);

        self.not_empty.notify_all();
        Ok(key)
    }

    /// Remove the next item, or the item under `key`.
    pub fn get(&self, key: Option<&B::Key>, opts: WaitOptions) -> Result<B::Output, QueueError> {
        let deadline = deadline_of(&opts);
        let mut state = self.lock();

        state = self.wait_turn(state, Side::Get, &opts, deadline, true)?;
        let out = state.backend.do_get(key)?;
        state.record(Side::Get, Instant::now());
        let has_room = self.has_room(&state.backend);
        drop(state);

        if has_room {
            self.not_full.notify_all();
        }
        Ok(out)
    }

    /// Look at the next item (or `key`) without removing it.
    pub fn peek(&self, key: Option<&B::Key>, opts: WaitOptions) -> Result<B::Output, QueueError> {
        let deadline = deadline_of(&opts);
        let opts = WaitOptions {
            wait_free: None,
            ..opts
        };
        let state = self.wait_turn(self.lock(), Side::Get, &opts, deadline, false)?;
        state.backend.do_peek(key)
    }

    /// Make blocking calls fail fast with `Timeout`; current waiters are woken.
    pub fn freeze(&self) {
        self.lock().frozen = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Clear a [`freeze`](Self::freeze). Live frozen scopes keep the queue
    /// frozen until the last of them is dropped.
    pub fn unfreeze(&self) {
        self.lock().frozen = false;
    }

    pub fn is_frozen(&self) -> bool {
        self.lock().is_frozen()
    }

    /// Freeze until the returned guard is dropped. Scopes nest: the queue
    /// stays frozen while any of them is alive.
    pub fn frozen_scope(&self) -> FrozenScope<'_, B> {
        self.lock().scopes += 1;
        self.not_full.notify_all();
        self.not_empty.notify_all();
        FrozenScope { core: self }
    }

    /// Replace the rate limits. Only the latest put/get instants carry over.
    pub fn set_speed_limit(&self, speed: SpeedLimit) {
        let mut state = self.lock();
        state.puts = state.puts.resized(speed.max_puts);
        state.gets = state.gets.resized(speed.max_gets);
        state.speed = speed;
        drop(state);
        // waiters may be sleeping on the old window
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn speed_limit(&self) -> SpeedLimit {
        self.lock().speed
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Items counted against capacity.
    pub fn len(&self) -> usize {
        self.lock().backend.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(puts, gets)` completed so far.
    pub fn op_counts(&self) -> (u64, u64) {
        self.lock().op_counts()
    }

    /// Run `f` on the backend under the core mutex.
    pub(crate) fn with_backend<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut self.lock().backend)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, CoreState<B>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn notify_not_full(&self) {
        self.not_full.notify_all();
    }

    pub(crate) fn notify_not_empty(&self) {
        self.not_empty.notify_all();
    }

    fn has_room(&self, backend: &B) -> bool {
        self.max_size == 0 || backend.size() < self.max_size
    }

    fn ready(&self, state: &CoreState<B>, side: Side) -> bool {
        match side {
            Side::Put => self.has_room(&state.backend),
            Side::Get => state.backend.size() > 0,
        }
    }

    /// Wait until `side` may proceed, returning the re-acquired guard.
    ///
    /// Three preconditions gate the call: capacity (or items), the wait-free
    /// idle period since the last operation on this side, and a free slot in
    /// the rate window. All three share the one `deadline`.
    fn wait_turn<'a>(
        &'a self,
        mut state: MutexGuard<'a, CoreState<B>>,
        side: Side,
        opts: &WaitOptions,
        deadline: Option<Instant>,
        throttled: bool,
    ) -> Result<MutexGuard<'a, CoreState<B>>, QueueError> {
        let condvar = match side {
            Side::Put => &self.not_full,
            Side::Get => &self.not_empty,
        };

        loop {
            if opts.block && state.is_frozen() {
                return Err(QueueError::Timeout);
            }
            let ready = self.ready(&state, side);
            if !ready && !opts.block {
                return Err(side.unavailable());
            }

            let now = Instant::now();
            let mut gate = Gate::Open;
            if opts.block
                && let Some(idle) = opts.wait_free
                && let Some(last) = state.window(side).last()
            {
                gate = gate.and(Gate::after(last, idle));
            }
            if throttled && let Some(window) = state.rate_window(side) {
                gate = gate.and(state.window(side).next_free(window));
            }
            let gate = gate.settle(now);

            if ready && gate == Gate::Open {
                return Ok(state);
            }

            if let Some(deadline) = deadline {
                if now >= deadline {
                    return Err(if ready {
                        QueueError::Timeout
                    } else {
                        side.unavailable()
                    });
                }
                // Preconditions only move later, so a gate past the deadline
                // cannot open in time.
                let too_late = match gate {
                    Gate::Open => false,
                    Gate::At(at) => at > deadline,
                    Gate::Never => true,
                };
                if ready && too_late {
                    return Err(QueueError::Timeout);
                }
            }

            let wake = match (gate, deadline) {
                (Gate::At(at), Some(deadline)) => Some(at.min(deadline)),
                (Gate::At(at), None) => Some(at),
                (_, deadline) => deadline,
            };
            state = match wake {
                Some(wake) => {
                    condvar
                        .wait_timeout(state, wake.saturating_duration_since(now))
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => condvar.wait(state).unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}

/// Guard returned by [`QueueCore::frozen_scope`]; unfreezes on drop.
pub struct FrozenScope<'a, B: QueueBackend> {
    core: &'a QueueCore<B>,
}

impl<B: QueueBackend> Drop for FrozenScope<'_, B> {
    fn drop(&mut self) {
        let mut state = self.core.lock();
        state.scopes = state.scopes.saturating_sub(1);
    }
}

/// Absolute deadline for `opts`; a timeout too large to represent means none.
fn deadline_of(opts: &WaitOptions) -> Option<Instant> {
    opts.timeout.and_then(|t| Instant::now().checked_add(t))
}
