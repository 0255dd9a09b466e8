//! Sliding-window bookkeeping for one side (put or get) of the queue core.

use std::time::{Duration, Instant};

/// When a waiter may next proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Gate {
    Open,
    At(Instant),
    /// The eligibility instant is beyond what `Instant` can represent.
    Never,
}

impl Gate {
    /// `at + by`, saturating to `Never`.
    pub(crate) fn after(at: Instant, by: Duration) -> Self {
        at.checked_add(by).map_or(Gate::Never, Gate::At)
    }

    /// The later of two gates.
    pub(crate) fn and(self, other: Gate) -> Self {
        match (self, other) {
            (Gate::Never, _) | (_, Gate::Never) => Gate::Never,
            (Gate::Open, gate) | (gate, Gate::Open) => gate,
            (Gate::At(a), Gate::At(b)) => Gate::At(a.max(b)),
        }
    }

    /// `Open` if the gate has already opened by `now`.
    pub(crate) fn settle(self, now: Instant) -> Self {
        match self {
            Gate::At(at) if at <= now => Gate::Open,
            gate => gate,
        }
    }
}

/// Ring of the last `max_ops` operation instants, plus the most recent one.
///
/// With `max_ops` operations allowed per window, the next operation may start
/// once the oldest recorded instant has left the window.
#[derive(Debug, Clone)]
pub(crate) struct RateWindow {
    stamps: Vec<Option<Instant>>,
    next: usize,
    last: Option<Instant>,
}

impl RateWindow {
    pub(crate) fn new(max_ops: usize) -> Self {
        Self {
            stamps: vec![None; max_ops.max(1)],
            next: 0,
            last: None,
        }
    }

    /// Same window with a different capacity; only the most recent instant
    /// carries over.
    pub(crate) fn resized(&self, max_ops: usize) -> Self {
        let mut window = Self::new(max_ops);
        if let Some(last) = self.last {
            let tail = window.stamps.len() - 1;
            window.stamps[tail] = Some(last);
            window.last = Some(last);
        }
        window
    }

    /// Earliest instant at which another operation fits in `window`.
    pub(crate) fn next_free(&self, window: Duration) -> Gate {
        match self.stamps[self.next] {
            Some(oldest) => Gate::after(oldest, window),
            None => Gate::Open,
        }
    }

    /// Record an operation. `limited` controls whether it occupies a slot of
    /// the ring; the most recent instant is always kept.
    pub(crate) fn record(&mut self, at: Instant, limited: bool) {
        if limited {
            self.stamps[self.next] = Some(at);
            self.next = (self.next + 1) % self.stamps.len();
        }
        self.last = Some(at);
    }

    pub(crate) fn last(&self) -> Option<Instant> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    #[test]
    fn empty_window_is_free() {
        let window = RateWindow::new(2);
        assert_eq!(window.next_free(WINDOW), Gate::Open);
        assert_eq!(window.last(), None);
    }

    #[test]
    fn full_ring_waits_for_oldest() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(10);
        let mut window = RateWindow::new(2);

        window.record(t0, true);
        // one slot still unused
        assert_eq!(window.next_free(WINDOW), Gate::Open);

        window.record(t1, true);
        assert_eq!(window.next_free(WINDOW), Gate::At(t0 + WINDOW));

        window.record(t0 + WINDOW, true);
        assert_eq!(window.next_free(WINDOW), Gate::At(t1 + WINDOW));
        assert_eq!(window.last(), Some(t0 + WINDOW));
    }

    #[test]
    fn unlimited_records_only_track_last() {
        let t0 = Instant::now();
        let mut window = RateWindow::new(0);
        window.record(t0, false);
        assert_eq!(window.next_free(WINDOW), Gate::Open);
        assert_eq!(window.last(), Some(t0));
    }

    #[test]
    fn resize_keeps_last_instant() {
        let t0 = Instant::now();
        let mut window = RateWindow::new(3);
        window.record(t0, true);

        let resized = window.resized(1);
        assert_eq!(resized.last(), Some(t0));
        assert_eq!(resized.next_free(WINDOW), Gate::At(t0 + WINDOW));
    }

    #[test]
    fn huge_window_never_frees() {
        let mut window = RateWindow::new(1);
        window.record(Instant::now(), true);
        assert_eq!(window.next_free(Duration::MAX), Gate::Never);
    }

    #[test]
    fn gate_takes_the_later_instant() {
        let t0 = Instant::now();
        let t1 = t0 + WINDOW;
        assert_eq!(Gate::At(t0).and(Gate::At(t1)), Gate::At(t1));
        assert_eq!(Gate::Open.and(Gate::At(t0)), Gate::At(t0));
        assert_eq!(Gate::At(t1).and(Gate::Never), Gate::Never);
        assert_eq!(Gate::At(t0).settle(t1), Gate::Open);
        assert_eq!(Gate::At(t1).settle(t0), Gate::At(t1));
        assert_eq!(Gate::Never.settle(t1), Gate::Never);
    }
}
