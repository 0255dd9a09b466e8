//! Timer commands and the per-key table of armed timers.

use crate::domain::TaskKey;
use crate::ports::TimerToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TimerOp {
    /// Time limit elapsed; finalize with `timeout`.
    Timeout,
    /// Retained too long without acknowledgment; re-queue.
    Retry,
}

/// Payload of a delayed job. The job itself only holds a weak link to the
/// registry and forwards this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TimerCommand {
    pub op: TimerOp,
    pub key: TaskKey,
    /// Matches [`Armed::generation`] while the timer is still the current one.
    pub generation: u64,
}

/// Receiver of fired timers.
pub(crate) trait TimerSink: Send + Sync {
    fn fire(&self, command: TimerCommand);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Armed {
    pub token: TimerToken,
    pub generation: u64,
}

/// Outstanding timers of one key.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ArmedTimers {
    timeout: Option<Armed>,
    retry: Option<Armed>,
}

impl ArmedTimers {
    pub fn slot_mut(&mut self, op: TimerOp) -> &mut Option<Armed> {
        match op {
            TimerOp::Timeout => &mut self.timeout,
            TimerOp::Retry => &mut self.retry,
        }
    }

    /// Clear `op` if `generation` is the one armed. A stale or cancelled
    /// timer returns `false`.
    pub fn take(&mut self, op: TimerOp, generation: u64) -> bool {
        let slot = self.slot_mut(op);
        if slot.is_some_and(|armed| armed.generation == generation) {
            *slot = None;
            true
        } else {
            false
        }
    }

    pub fn tokens(&self) -> impl Iterator<Item = TimerToken> {
        [self.timeout, self.retry]
            .into_iter()
            .flatten()
            .map(|armed| armed.token)
    }

    pub fn is_empty(&self) -> bool {
        self.timeout.is_none() && self.retry.is_none()
    }
}
