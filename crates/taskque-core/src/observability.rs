use serde::{Deserialize, Serialize};

/// Point-in-time view of a task queue, taken under the queue mutex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Items waiting in the priority map.
    pub queued: usize,

    /// Items handed out and awaiting acknowledgment.
    pub retained: usize,

    /// Keys with at least one outstanding timeout/retry timer.
    pub armed_timers: usize,

    /// Total successful puts (updates excluded).
    pub puts: u64,

    /// Total successful gets (including drops).
    pub gets: u64,
}

impl QueueCounts {
    /// Live tasks: queued plus retained.
    pub fn live(&self) -> usize {
        self.queued + self.retained
    }
}
