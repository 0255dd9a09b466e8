//! Trace - タスクごとの操作履歴
//!
//! `use_trace` が有効なときだけ記録される。最初の admit で作成され、
//! finalize で取り外されて finalize コールバックに渡される。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation recorded in a task trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceOp {
    Put,
    Update,
    Get,
    Drop,
    Accept,
    Retry,
    Timeout,
}

/// Why a task left the queue for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeReason {
    /// Acknowledged, or retrieved with retention disabled.
    Ok,
    /// Removed by key.
    Drop,
    /// Time limit elapsed.
    Timeout,
    /// Evicted from a full retained set.
    Clean,
}

impl fmt::Display for FinalizeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FinalizeReason::Ok => "ok",
            FinalizeReason::Drop => "drop",
            FinalizeReason::Timeout => "timeout",
            FinalizeReason::Clean => "clean",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub op: TraceOp,
    pub at: DateTime<Utc>,
}

/// Ordered operation log of a single task.
///
/// `msg` stays `None` ("unfinished") until the task is finalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTrace {
    entries: Vec<TraceEntry>,
    last_op: Option<TraceOp>,
    msg: Option<FinalizeReason>,
}

impl TaskTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, op: TraceOp, at: DateTime<Utc>) {
        self.entries.push(TraceEntry { op, at });
        self.last_op = Some(op);
    }

    pub fn finish(&mut self, reason: FinalizeReason) {
        self.msg = Some(reason);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn last_op(&self) -> Option<TraceOp> {
        self.last_op
    }

    pub fn reason(&self) -> Option<FinalizeReason> {
        self.msg
    }

    pub fn is_finished(&self) -> bool {
        self.msg.is_some()
    }

    /// Number of times `op` was recorded.
    pub fn count(&self, op: TraceOp) -> usize {
        self.entries.iter().filter(|e| e.op == op).count()
    }

    /// Timestamp of the most recent `op`.
    pub fn last_at(&self, op: TraceOp) -> Option<DateTime<Utc>> {
        self.entries.iter().rev().find(|e| e.op == op).map(|e| e.at)
    }
}
