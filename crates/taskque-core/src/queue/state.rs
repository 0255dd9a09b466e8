//! Where a live task currently sits.

use serde::{Deserialize, Serialize};

/// Task state.
///
/// State transitions:
/// - Queued -> Retained (retrieve with retention)
/// - Retained -> Queued (retry)
/// - Queued | Retained -> finalized (ack, drop, timeout, eviction); no state
///   is kept for finalized tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting in the priority map.
    Queued,

    /// Handed to a consumer, awaiting acknowledgment.
    Retained,
}
