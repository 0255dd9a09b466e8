//! Domain model (keys, task entries, admissions, traces, callbacks).

pub mod callbacks;
pub mod key;
pub mod task;
pub mod trace;

pub use callbacks::{Callback, CallbackSet, LifecycleEvent, TaskNotice};
pub use key::TaskKey;
pub use task::{Admission, TaskEntry};
pub use trace::{FinalizeReason, TaskTrace, TraceEntry, TraceOp};

pub(crate) use task::Rank;
