//! Queue module: blocking core, priority map, and the task registry on top.
//!
//! Layering, leaf-first:
//! - `PriorityMap`: key -> (value, priority), FIFO among equal priorities
//! - `QueueCore`: capacity, blocking, rate limiting, freeze (task-agnostic)
//! - `PriorityDict`: `QueueCore` over a bare `PriorityMap`, no task lifecycle
//! - `TaskBook`: task records, retention, traces, timers, callbacks
//! - `TaskQueue`: the shareable handle, built by `TaskQueueBuilder`

mod blocking;
mod book;
mod builder;
mod keyed;
mod priority_map;
mod rate;
mod record;
mod registry;
mod state;
mod timer;


pub use self::blocking::{FrozenScope, QueueBackend, QueueCore, WaitOptions};
pub use self::book::TaskBook;
pub use self::builder::{BuildError, TaskQueueBuilder};
pub use self::keyed::PriorityDict;
pub use self::priority_map::PriorityMap;
pub use self::registry::TaskQueue;
pub use self::state::TaskState;
