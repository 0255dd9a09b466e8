//! taskque-core
//!
//! Concurrent priority task queue with lifecycle management.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（TaskKey, Admission, TaskEntry, TaskTrace, CallbackSet）
//! - **ports**: 抽象化レイヤー（Executor, Clock, KeyGenerator）
//! - **impls**: 実装（TokioExecutor）
//! - **queue**: QueueCore（待機・容量・レート制限）、PriorityMap、PriorityDict、TaskQueue
//! - **config**: QueueConfig / SpeedLimit（serde で JSON から読める）
//! - **error**: QueueError
//! - **observability**: QueueCounts

pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use config::{ConfigError, QueueConfig, SpeedLimit};
pub use domain::{
    Admission, CallbackSet, FinalizeReason, LifecycleEvent, TaskEntry, TaskKey, TaskNotice,
    TaskTrace, TraceOp,
};
pub use error::QueueError;
pub use observability::QueueCounts;
pub use queue::{
    BuildError, PriorityDict, TaskQueue, TaskQueueBuilder, TaskState, WaitOptions,
};
