//! Ports - 抽象化レイヤー
//!
//! キュー本体が外部に依存する部分（コールバック実行、時刻、キー生成）を
//! trait として切り出す。実装は `impls` にある。

pub mod clock;
pub mod executor;
pub mod key_generator;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::executor::{Executor, Job, TimerToken};
pub use self::key_generator::{KeyGenerator, SequentialKeys, UlidKeys};
