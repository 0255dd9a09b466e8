//! Executor port - コールバックとタイマーの実行基盤
//!
//! キュー本体はコールバックを直接呼ばず、必ず Executor に渡す。
//! これによりコールバックはキューのロックの外で実行される。

use std::time::Duration;

/// A unit of work handed to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Cancellation handle for a delayed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

impl TimerToken {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Executor は job を呼び出し元とは非同期に実行する
///
/// # 契約
/// - `run_now` / `run_after` は呼び出し元をブロックしない
/// - 同じ `lane` に渡した `run_now` の job は、投入順に一つずつ実行される
///   （異なる lane 同士の順序は保証しない）
/// - job 内の panic は Executor が捕捉してログに残す（呼び出し元には伝播しない）
/// - `cancel` は best-effort。発火済み・キャンセル済みの token に対しては何もしない
pub trait Executor: Send + Sync {
    fn run_now(&self, lane: u64, job: Job);

    fn run_after(&self, delay: Duration, job: Job) -> TimerToken;

    fn cancel(&self, token: TimerToken);
}
