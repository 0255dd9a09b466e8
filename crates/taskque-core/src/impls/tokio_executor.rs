//! TokioExecutor - tokio ランタイム上の Executor 実装
//!
//! # 実装詳細
//! - `run_now` の job は lane ごとの mpsc チャネルに積み、lane 専用の
//!   blocking スレッドが投入順に一つずつ実行する（キューの std Mutex を
//!   取るため、async ワーカーを塞がない）
//! - 遅延実行は `tokio::time::sleep` 後に job を `spawn_blocking` で起動する
//! - token → AbortHandle の表でキャンセルを管理する
//! - job の panic は捕捉して warn ログに残す

use std::collections::HashMap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::warn;

use crate::ports::{Executor, Job, TimerToken};

type TimerTable = Arc<Mutex<HashMap<TimerToken, AbortHandle>>>;

/// Executor backed by a tokio runtime, either owned or borrowed.
///
/// # 使用例
/// ```ignore
/// // 専用ランタイムを持つ（2 lane）
/// let executor = TokioExecutor::new(2)?;
///
/// // 既存ランタイムに相乗りする（time driver が有効であること、1 lane）
/// let executor = TokioExecutor::from_handle(Handle::current());
/// ```
pub struct TokioExecutor {
    handle: Handle,
    lanes: Vec<mpsc::UnboundedSender<Job>>,
    timers: TimerTable,
    next_token: AtomicU64,
    // dropped last: the lanes above must close before the runtime goes away
    _runtime: Option<OwnedRuntime>,
}

impl TokioExecutor {
    /// Build a dedicated runtime with `workers` ordered callback lanes.
    pub fn new(workers: usize) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("taskque-exec")
            .enable_time()
            .build()?;
        let handle = runtime.handle().clone();
        Ok(Self {
            lanes: spawn_lanes(&handle, workers),
            handle,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_token: AtomicU64::new(1),
            _runtime: Some(OwnedRuntime(Some(runtime))),
        })
    }

    /// Run on an existing runtime with a single callback lane. The runtime
    /// must have the time driver enabled.
    pub fn from_handle(handle: Handle) -> Self {
        Self::from_handle_with_lanes(handle, 1)
    }

    pub fn from_handle_with_lanes(handle: Handle, lanes: usize) -> Self {
        Self {
            lanes: spawn_lanes(&handle, lanes),
            handle,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_token: AtomicU64::new(1),
            _runtime: None,
        }
    }

    pub fn lanes(&self) -> usize {
        self.lanes.len()
    }

    /// Delayed jobs that have neither fired nor been cancelled.
    pub fn pending_timers(&self) -> usize {
        lock(&self.timers).len()
    }
}

impl Executor for TokioExecutor {
    fn run_now(&self, lane: u64, job: Job) {
        let index = (lane % self.lanes.len() as u64) as usize;
        if self.lanes[index].send(job).is_err() {
            warn!(lane = index, "executor lane closed; job dropped");
        }
    }

    fn run_after(&self, delay: Duration, job: Job) -> TimerToken {
        let token = TimerToken::new(self.next_token.fetch_add(1, Ordering::Relaxed));
        let timers = Arc::clone(&self.timers);

        // Insert before the task can look itself up.
        let mut table = lock(&self.timers);
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let armed = lock(&timers).remove(&token).is_some();
            if !armed {
                // cancelled between wake-up and here
                return;
            }
            if let Err(err) = tokio::task::spawn_blocking(job).await
                && err.is_panic()
            {
                warn!(error = %err, "executor job panicked");
            }
        });
        table.insert(token, task.abort_handle());
        token
    }

    fn cancel(&self, token: TimerToken) {
        if let Some(handle) = lock(&self.timers).remove(&token) {
            handle.abort();
        }
    }
}

/// One blocking drain thread per lane; each exits once its sender is dropped.
fn spawn_lanes(handle: &Handle, count: usize) -> Vec<mpsc::UnboundedSender<Job>> {
    (0..count.max(1))
        .map(|lane| {
            let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
            handle.spawn_blocking(move || {
                while let Some(job) = rx.blocking_recv() {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        warn!(lane, "executor job panicked");
                    }
                }
            });
            tx
        })
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owned runtime that may be dropped from inside one of its own threads
/// (the last queue handle can live in a callback).
struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}
