//! TaskQueueBuilder - タスクキューの構築とワイヤリング
//!
//! # 役割
//! - QueueConfig と注入された ports（Executor / Clock / KeyGenerator）を結線する
//! - 起動時検証（Fail-fast 設計）: 不正な設定は build() で弾く

use std::io;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::debug;

use super::blocking::QueueCore;
use super::book::{BookPorts, BookSettings, TaskBook};
use super::registry::{Shared, TaskQueue};
use super::timer::TimerSink;
use crate::config::{ConfigError, QueueConfig, SpeedLimit};
use crate::domain::CallbackSet;
use crate::impls::TokioExecutor;
use crate::ports::{Clock, Executor, KeyGenerator, SequentialKeys, SystemClock};

/// TaskQueueBuilder はタスクキューを構築する
///
/// # 使用例
/// ```ignore
/// let queue: TaskQueue<String, u8> = TaskQueueBuilder::new()
///     .max_size(100)
///     .retry_after(Duration::from_secs(30))
///     .build()?;
/// ```
///
/// 何も注入しなければ、1 lane の専用 TokioExecutor、SystemClock、
/// 連番キー（"0", "1", ...）が使われる。
pub struct TaskQueueBuilder<V, P> {
    config: QueueConfig,
    executor: Option<Arc<dyn Executor>>,
    clock: Option<Arc<dyn Clock>>,
    keys: Option<Arc<dyn KeyGenerator>>,
    default_callbacks: CallbackSet<V, P>,
    workers: usize,
}

/// BuildError はキュー構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start executor runtime: {0}")]
    Executor(#[from] io::Error),
}

impl<V, P> TaskQueueBuilder<V, P> {
    pub fn new() -> Self {
        Self {
            config: QueueConfig::default(),
            executor: None,
            clock: None,
            keys: None,
            default_callbacks: CallbackSet::new(),
            workers: 1,
        }
    }

    /// Replace every option at once (e.g. with a config loaded from JSON).
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Capacity of the queued set; 0 means unbounded.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.config.max_size = max_size;
        self
    }

    pub fn speed_limit(mut self, speed: SpeedLimit) -> Self {
        self.config.speed_limit = speed;
        self
    }

    pub fn auto_key(mut self, enabled: bool) -> Self {
        self.config.auto_key = enabled;
        self
    }

    pub fn use_retain(mut self, enabled: bool) -> Self {
        self.config.use_retain = enabled;
        self
    }

    pub fn use_trace(mut self, enabled: bool) -> Self {
        self.config.use_trace = enabled;
        self
    }

    pub fn max_retain(mut self, max_retain: usize) -> Self {
        self.config.max_retain = max_retain;
        self
    }

    pub fn retry_after(mut self, delay: Duration) -> Self {
        self.config.retry_after = delay;
        self
    }

    pub fn time_limit(mut self, limit: Duration) -> Self {
        self.config.time_limit = Some(limit);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn key_generator(mut self, keys: Arc<dyn KeyGenerator>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn default_callbacks(mut self, callbacks: CallbackSet<V, P>) -> Self {
        self.default_callbacks = callbacks;
        self
    }

    /// Callback lanes of the owned executor. Notices of one task always share
    /// a lane. Ignored when an executor is injected.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

impl<V, P> TaskQueueBuilder<V, P>
where
    V: Clone + Send + Sync + 'static,
    P: Ord + Clone + Send + Sync + 'static,
{
    /// 設定を検証してキューを生成
    ///
    /// # 検証
    /// - QueueConfig::validate() に失敗すれば BuildError::Config
    /// - 専用ランタイムが起動できなければ BuildError::Executor
    pub fn build(self) -> Result<TaskQueue<V, P>, BuildError> {
        self.config.validate()?;

        let executor = match self.executor {
            Some(executor) => executor,
            None => Arc::new(TokioExecutor::new(self.workers)?) as Arc<dyn Executor>,
        };
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let keys = self
            .keys
            .unwrap_or_else(|| Arc::new(SequentialKeys::new()) as Arc<dyn KeyGenerator>);

        let config = self.config;
        let defaults = self.default_callbacks;
        let shared = Arc::new_cyclic(|weak: &Weak<Shared<V, P>>| {
            let sink: Weak<dyn TimerSink> = weak.clone();
            let ports = BookPorts {
                executor,
                clock,
                keys,
                sink,
            };
            let book = TaskBook::new(BookSettings::from(&config), defaults, ports);
            Shared {
                core: QueueCore::new(book, config.max_size, config.speed_limit),
                auto_key: config.auto_key,
            }
        });

        debug!(
            max_size = config.max_size,
            use_retain = config.use_retain,
            retry_after_ms = config.retry_after.as_millis() as u64,
            "task queue built"
        );
        Ok(TaskQueue::from_shared(shared))
    }
}

impl<V, P> Default for TaskQueueBuilder<V, P> {
    fn default() -> Self {
        Self::new()
    }
}
