//! taskque CLI - producer/consumer demo session
//!
//! Builds a task queue from an optional JSON config, admits `--tasks` tasks,
//! and drains them with `--workers` blocking consumers that acknowledge a
//! share of what they retrieve. Finalize notices and the final counts are
//! printed to stdout as JSON lines; logs go to stderr.

use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use taskque_core::impls::TokioExecutor;
use taskque_core::{
    Admission, CallbackSet, FinalizeReason, LifecycleEvent, QueueConfig, QueueCounts, TaskKey,
    TaskQueue, TaskQueueBuilder, TraceOp, WaitOptions,
};

#[derive(Parser)]
#[command(name = "taskque")]
#[command(
    about = "Run a producer/consumer session against a priority task queue",
    long_about = None
)]
struct Args {
    /// Queue config as JSON (durations in milliseconds)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of tasks to admit
    #[arg(long, default_value = "20")]
    tasks: u64,

    /// Number of consumer threads
    #[arg(long, default_value = "2")]
    workers: usize,

    /// Share of first deliveries that get acknowledged (0.0..=1.0)
    #[arg(long, default_value = "0.8")]
    ack_ratio: f64,
}

/// One JSON line per finalized task.
#[derive(Serialize)]
struct FinalizeLine {
    key: TaskKey,
    value: u64,
    priority: Option<u8>,
    reason: Option<FinalizeReason>,
    ops: Vec<TraceOp>,
}

#[derive(Serialize)]
struct SummaryLine {
    counts: QueueCounts,
}

fn init_logging() {
    // defaults to INFO if RUST_LOG is not set
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<QueueConfig, Box<dyn Error>> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Ok(QueueConfig::from_json_str(&text)?)
        }
        None => Ok(QueueConfig {
            retry_after: Duration::from_millis(200),
            time_limit: Some(Duration::from_secs(10)),
            ..QueueConfig::default()
        }),
    }
}

fn print_finalize() -> CallbackSet<u64, u8> {
    CallbackSet::new().on(LifecycleEvent::Finalize, |notice| {
        let line = FinalizeLine {
            ops: notice
                .trace
                .map(|trace| trace.entries().iter().map(|e| e.op).collect())
                .unwrap_or_default(),
            key: notice.key,
            value: notice.value,
            priority: notice.priority,
            reason: notice.reason,
        };
        match serde_json::to_string(&line) {
            Ok(json) => println!("{json}"),
            Err(err) => warn!(error = %err, "failed to encode finalize notice"),
        }
    })
}

fn should_ack(value: u64, ack_ratio: f64) -> bool {
    ((value % 100) as f64) < ack_ratio * 100.0
}

/// Blocking consumer: retrieve, then acknowledge first deliveries by ratio and
/// every redelivery.
fn consume(queue: TaskQueue<u64, u8>, producing: Arc<AtomicBool>, ack_ratio: f64, retries: bool) {
    loop {
        match queue.retrieve(WaitOptions::blocking().timeout(Duration::from_millis(300))) {
            Ok(task) => {
                let redelivered = queue
                    .trace(&task.key)
                    .is_some_and(|trace| trace.count(TraceOp::Retry) > 0);
                if redelivered || should_ack(task.value, ack_ratio) {
                    if let Err(err) = queue.acknowledge(&task.key) {
                        // timed out or evicted in the meantime
                        debug!(key = %task.key, error = %err, "acknowledge skipped");
                    }
                } else {
                    debug!(key = %task.key, "leaving task unacknowledged");
                }
            }
            Err(err) if err.is_transient() => {
                let idle = !producing.load(Ordering::Acquire) && queue.is_empty();
                if idle && (!retries || queue.retained_len() == 0) {
                    return;
                }
            }
            Err(err) => {
                warn!(error = %err, "retrieve failed");
                return;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging();
    let args = Args::parse();

    if !(0.0..=1.0).contains(&args.ack_ratio) {
        return Err(format!("--ack-ratio must be within 0.0..=1.0, got {}", args.ack_ratio).into());
    }

    let config = load_config(args.config.as_ref())?;
    let retries = config.retry_delay().is_some();
    info!(
        tasks = args.tasks,
        workers = args.workers,
        max_size = config.max_size,
        retries,
        "starting session"
    );

    let queue: TaskQueue<u64, u8> = TaskQueueBuilder::new()
        .config(config)
        .executor(Arc::new(TokioExecutor::from_handle(Handle::current())))
        .default_callbacks(print_finalize())
        .build()?;

    let producing = Arc::new(AtomicBool::new(true));
    let consumers: Vec<_> = (0..args.workers.max(1))
        .map(|_| {
            let queue = queue.clone();
            let producing = Arc::clone(&producing);
            tokio::task::spawn_blocking(move || consume(queue, producing, args.ack_ratio, retries))
        })
        .collect();

    let producer = {
        let queue = queue.clone();
        let tasks = args.tasks;
        tokio::task::spawn_blocking(move || -> Result<(), taskque_core::QueueError> {
            for value in 0..tasks {
                let priority = (value % 5) as u8;
                queue.admit(Admission::new(value).priority(priority), WaitOptions::blocking())?;
            }
            Ok(())
        })
    };
    let produced = producer.await?;
    producing.store(false, Ordering::Release);
    produced?;

    for consumer in consumers {
        consumer.await?;
    }

    // let queued finalize callbacks flush
    tokio::time::sleep(Duration::from_millis(100)).await;

    let summary = SummaryLine {
        counts: queue.counts(),
    };
    println!("{}", serde_json::to_string(&summary)?);
    info!(live = summary.counts.live(), "session finished");
    Ok(())
}
