//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **TokioExecutor**: tokio ランタイム上の Executor（デフォルト）

pub mod tokio_executor;

// 主要な型を再エクスポート
pub use self::tokio_executor::TokioExecutor;
