//! KeyGenerator port - キー生成の抽象化
//!
//! `auto_key` が有効なキューは、admit のたびにここからキーを取り出す。
//! 生成器はキューのインスタンスごとに持つ（プロセス全体で共有しない）。
//!
//! # 実装
//! - **SequentialKeys**: "0", "1", "2", ... （デフォルト）
//! - **UlidKeys**: ULID ベース（時刻でソート可能）

use std::sync::atomic::{AtomicU64, Ordering};

use ulid::Ulid;

use crate::domain::TaskKey;
use crate::ports::Clock;

/// KeyGenerator はキュー内で一意なキーを生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（キューのロック内外どちらから呼ばれてもよい）
pub trait KeyGenerator: Send + Sync {
    fn next_key(&self) -> TaskKey;
}

/// Monotonic counter rendered as a decimal string.
#[derive(Debug, Default)]
pub struct SequentialKeys {
    next: AtomicU64,
}

impl SequentialKeys {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl KeyGenerator for SequentialKeys {
    fn next_key(&self) -> TaskKey {
        TaskKey::new(self.next.fetch_add(1, Ordering::Relaxed).to_string())
    }
}

/// UlidKeys は ULID ベースのキー生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// FixedClock を渡すと timestamp 部分が固定されます（ランダム部分は異なる）。
pub struct UlidKeys<C> {
    clock: C,
}

impl<C: Clock> UlidKeys<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> KeyGenerator for UlidKeys<C> {
    fn next_key(&self) -> TaskKey {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        TaskKey::new(ulid.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn sequential_keys_count_up_from_zero() {
        let keys = SequentialKeys::new();
        assert_eq!(keys.next_key().as_str(), "0");
        assert_eq!(keys.next_key().as_str(), "1");
        assert_eq!(keys.next_key().as_str(), "2");
    }

    #[test]
    fn sequential_keys_are_per_instance() {
        let a = SequentialKeys::new();
        let b = SequentialKeys::starting_at(10);
        assert_eq!(a.next_key().as_str(), "0");
        assert_eq!(b.next_key().as_str(), "10");
        assert_eq!(a.next_key().as_str(), "1");
    }

    #[test]
    fn ulid_keys_are_unique() {
        let keys = UlidKeys::new(SystemClock);
        let k1 = keys.next_key();
        let k2 = keys.next_key();
        assert_ne!(k1, k2);
        assert_eq!(k1.as_str().len(), 26);
    }

    #[test]
    fn ulid_keys_with_fixed_clock_share_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let keys = UlidKeys::new(FixedClock::new(fixed_time));

        let k1: Ulid = keys.next_key().as_str().parse().unwrap();
        let k2: Ulid = keys.next_key().as_str().parse().unwrap();

        // ランダム部分があるので ID は異なるが、timestamp 部分は同じ
        assert_ne!(k1, k2);
        assert_eq!(k1.timestamp_ms(), k2.timestamp_ms());
        assert_eq!(k1.timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }
}
