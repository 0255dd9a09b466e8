//! PriorityDict - タスク管理を持たない、呼び出し側キーの優先度付きキュー
//!
//! QueueCore の待機・容量・レート制限・freeze はそのまま使え、
//! バックエンドは PriorityMap そのもの。retain / retry / timeout / callback は無い。
//! 既にあるキーへの push は容量もレート制限も素通りする in-place 更新になる。

use std::fmt::Display;
use std::hash::Hash;

use super::blocking::{QueueBackend, QueueCore, WaitOptions};
use super::priority_map::PriorityMap;
use crate::config::SpeedLimit;
use crate::domain::TaskKey;
use crate::error::QueueError;

/// Blocking priority queue keyed by the caller.
///
/// # 使用例
/// ```ignore
/// let dict: PriorityDict<&str, u32, u8> =
///     PriorityDict::bounded(100, SpeedLimit::disabled());
/// dict.push("a", 1, 5, WaitOptions::blocking())?;
/// let (key, value, priority) = dict.pop(WaitOptions::blocking())?;
/// ```
pub type PriorityDict<K, V, P> = QueueCore<PriorityMap<K, V, P>>;

impl<K, V, P> QueueBackend for PriorityMap<K, V, P>
where
    K: Eq + Hash + Clone + Display,
    V: Clone,
    P: Ord + Clone,
{
    type Item = (K, V, P);
    type Key = K;
    type Output = (K, V, P);

    fn size(&self) -> usize {
        self.len()
    }

    fn contains(&self, item: &(K, V, P)) -> bool {
        PriorityMap::contains(self, &item.0)
    }

    fn do_put(&mut self, (key, value, priority): (K, V, P)) -> Result<K, QueueError> {
        self.push(key.clone(), value, priority);
        Ok(key)
    }

    fn do_get(&mut self, key: Option<&K>) -> Result<(K, V, P), QueueError> {
        match key {
            None => self.pop().ok_or(QueueError::Empty),
            Some(key) => self.pop_key(key).ok_or_else(|| not_found(key)),
        }
    }

    fn do_peek(&self, key: Option<&K>) -> Result<(K, V, P), QueueError> {
        let found = match key {
            None => self.peek().ok_or(QueueError::Empty)?,
            Some(key) => self.peek_key(key).ok_or_else(|| not_found(key))?,
        };
        let (key, value, priority) = found;
        Ok((key.clone(), value.clone(), priority.clone()))
    }
}

fn not_found(key: &impl Display) -> QueueError {
    QueueError::NotFound(TaskKey::new(key.to_string()))
}

impl<K, V, P> QueueCore<PriorityMap<K, V, P>>
where
    K: Eq + Hash + Clone + Display,
    V: Clone,
    P: Ord + Clone,
{
    /// `max_size` 0 means unbounded.
    pub fn bounded(max_size: usize, speed: SpeedLimit) -> Self {
        QueueCore::new(PriorityMap::new(), max_size, speed)
    }

    pub fn push(
        &self,
        key: K,
        value: V,
        priority: P,
        opts: WaitOptions,
    ) -> Result<K, QueueError> {
        self.put((key, value, priority), opts)
    }

    /// Remove the lowest-priority entry.
    pub fn pop(&self, opts: WaitOptions) -> Result<(K, V, P), QueueError> {
        self.get(None, opts)
    }

    /// Remove `key` wherever it sits. An absent key is `NotFound` once the
    /// queue is non-empty.
    pub fn pop_key(&self, key: &K, opts: WaitOptions) -> Result<(K, V, P), QueueError> {
        self.get(Some(key), opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn dict(max_size: usize) -> PriorityDict<&'static str, u32, u8> {
        PriorityDict::bounded(max_size, SpeedLimit::disabled())
    }

    #[test]
    fn pops_lowest_priority_first() {
        let d = dict(0);
        d.push("low", 1, 9, WaitOptions::nowait()).unwrap();
        d.push("high", 2, 1, WaitOptions::nowait()).unwrap();
        d.push("mid", 3, 5, WaitOptions::nowait()).unwrap();

        let order: Vec<_> = (0..3)
            .map(|_| d.pop(WaitOptions::nowait()).unwrap().0)
            .collect();
        assert_eq!(order, vec!["high", "mid", "low"]);
        assert_eq!(d.pop(WaitOptions::nowait()), Err(QueueError::Empty));
    }

    #[test]
    fn existing_key_updates_in_place_past_capacity() {
        let d = dict(1);
        d.push("a", 1, 5, WaitOptions::nowait()).unwrap();
        assert_eq!(
            d.push("b", 2, 5, WaitOptions::nowait()),
            Err(QueueError::Full)
        );

        d.push("a", 10, 2, WaitOptions::nowait()).unwrap();
        assert_eq!(d.len(), 1);
        assert_eq!(d.peek(None, WaitOptions::nowait()), Ok(("a", 10, 2)));
    }

    #[test]
    fn pop_key_and_peek_key() {
        let d = dict(0);
        d.push("a", 1, 1, WaitOptions::nowait()).unwrap();
        d.push("b", 2, 2, WaitOptions::nowait()).unwrap();

        assert_eq!(d.peek(Some(&"b"), WaitOptions::nowait()), Ok(("b", 2, 2)));
        assert_eq!(d.pop_key(&"b", WaitOptions::nowait()), Ok(("b", 2, 2)));
        assert_eq!(
            d.pop_key(&"b", WaitOptions::nowait()),
            Err(QueueError::NotFound(TaskKey::new("b")))
        );
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn blocking_pop_wakes_on_push() {
        let d = Arc::new(dict(0));
        let consumer = {
            let d = Arc::clone(&d);
            thread::spawn(move || {
                d.pop(WaitOptions::blocking().timeout(Duration::from_secs(2)))
            })
        };
        thread::sleep(Duration::from_millis(50));
        d.push("x", 7, 0, WaitOptions::blocking()).unwrap();
        assert_eq!(consumer.join().unwrap(), Ok(("x", 7, 0)));
    }

    #[test]
    fn get_rate_limit_spaces_out_pops() {
        let d: PriorityDict<&str, u32, u8> =
            PriorityDict::bounded(0, SpeedLimit::new(Duration::from_millis(80), 0, 1));
        for (key, priority) in [("a", 1), ("b", 2)] {
            d.push(key, 0, priority, WaitOptions::nowait()).unwrap();
        }
        let start = Instant::now();
        d.pop(WaitOptions::blocking()).unwrap();
        d.pop(WaitOptions::blocking()).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(80));
        assert_eq!(d.op_counts(), (2, 2));
    }

    #[test]
    fn frozen_dict_fails_blocking_pop() {
        let d = dict(0);
        let _scope = d.frozen_scope();
        assert_eq!(d.pop(WaitOptions::blocking()), Err(QueueError::Timeout));
        d.push("a", 1, 1, WaitOptions::nowait()).unwrap();
        assert_eq!(d.pop(WaitOptions::nowait()), Ok(("a", 1, 1)));
    }
}
