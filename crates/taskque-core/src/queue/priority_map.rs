//! Priority map: key -> (value, priority), lowest priority pops first.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

#[derive(Debug, Clone)]
struct Slot<V, P> {
    value: V,
    priority: P,
    seq: u64,
}

/// Associative container ordered by priority.
///
/// Design:
/// - `entries` is the source of truth (key -> slot).
/// - `order` indexes slots by `(priority, seq)`; `seq` is a per-map insertion
///   counter, so equal priorities come out FIFO.
/// - Re-pushing an existing key replaces it and moves it behind its equals.
#[derive(Debug, Clone)]
pub struct PriorityMap<K, V, P> {
    entries: HashMap<K, Slot<V, P>>,
    order: BTreeMap<(P, u64), K>,
    next_seq: u64,
}

impl<K, V, P> PriorityMap<K, V, P>
where
    K: Eq + Hash + Clone,
    P: Ord + Clone,
{
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Insert or replace `key`. Returns the previous value and priority.
    pub fn push(&mut self, key: K, value: V, priority: P) -> Option<(V, P)> {
        let previous = self.entries.remove(&key).map(|old| {
            self.order.remove(&(old.priority.clone(), old.seq));
            (old.value, old.priority)
        });

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert((priority.clone(), seq), key.clone());
        self.entries.insert(
            key,
            Slot {
                value,
                priority,
                seq,
            },
        );
        previous
    }

    /// Remove and return the lowest-priority entry.
    pub fn pop(&mut self) -> Option<(K, V, P)> {
        let (_, key) = self.order.pop_first()?;
        let slot = self.entries.remove(&key)?;
        Some((key, slot.value, slot.priority))
    }

    /// Remove and return `key`, wherever it sits in the order.
    pub fn pop_key(&mut self, key: &K) -> Option<(K, V, P)> {
        let (key, slot) = self.entries.remove_entry(key)?;
        self.order.remove(&(slot.priority.clone(), slot.seq));
        Some((key, slot.value, slot.priority))
    }

    pub fn peek(&self) -> Option<(&K, &V, &P)> {
        let (_, key) = self.order.first_key_value()?;
        self.peek_key(key)
    }

    pub fn peek_key(&self, key: &K) -> Option<(&K, &V, &P)> {
        self.entries
            .get_key_value(key)
            .map(|(k, slot)| (k, &slot.value, &slot.priority))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in pop order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.order.values()
    }
}

impl<K, V, P> Default for PriorityMap<K, V, P>
where
    K: Eq + Hash + Clone,
    P: Ord + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
