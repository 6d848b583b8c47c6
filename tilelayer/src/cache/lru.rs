//! Strict LRU index ordered by a logical access clock.
//!
//! Wall-clock timestamps tie when several accesses land in the same tick of
//! the OS clock, which makes "least recently used" ambiguous. Every access
//! instead takes the next value of a cache-wide [`AccessClock`], so the
//! order is total and eviction is deterministic.
//!
//! The index itself is not synchronized; tiers wrap it in a
//! `parking_lot::Mutex` and never hold that lock across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic access counter shared by every tier of one cache.
#[derive(Debug, Clone, Default)]
pub struct AccessClock(Arc<AtomicU64>);

impl AccessClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a tick strictly greater than every previous one.
    pub fn tick(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    size_bytes: u64,
    last_access: u64,
}

/// An entry removed from the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evicted<K, V> {
    pub key: K,
    pub value: V,
    pub size_bytes: u64,
}

/// Map plus access order.
#[derive(Debug)]
pub struct LruIndex<K, V> {
    entries: HashMap<K, Slot<V>>,
    order: BTreeMap<u64, K>,
    total_bytes: u64,
}

impl<K, V> Default for LruIndex<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            total_bytes: 0,
        }
    }
}

impl<K: Hash + Eq + Clone, V> LruIndex<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `key`, marking it accessed at `tick`.
    ///
    /// Returns the replaced value, if any.
    pub fn insert(&mut self, key: K, value: V, size_bytes: u64, tick: u64) -> Option<V> {
        let previous = self.remove(&key).map(|evicted| evicted.value);
        self.order.insert(tick, key.clone());
        self.entries.insert(
            key,
            Slot {
                value,
                size_bytes,
                last_access: tick,
            },
        );
        self.total_bytes += size_bytes;
        previous
    }

    /// Marks `key` accessed at `tick` and returns its value.
    pub fn touch(&mut self, key: &K, tick: u64) -> Option<&V> {
        let slot = self.entries.get_mut(key)?;
        self.order.remove(&slot.last_access);
        slot.last_access = tick;
        self.order.insert(tick, key.clone());
        Some(&slot.value)
    }

    /// Looks up `key` without changing its position.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    pub fn last_access(&self, key: &K) -> Option<u64> {
        self.entries.get(key).map(|slot| slot.last_access)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<Evicted<K, V>> {
        let (key, slot) = self.entries.remove_entry(key)?;
        self.order.remove(&slot.last_access);
        self.total_bytes -= slot.size_bytes;
        Some(Evicted {
            key,
            value: slot.value,
            size_bytes: slot.size_bytes,
        })
    }

    /// Removes the least recently accessed entry.
    pub fn pop_oldest(&mut self) -> Option<Evicted<K, V>> {
        let (_, key) = self.order.pop_first()?;
        let slot = self.entries.remove(&key)?;
        self.total_bytes -= slot.size_bytes;
        Some(Evicted {
            key,
            value: slot.value,
            size_bytes: slot.size_bytes,
        })
    }

    /// Evicts oldest-first until both limits hold.
    pub fn evict_until(&mut self, max_bytes: u64, max_entries: usize) -> Vec<Evicted<K, V>> {
        let mut evicted = Vec::new();
        while self.total_bytes > max_bytes || self.entries.len() > max_entries {
            match self.pop_oldest() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }

    /// Removes every entry whose key matches `predicate`.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&K) -> bool) -> Vec<Evicted<K, V>> {
        let keys: Vec<K> = self
            .entries
            .keys()
            .filter(|key| predicate(key))
            .cloned()
            .collect();
        keys.iter().filter_map(|key| self.remove(key)).collect()
    }

    /// `(entry count, bytes)` of entries whose key matches `predicate`.
    pub fn usage_where(&self, mut predicate: impl FnMut(&K) -> bool) -> (usize, u64) {
        self.entries
            .iter()
            .filter(|(key, _)| predicate(key))
            .fold((0, 0), |(count, bytes), (_, slot)| {
                (count + 1, bytes + slot.size_bytes)
            })
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clock_is_strictly_increasing() {
        let clock = AccessClock::new();
        let shared = clock.clone();
        let a = clock.tick();
        let b = shared.tick();
        assert!(b > a);
    }

    #[test]
    fn test_insert_updates_totals() {
        let mut index = LruIndex::new();
        index.insert("a", 1, 100, 1);
        index.insert("b", 2, 200, 2);
        assert_eq!(index.len(), 2);
        assert_eq!(index.total_bytes(), 300);

        assert_eq!(index.insert("a", 3, 50, 3), Some(1));
        assert_eq!(index.len(), 2);
        assert_eq!(index.total_bytes(), 250);
    }

    #[test]
    fn test_touch_moves_to_newest() {
        let mut index = LruIndex::new();
        index.insert("a", (), 1, 1);
        index.insert("b", (), 1, 2);
        index.insert("c", (), 1, 3);

        assert!(index.touch(&"a", 4).is_some());
        assert_eq!(index.pop_oldest().unwrap().key, "b");
        assert_eq!(index.pop_oldest().unwrap().key, "c");
        assert_eq!(index.pop_oldest().unwrap().key, "a");
        assert!(index.pop_oldest().is_none());
        assert_eq!(index.total_bytes(), 0);
    }

    #[test]
    fn test_touch_missing_is_noop() {
        let mut index: LruIndex<&str, ()> = LruIndex::new();
        assert!(index.touch(&"missing", 1).is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn test_evict_until_respects_both_limits() {
        let mut index = LruIndex::new();
        for i in 0..10u64 {
            index.insert(i, (), 10, i + 1);
        }
        let evicted = index.evict_until(1_000, 6);
        assert_eq!(evicted.len(), 4);
        assert_eq!(index.len(), 6);

        let evicted = index.evict_until(35, 100);
        assert_eq!(evicted.iter().map(|e| e.key).collect::<Vec<_>>(), vec![4, 5, 6]);
        assert_eq!(index.total_bytes(), 30);
    }

    #[test]
    fn test_remove_where() {
        let mut index = LruIndex::new();
        for i in 0..6u32 {
            index.insert(i, (), 1, u64::from(i) + 1);
        }
        let removed = index.remove_where(|key| key % 2 == 0);
        assert_eq!(removed.len(), 3);
        assert_eq!(index.usage_where(|_| true), (3, 3));
        assert!(!index.contains(&4));
    }

    proptest! {
        /// Eviction never removes a more recently accessed entry while an
        /// older one remains.
        #[test]
        fn prop_eviction_is_lru(
            ops in prop::collection::vec((0u8..20, 1u64..100, any::<bool>()), 1..200),
            budget in 50u64..500
        ) {
            let mut index = LruIndex::new();
            let mut tick = 0u64;

            for (key, size, touch) in ops {
                tick += 1;
                if touch && index.contains(&key) {
                    index.touch(&key, tick);
                } else {
                    index.insert(key, (), size, tick);
                }

                let survivors_before: Vec<(u8, u64)> = index
                    .keys()
                    .map(|k| (*k, index.last_access(k).unwrap()))
                    .collect();
                let evicted = index.evict_until(budget, usize::MAX);

                prop_assert!(index.total_bytes() <= budget);
                let newest_evicted = survivors_before
                    .iter()
                    .filter(|(k, _)| evicted.iter().any(|e| e.key == *k))
                    .map(|(_, t)| *t)
                    .max();
                let oldest_kept = index.keys().filter_map(|k| index.last_access(k)).min();
                if let (Some(evicted_tick), Some(kept_tick)) = (newest_evicted, oldest_kept) {
                    prop_assert!(evicted_tick < kept_tick);
                }
            }
        }
    }
}
