//! Capacity-bounded TTL map with an ordered expiry index.
//!
//! Every entry is mirrored in a `BTreeSet` ordered by `(expires_at, seq, key)`.
//! The first element of the index is always the eviction candidate, so both
//! capacity eviction and expiry sweeps walk the index from the front instead of
//! scanning the whole map. `seq` is a monotonically increasing insertion number;
//! among entries expiring at the same instant the oldest insert goes first.

use ballast_core::Timestamp;
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use crate::entry::CacheEntry;

#[derive(Debug)]
struct Indexed<T> {
    entry: CacheEntry<T>,
    seq: u64,
}

/// Bounded map of cache entries.
#[derive(Debug)]
pub struct BoundedTtlMap<K, T> {
    entries: HashMap<K, Indexed<T>>,
    index: BTreeSet<(Timestamp, u64, K)>,
    next_seq: u64,
    capacity: usize,
}

/// What an insert did to the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome<K> {
    /// A new key was added with room to spare.
    Inserted,
    /// An existing key was replaced; nothing was evicted.
    Replaced,
    /// A new key was added after evicting the returned key.
    Evicted(K),
}

impl<K, T> BoundedTtlMap<K, T>
where
    K: Eq + Hash + Ord + Clone,
{
    /// Create a map holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            index: BTreeSet::new(),
            next_seq: 0,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry for `key` if it is still valid at `now`.
    pub fn get(&self, key: &K, now: Timestamp) -> Option<&CacheEntry<T>> {
        self.entries
            .get(key)
            .map(|indexed| &indexed.entry)
            .filter(|entry| entry.is_valid_at(now))
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace `key`.
    ///
    /// Replacing never evicts. Adding a new key to a full map first evicts the
    /// entry with the earliest expiry, expired or not.
    pub fn insert(&mut self, key: K, entry: CacheEntry<T>) -> InsertOutcome<K> {
        let outcome = if let Some(previous) = self.entries.remove(&key) {
            self.index
                .remove(&(previous.entry.expires_at(), previous.seq, key.clone()));
            InsertOutcome::Replaced
        } else if self.entries.len() >= self.capacity {
            match self.pop_earliest() {
                Some(evicted) => InsertOutcome::Evicted(evicted),
                None => InsertOutcome::Inserted,
            }
        } else {
            InsertOutcome::Inserted
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert((entry.expires_at(), seq, key.clone()));
        self.entries.insert(key, Indexed { entry, seq });
        outcome
    }

    /// Remove `key`, returning whether it was present.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.entries.remove(key) {
            Some(previous) => {
                self.index
                    .remove(&(previous.entry.expires_at(), previous.seq, key.clone()));
                true
            }
            None => false,
        }
    }

    /// Remove every entry with `expires_at <= now`, returning how many went.
    pub fn remove_expired(&mut self, now: Timestamp) -> usize {
        let mut removed = 0;
        while let Some((expires_at, _, _)) = self.index.first() {
            if *expires_at > now {
                break;
            }
            if self.pop_earliest().is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Earliest expiry currently held.
    pub fn earliest_expiry(&self) -> Option<Timestamp> {
        self.index.first().map(|(expires_at, _, _)| *expires_at)
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.index.clear();
        removed
    }

    fn pop_earliest(&mut self) -> Option<K> {
        let (_, _, key) = self.index.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use ballast_core::{Clock, ManualClock};
    use chrono::Duration;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The map never exceeds capacity and the index mirrors the entries.
        #[test]
        fn prop_capacity_and_index_consistent(
            capacity in 1usize..8,
            ops in prop::collection::vec((0u8..12, 1i64..50), 0..60),
        ) {
            let now = ManualClock::at_epoch().now();
            let mut map = BoundedTtlMap::new(capacity);
            for (key, ttl) in ops {
                map.insert(key, CacheEntry::new(0u8, now + Duration::seconds(ttl)));
                prop_assert!(map.len() <= capacity);
                prop_assert_eq!(map.len(), map.index.len());
            }
        }

        /// An eviction always removes an entry whose expiry is minimal.
        #[test]
        fn prop_eviction_picks_minimum(
            ttls in prop::collection::vec(1i64..1_000, 2..20),
        ) {
            let now = ManualClock::at_epoch().now();
            let capacity = ttls.len() - 1;
            let mut map = BoundedTtlMap::new(capacity);
            for (i, ttl) in ttls.iter().enumerate().take(capacity) {
                map.insert(i, CacheEntry::new(0u8, now + Duration::seconds(*ttl)));
            }
            let min_ttl = ttls.iter().take(capacity).copied().min().unwrap_or_default();
            let outcome = map.insert(capacity, CacheEntry::new(0u8, now + Duration::seconds(ttls[capacity])));
            match outcome {
                InsertOutcome::Evicted(key) => prop_assert_eq!(ttls[key], min_ttl),
                other => prop_assert!(false, "expected eviction, got {:?}", other),
            }
        }
    }
}
