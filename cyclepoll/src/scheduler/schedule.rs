//! Bucket membership with a reverse index.
//!
//! Both maps live behind one mutex so they are always observed in agreement:
//! a key is in bucket `m`'s list if and only if the reverse index maps it to `m`.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use super::balance::Minute;

/// Upper bound on the capacity reserved up front from sizing hints.
const MAX_PRESIZE: usize = 1 << 16;

#[derive(Debug, Default)]
struct ScheduleInner {
    /// Bucket to keys, in insertion order.
    buckets: HashMap<Minute, Vec<String>>,
    /// Key to bucket.
    index: HashMap<String, Minute>,
}

/// Thread-safe bucket membership.
///
/// Reads return copies; callers never hold a reference into the lists.
#[derive(Debug, Default)]
pub struct CycleSchedule {
    inner: Mutex<ScheduleInner>,
}

impl CycleSchedule {
    /// Creates an empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty schedule sized for `subjects` keys over `buckets` buckets.
    ///
    /// Both hints are capped; the maps grow past the cap on demand.
    pub fn with_capacity(buckets: usize, subjects: usize) -> Self {
        Self {
            inner: Mutex::new(ScheduleInner {
                buckets: HashMap::with_capacity(buckets.min(MAX_PRESIZE)),
                index: HashMap::with_capacity(subjects.min(MAX_PRESIZE)),
            }),
        }
    }

    /// Appends `key` to `bucket`.
    ///
    /// Returns `false` without changes if the key is already scheduled anywhere.
    pub fn add(&self, bucket: Minute, key: &str) -> bool {
        self.add_with(key, || bucket).is_some()
    }

    /// Schedules `key` in the bucket returned by `choose`.
    ///
    /// `choose` runs under the schedule lock and only when `key` is not yet
    /// scheduled, so concurrent adds of one key call it exactly once. Returns
    /// the chosen bucket, or `None` if the key was already present.
    pub fn add_with(&self, key: &str, choose: impl FnOnce() -> Minute) -> Option<Minute> {
        let mut inner = self.inner.lock();
        if inner.index.contains_key(key) {
            return None;
        }
        let bucket = choose();
        inner.index.insert(key.to_string(), bucket);
        inner
            .buckets
            .entry(bucket)
            .or_default()
            .push(key.to_string());
        Some(bucket)
    }

    /// Removes `key` from `bucket`.
    ///
    /// Returns `false` without changes if the key is not scheduled in that bucket.
    pub fn remove(&self, bucket: Minute, key: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.index.get(key) != Some(&bucket) {
            return false;
        }
        inner.index.remove(key);

        let now_empty = match inner.buckets.get_mut(&bucket) {
            Some(keys) => {
                if let Some(pos) = keys.iter().position(|k| k == key) {
                    keys.remove(pos);
                }
                keys.is_empty()
            }
            None => false,
        };
        if now_empty {
            inner.buckets.remove(&bucket);
        }
        true
    }

    /// Copy of the keys in `bucket`, in insertion order.
    pub fn pick(&self, bucket: Minute) -> Vec<String> {
        self.inner
            .lock()
            .buckets
            .get(&bucket)
            .cloned()
            .unwrap_or_default()
    }

    /// Bucket `key` is scheduled in, if any.
    pub fn bucket_of(&self, key: &str) -> Option<Minute> {
        self.inner.lock().index.get(key).copied()
    }

    /// Number of scheduled keys.
    pub fn len(&self) -> usize {
        self.inner.lock().index.len()
    }

    /// Returns true if no key is scheduled.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().index.is_empty()
    }

    /// Consistent copy of both maps, taken under one lock.
    pub fn snapshot(&self) -> ScheduleSnapshot {
        let inner = self.inner.lock();
        ScheduleSnapshot {
            buckets: inner
                .buckets
                .iter()
                .map(|(m, keys)| (*m, keys.clone()))
                .collect(),
            index: inner
                .index
                .iter()
                .map(|(k, m)| (k.clone(), *m))
                .collect(),
        }
    }
}

/// Point-in-time copy of a [`CycleSchedule`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleSnapshot {
    /// Bucket to keys.
    pub buckets: BTreeMap<Minute, Vec<String>>,
    /// Key to bucket.
    pub index: BTreeMap<String, Minute>,
}

impl ScheduleSnapshot {
    /// Checks that every indexed key sits in exactly the bucket it maps to,
    /// appears once, and that no bucket lists an unindexed key.
    pub fn is_consistent(&self) -> bool {
        let listed: usize = self.buckets.values().map(Vec::len).sum();
        if listed != self.index.len() {
            return false;
        }
        let listed_in_place = self.buckets.iter().all(|(bucket, keys)| {
            keys.iter().all(|key| self.index.get(key) == Some(bucket))
        });
        let indexed_in_place = self.index.iter().all(|(key, bucket)| {
            self.buckets
                .get(bucket)
                .is_some_and(|keys| keys.iter().filter(|k| *k == key).count() == 1)
        });
        listed_in_place && indexed_in_place
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_add_and_pick() {
        let schedule = CycleSchedule::new();
        assert!(schedule.add(2, "a"));
        assert!(schedule.add(2, "b"));
        assert!(schedule.add(0, "c"));

        assert_eq!(schedule.pick(2), vec!["a", "b"]);
        assert_eq!(schedule.pick(0), vec!["c"]);
        assert!(schedule.pick(1).is_empty());
        assert_eq!(schedule.len(), 3);
    }

    #[test]
    fn test_add_is_idempotent() {
        let schedule = CycleSchedule::new();
        assert!(schedule.add(1, "a"));
        assert!(!schedule.add(1, "a"));
        assert!(!schedule.add(3, "a"));

        assert_eq!(schedule.pick(1), vec!["a"]);
        assert!(schedule.pick(3).is_empty());
        assert_eq!(schedule.bucket_of("a"), Some(1));
    }

    #[test]
    fn test_add_with_chooses_once_per_key() {
        let schedule = CycleSchedule::new();
        let mut calls = 0;
        assert_eq!(schedule.add_with("a", || { calls += 1; 2 }), Some(2));
        assert_eq!(schedule.add_with("a", || { calls += 1; 3 }), None);
        assert_eq!(calls, 1);
        assert_eq!(schedule.bucket_of("a"), Some(2));
    }

    #[test]
    fn test_oversized_hint_is_capped() {
        let schedule = CycleSchedule::with_capacity(usize::MAX, usize::MAX);
        assert!(schedule.add(0, "a"));
        assert_eq!(schedule.len(), 1);
    }

    #[test]
    fn test_remove() {
        let schedule = CycleSchedule::new();
        schedule.add(1, "a");
        schedule.add(1, "b");

        assert!(!schedule.remove(2, "a"), "wrong bucket must be a no-op");
        assert!(schedule.remove(1, "a"));
        assert!(!schedule.remove(1, "a"));

        assert_eq!(schedule.pick(1), vec!["b"]);
        assert_eq!(schedule.bucket_of("a"), None);
        assert!(schedule.snapshot().is_consistent());
    }

    #[test]
    fn test_remove_last_key_drops_bucket() {
        let schedule = CycleSchedule::new();
        schedule.add(4, "only");
        schedule.remove(4, "only");
        assert!(schedule.is_empty());
        assert!(schedule.snapshot().buckets.is_empty());
    }

    #[test]
    fn test_pick_returns_a_copy() {
        let schedule = CycleSchedule::new();
        schedule.add(0, "a");
        let picked = schedule.pick(0);
        schedule.add(0, "b");
        schedule.remove(0, "a");
        assert_eq!(picked, vec!["a"]);
    }

    #[test]
    fn test_concurrent_mutation_stays_consistent() {
        let schedule = Arc::new(CycleSchedule::with_capacity(8, 800));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let schedule = Arc::clone(&schedule);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("k{}", i);
                        let bucket = (i % 8) as Minute;
                        schedule.add(bucket, &key);
                        if (i + t) % 3 == 0 {
                            schedule.remove(bucket, &key);
                        }
                        let _ = schedule.pick(bucket);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(schedule.snapshot().is_consistent());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(Minute, u8),
        Remove(Minute, u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..4, 0u8..12).prop_map(|(m, k)| Op::Add(m, k)),
            (0u32..4, 0u8..12).prop_map(|(m, k)| Op::Remove(m, k)),
        ]
    }

    proptest! {
        #[test]
        fn prop_index_and_buckets_agree(ops in proptest::collection::vec(op_strategy(), 0..200)) {
            let schedule = CycleSchedule::new();
            for op in ops {
                match op {
                    Op::Add(m, k) => { schedule.add(m, &format!("key{}", k)); }
                    Op::Remove(m, k) => { schedule.remove(m, &format!("key{}", k)); }
                }
                let snapshot = schedule.snapshot();
                prop_assert!(snapshot.is_consistent());
            }
        }
    }
}
