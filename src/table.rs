use std::fmt::Debug;
use std::hash::Hash;

use papaya::{Compute, HashMap, Operation};

use crate::{DependencyHandle, HandleSet, Transaction};

/// Trait for table keys.
pub trait TableKey: Clone + PartialEq + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> TableKey for T where T: Clone + PartialEq + Eq + Hash + Debug + Send + Sync + 'static {}

/// Trait for table values.
///
/// Equality is what drives invalidation cut-off: a recomputed value equal to the
/// old one does not trigger the key's dependents. The `Debug` representation is
/// the value's short textual description.
pub trait TableValue: Clone + PartialEq + Debug + Send + Sync + 'static {}

impl<T> TableValue for T where T: Clone + PartialEq + Debug + Send + Sync + 'static {}

/// Whether a table keeps a secondary in-process value cache.
///
/// The two modes are identical in contract; `WithCache` trades memory for fast
/// repeated reads, `NoCache` stays lean. Correctness never depends on the choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Keep a secondary value cache for fast repeated reads.
    WithCache,
    /// Read through to the primary store every time.
    NoCache,
}

/// A keyed fact store with per-key dependent tracking.
///
/// A read that carries the handle of the fact being computed records that fact
/// as a dependent of the key read. Transactions opened with
/// [`Table::transaction`] later use those recorded dependents to answer "whose
/// cached result did this change invalidate".
pub struct Table<K, V> {
    /// Primary key to value store.
    values: HashMap<K, V, ahash::RandomState>,
    /// For each key, the handles of the facts computed from its value.
    dependents: HashMap<K, HandleSet, ahash::RandomState>,
    /// Secondary value cache, present in `WithCache` mode only.
    cache: Option<HashMap<K, V, ahash::RandomState>>,
}

impl<K, V> Table<K, V>
where
    K: TableKey,
    V: TableValue,
{
    /// Create an empty table in the given cache mode.
    pub fn new(mode: CacheMode) -> Self {
        Self {
            values: HashMap::with_hasher(ahash::RandomState::new()),
            dependents: HashMap::with_hasher(ahash::RandomState::new()),
            cache: match mode {
                CacheMode::WithCache => Some(HashMap::with_hasher(ahash::RandomState::new())),
                CacheMode::NoCache => None,
            },
        }
    }

    /// Get the value for a key if present.
    ///
    /// When `dependency` is given and the key is present, the handle is recorded
    /// as a consumer of the key.
    pub fn get(&self, dependency: Option<DependencyHandle>, key: &K) -> Option<V> {
        let value = self.lookup(key);
        if value.is_some() {
            if let Some(dependency) = dependency {
                self.record_dependent(key, dependency);
            }
        }
        value
    }

    fn lookup(&self, key: &K) -> Option<V> {
        if let Some(cache) = &self.cache {
            if let Some(value) = cache.pin().get(key) {
                return Some(value.clone());
            }
        }
        let value = self.values.pin().get(key).cloned();
        if let (Some(value), Some(cache)) = (&value, &self.cache) {
            cache.pin().insert(key.clone(), value.clone());
        }
        value
    }

    /// Insert or replace the value for a key.
    pub fn add(&self, key: K, value: V) {
        if let Some(cache) = &self.cache {
            cache.pin().insert(key.clone(), value.clone());
        }
        self.values.pin().insert(key, value);
    }

    /// Remove the value for a key, returning it. Recorded dependents are kept.
    pub fn remove(&self, key: &K) -> Option<V> {
        if let Some(cache) = &self.cache {
            cache.pin().remove(key);
        }
        self.values.pin().remove(key).cloned()
    }

    /// Record a handle as a consumer of a key.
    pub fn record_dependent(&self, key: &K, dependency: DependencyHandle) {
        let pinned = self.dependents.pin();
        let _ = pinned.compute(key.clone(), |entry| match entry {
            Some((_, set)) if set.contains(dependency) => Operation::Abort(()),
            Some((_, set)) => Operation::Insert(set.added(dependency)),
            None => Operation::Insert(HandleSet::from_iter([dependency])),
        });
    }

    /// The handles recorded as consumers of a key.
    pub fn dependents(&self, key: &K) -> HandleSet {
        self.dependents.pin().get(key).cloned().unwrap_or_default()
    }

    /// Remove and return the handles recorded as consumers of a key.
    pub fn take_dependents(&self, key: &K) -> HandleSet {
        self.dependents.pin().remove(key).cloned().unwrap_or_default()
    }

    /// Merge a previously taken dependent set back in.
    pub fn restore_dependents(&self, key: &K, dependents: HandleSet) {
        if dependents.is_empty() {
            return;
        }
        let pinned = self.dependents.pin();
        let result = pinned.compute(key.clone(), |entry| match entry {
            Some((_, set)) => Operation::<_, ()>::Insert(set.union(&dependents)),
            None => Operation::Insert(dependents.clone()),
        });
        match result {
            Compute::Inserted(_, _) | Compute::Updated { .. } => {}
            Compute::Removed(_, _) | Compute::Aborted(_) => unreachable!(),
        }
    }

    /// Drop the secondary value cache, if any. The primary store is untouched.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.pin().clear();
        }
    }

    /// The number of keys with a stored value.
    pub fn len(&self) -> usize {
        self.values.pin().len()
    }

    /// Returns true if no key has a stored value.
    pub fn is_empty(&self) -> bool {
        self.values.pin().is_empty()
    }

    /// The keys with a stored value, in no particular order.
    pub fn keys(&self) -> Vec<K> {
        self.values.pin().keys().cloned().collect()
    }

    /// Open an invalidation transaction over this table.
    pub fn transaction(&self) -> Transaction<'_, K, V> {
        Transaction::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_records_dependent_only_when_present() {
        let table: Table<&str, u64> = Table::new(CacheMode::WithCache);
        let consumer = DependencyHandle(7);

        assert_eq!(table.get(Some(consumer), &"k"), None);
        assert!(table.dependents(&"k").is_empty());

        table.add("k", 1);
        assert_eq!(table.get(Some(consumer), &"k"), Some(1));
        assert!(table.dependents(&"k").contains(consumer));
    }

    #[test]
    fn test_cache_modes_agree() {
        for mode in [CacheMode::WithCache, CacheMode::NoCache] {
            let table: Table<&str, u64> = Table::new(mode);
            table.add("k", 1);
            assert_eq!(table.get(None, &"k"), Some(1));
            table.clear_cache();
            assert_eq!(table.get(None, &"k"), Some(1));
            assert_eq!(table.remove(&"k"), Some(1));
            assert_eq!(table.get(None, &"k"), None);
        }
    }

    #[test]
    fn test_remove_keeps_dependents() {
        let table: Table<&str, u64> = Table::new(CacheMode::NoCache);
        table.add("k", 1);
        assert_eq!(table.get(Some(DependencyHandle(1)), &"k"), Some(1));
        assert_eq!(table.remove(&"k"), Some(1));
        assert!(table.dependents(&"k").contains(DependencyHandle(1)));
    }
}
