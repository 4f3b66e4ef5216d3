use crate::{HandleSet, Table, TableKey, TableValue};

/// A scoped invalidation of a key set, followed by an atomic repopulation and diff.
///
/// Staged keys have their values dropped before the update closure runs; the
/// closure must repopulate every plain-staged key via [`Table::add`]. At commit
/// the old and new values are diffed per key, and the dependents recorded
/// against the keys whose value really changed are returned as the triggered
/// set. Pessimistically staged keys are dropped without repopulation and all of
/// their dependents count as triggered.
///
/// If the update closure fails, the table is restored to its pre-transaction
/// state and the error is surfaced unchanged.
pub struct Transaction<'t, K, V>
where
    K: TableKey,
    V: TableValue,
{
    table: &'t Table<K, V>,
    staged: Vec<K>,
    staged_pessimistic: Vec<K>,
}

/// The result of a committed transaction.
#[derive(Debug, Clone)]
pub struct Commit {
    /// Dependents of every key whose value changed, plus all dependents of
    /// pessimistically dropped keys.
    pub triggered: HandleSet,
    /// Number of staged keys whose repopulated value differed from the old one.
    pub changed_keys: usize,
    /// Number of staged keys whose repopulated value was equal to the old one.
    pub unchanged_keys: usize,
    /// Number of keys dropped pessimistically, without recomputation.
    pub dropped_keys: usize,
}

impl<'t, K, V> Transaction<'t, K, V>
where
    K: TableKey,
    V: TableValue,
{
    pub(crate) fn new(table: &'t Table<K, V>) -> Self {
        Self {
            table,
            staged: Vec::new(),
            staged_pessimistic: Vec::new(),
        }
    }

    /// Stage keys for invalidation with recomputation.
    ///
    /// The update closure passed to [`Transaction::execute`] must repopulate
    /// every key staged this way.
    pub fn stage(&mut self, keys: impl IntoIterator<Item = K>) {
        self.staged.extend(keys);
    }

    /// Stage keys for pessimistic invalidation: values are dropped and every
    /// recorded dependent counts as triggered, without recomputation.
    pub fn stage_pessimistic(&mut self, keys: impl IntoIterator<Item = K>) {
        self.staged_pessimistic.extend(keys);
    }

    /// The number of staged keys, over both staging modes.
    pub fn staged_len(&self) -> usize {
        self.staged.len() + self.staged_pessimistic.len()
    }

    /// Run the update closure and commit.
    ///
    /// On success, returns the commit with the triggered dependent union. On
    /// failure, restores every staged key (values and taken dependent sets) and
    /// returns the closure's error.
    pub fn execute<E>(self, update: impl FnOnce() -> Result<(), E>) -> Result<Commit, E> {
        let old: Vec<(K, Option<V>)> = self
            .staged
            .iter()
            .map(|key| (key.clone(), self.table.remove(key)))
            .collect();

        let mut triggered = HandleSet::new();
        let mut dropped: Vec<(K, Option<V>, HandleSet)> = Vec::new();
        for key in &self.staged_pessimistic {
            let value = self.table.remove(key);
            let dependents = self.table.take_dependents(key);
            triggered = triggered.union(&dependents);
            dropped.push((key.clone(), value, dependents));
        }

        if let Err(error) = update() {
            for (key, value) in old {
                if let Some(value) = value {
                    self.table.add(key, value);
                }
            }
            for (key, value, dependents) in dropped {
                if let Some(value) = value {
                    self.table.add(key.clone(), value);
                }
                self.table.restore_dependents(&key, dependents);
            }
            return Err(error);
        }

        let mut changed_keys = 0;
        let mut unchanged_keys = 0;
        for (key, old_value) in old {
            let new_value = self.table.get(None, &key);
            let unchanged = match (&old_value, &new_value) {
                (Some(old_value), Some(new_value)) => old_value == new_value,
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                unchanged_keys += 1;
            } else {
                changed_keys += 1;
                triggered = triggered.union(&self.table.dependents(&key));
            }
        }

        Ok(Commit {
            triggered,
            changed_keys,
            unchanged_keys,
            dropped_keys: self.staged_pessimistic.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use crate::{CacheMode, DependencyHandle};

    use super::*;

    fn table_with_consumer(consumer: DependencyHandle) -> Table<&'static str, u64> {
        let table = Table::new(CacheMode::WithCache);
        table.add("k", 1);
        assert_eq!(table.get(Some(consumer), &"k"), Some(1));
        table
    }

    #[test]
    fn test_changed_value_triggers_dependents() {
        let consumer = DependencyHandle(1);
        let table = table_with_consumer(consumer);

        let mut tx = table.transaction();
        tx.stage(["k"]);
        let commit = tx
            .execute(|| {
                table.add("k", 2);
                Ok::<_, Infallible>(())
            })
            .unwrap();

        assert!(commit.triggered.contains(consumer));
        assert_eq!(commit.changed_keys, 1);
        assert_eq!(commit.unchanged_keys, 0);
    }

    // Equal recomputation cuts the cascade off and preserves the consumer set.
    #[test]
    fn test_equal_value_cuts_off_and_preserves_dependents() {
        let consumer = DependencyHandle(1);
        let table = table_with_consumer(consumer);

        let mut tx = table.transaction();
        tx.stage(["k"]);
        let commit = tx
            .execute(|| {
                table.add("k", 1);
                Ok::<_, Infallible>(())
            })
            .unwrap();

        assert!(commit.triggered.is_empty());
        assert_eq!(commit.unchanged_keys, 1);
        assert!(table.dependents(&"k").contains(consumer));
    }

    #[test]
    fn test_unpopulated_key_counts_as_changed() {
        let consumer = DependencyHandle(1);
        let table = table_with_consumer(consumer);

        let mut tx = table.transaction();
        tx.stage(["k"]);
        let commit = tx.execute(|| Ok::<_, Infallible>(())).unwrap();

        assert!(commit.triggered.contains(consumer));
        assert_eq!(table.get(None, &"k"), None);
    }

    #[test]
    fn test_pessimistic_triggers_without_recompute() {
        let consumer = DependencyHandle(1);
        let table = table_with_consumer(consumer);

        let mut tx = table.transaction();
        tx.stage_pessimistic(["k"]);
        let commit = tx.execute(|| Ok::<_, Infallible>(())).unwrap();

        assert!(commit.triggered.contains(consumer));
        assert_eq!(commit.dropped_keys, 1);
        assert_eq!(table.get(None, &"k"), None);
        assert!(table.dependents(&"k").is_empty());
    }

    #[test]
    fn test_failed_update_restores_state() {
        let consumer = DependencyHandle(1);
        let table = table_with_consumer(consumer);
        table.add("p", 9);
        assert_eq!(table.get(Some(DependencyHandle(2)), &"p"), Some(9));

        let mut tx = table.transaction();
        tx.stage(["k"]);
        tx.stage_pessimistic(["p"]);
        let result = tx.execute(|| Err::<(), _>("producer failed"));

        assert_eq!(result.unwrap_err(), "producer failed");
        assert_eq!(table.get(None, &"k"), Some(1));
        assert_eq!(table.get(None, &"p"), Some(9));
        assert!(table.dependents(&"p").contains(DependencyHandle(2)));
    }
}
