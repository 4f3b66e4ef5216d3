use std::collections::BTreeSet;
use std::sync::Arc;

/// DependencyHandle is a small stable token for an interned dependency descriptor.
///
/// Handles are minted by [`KeyRegistry::register`](crate::KeyRegistry::register) and are
/// valid for the lifetime of the registry that minted them. Equal descriptors always
/// receive equal handles, so handles can be compared, hashed, and stored in place of
/// the descriptors they stand for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DependencyHandle(pub u32);

impl DependencyHandle {
    /// The position of this handle in the registry's mint order.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// HandleSet is an ordered set of dependency handles.
///
/// Clone is cheap as the set is wrapped by `Arc`. Iteration is in handle order,
/// which makes every consumer of a set deterministic within one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleSet(Arc<BTreeSet<DependencyHandle>>);

impl Default for HandleSet {
    fn default() -> Self {
        HandleSet(Default::default())
    }
}

impl FromIterator<DependencyHandle> for HandleSet {
    fn from_iter<T: IntoIterator<Item = DependencyHandle>>(iter: T) -> Self {
        HandleSet(Arc::new(iter.into_iter().collect()))
    }
}

impl HandleSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns true if there are no handles in the set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of handles in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set contains the handle.
    pub fn contains(&self, handle: DependencyHandle) -> bool {
        self.0.contains(&handle)
    }

    /// Returns a new set with the handle added.
    #[must_use]
    pub fn added(&self, handle: DependencyHandle) -> Self {
        let mut handles = BTreeSet::clone(&self.0);
        handles.insert(handle);
        HandleSet(Arc::new(handles))
    }

    /// Returns the union of this set and another.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let mut handles = BTreeSet::clone(&self.0);
        handles.extend(other.iter());
        HandleSet(Arc::new(handles))
    }

    /// Iterate over the handles in handle order.
    pub fn iter(&self) -> impl Iterator<Item = DependencyHandle> + '_ {
        self.0.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_added_does_not_mutate_original() {
        let set = HandleSet::new();
        let grown = set.added(DependencyHandle(3));
        assert!(set.is_empty());
        assert!(grown.contains(DependencyHandle(3)));
    }

    #[test]
    fn test_union_is_ordered_and_deduplicated() {
        let left = HandleSet::from_iter([DependencyHandle(4), DependencyHandle(1)]);
        let right = HandleSet::from_iter([DependencyHandle(1), DependencyHandle(2)]);
        let union = left.union(&right);
        let handles: Vec<_> = union.iter().collect();
        assert_eq!(
            handles,
            vec![DependencyHandle(1), DependencyHandle(2), DependencyHandle(4)]
        );
    }
}
