use std::hash::Hash;

use papaya::HashMap;
use parking_lot::RwLock;

use crate::DependencyHandle;

/// KeyRegistry interns dependency descriptors and assigns them small stable handles.
///
/// Interning is idempotent: two registrations of equal descriptors yield equal
/// handles, including under concurrent registration. The reverse lookup is total
/// for every handle the registry minted.
pub struct KeyRegistry<K> {
    /// Fast path: descriptor to handle, lock-free reads.
    forward: HashMap<K, DependencyHandle, ahash::RandomState>,
    /// Mint order; the handle value indexes into this list.
    reverse: RwLock<Vec<K>>,
}

impl<K> Default for KeyRegistry<K> {
    fn default() -> Self {
        Self {
            forward: HashMap::with_hasher(ahash::RandomState::new()),
            reverse: RwLock::new(Vec::new()),
        }
    }
}

impl<K> KeyRegistry<K>
where
    K: Clone + PartialEq + Eq + Hash + Send + Sync,
{
    /// Create a new empty registry.
    pub fn new() -> Self {
        Default::default()
    }

    /// Intern a descriptor, returning its handle.
    ///
    /// The first registration of a descriptor assigns the next handle; every
    /// later registration returns the same handle.
    pub fn register(&self, key: K) -> DependencyHandle {
        if let Some(handle) = self.forward.pin().get(&key) {
            return *handle;
        }
        let mut reverse = self.reverse.write();
        // Re-check under the mint lock: another thread may have won the race.
        if let Some(handle) = self.forward.pin().get(&key) {
            return *handle;
        }
        let handle = DependencyHandle(reverse.len() as u32);
        reverse.push(key.clone());
        self.forward.pin().insert(key, handle);
        handle
    }

    /// Look up the descriptor a handle stands for.
    ///
    /// Total for handles minted by this registry; panics on a foreign handle.
    pub fn get_key(&self, handle: DependencyHandle) -> K {
        self.reverse.read()[handle.index()].clone()
    }

    /// The number of descriptors interned so far.
    pub fn len(&self) -> usize {
        self.reverse.read().len()
    }

    /// Returns true if nothing has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
