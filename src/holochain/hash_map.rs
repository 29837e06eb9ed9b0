//! Maps keyed by hash content
//!
//! [`HoloHashMap`] indexes by the canonical string form of each key so two
//! hashes with the same bytes always land on the same slot, and decodes the
//! index back into the original key type when handing keys out.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use super::hash::HoloHash;

/// A map from hashes to values, with one entry per hash content
#[derive(Clone, PartialEq, Eq)]
pub struct HoloHashMap<V> {
    entries: BTreeMap<String, V>,
}

impl<V> Default for HoloHashMap<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V: std::fmt::Debug> std::fmt::Debug for HoloHashMap<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

fn decode_key(key: &str) -> Option<HoloHash> {
    match HoloHash::from_base64(key) {
        Ok(hash) => Some(hash),
        Err(error) => {
            // Keys are only ever written through `insert`
            warn!(%error, key, "Skipping undecodable key in hash map");
            None
        }
    }
}

impl<V> HoloHashMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` for `key`, returning the value it replaced
    pub fn insert(&mut self, key: HoloHash, value: V) -> Option<V> {
        self.entries.insert(key.to_base64(), value)
    }

    pub fn get(&self, key: &HoloHash) -> Option<&V> {
        self.entries.get(&key.to_base64())
    }

    pub fn get_mut(&mut self, key: &HoloHash) -> Option<&mut V> {
        self.entries.get_mut(&key.to_base64())
    }

    pub fn contains_key(&self, key: &HoloHash) -> bool {
        self.entries.contains_key(&key.to_base64())
    }

    pub fn remove(&mut self, key: &HoloHash) -> Option<V> {
        self.entries.remove(&key.to_base64())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn keys(&self) -> impl Iterator<Item = HoloHash> + '_ {
        self.entries.keys().filter_map(|key| decode_key(key))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (HoloHash, &V)> {
        self.entries
            .iter()
            .filter_map(|(key, value)| decode_key(key).map(|hash| (hash, value)))
    }

    /// A new map with every value transformed, keeping the keys
    pub fn map_values<U>(&self, mut f: impl FnMut(&HoloHash, &V) -> U) -> HoloHashMap<U> {
        self.iter()
            .map(|(key, value)| {
                let mapped = f(&key, value);
                (key, mapped)
            })
            .collect()
    }
}

impl<V> FromIterator<(HoloHash, V)> for HoloHashMap<V> {
    /// Later entries win when a hash appears more than once
    fn from_iter<I: IntoIterator<Item = (HoloHash, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<V> Extend<(HoloHash, V)> for HoloHashMap<V> {
    fn extend<I: IntoIterator<Item = (HoloHash, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<V> IntoIterator for HoloHashMap<V> {
    type Item = (HoloHash, V);
    type IntoIter = std::vec::IntoIter<(HoloHash, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries
            .into_iter()
            .filter_map(|(key, value)| decode_key(&key).map(|hash| (hash, value)))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

/// Read-only lookup by hash
pub trait GetOnlyMap<V> {
    fn get(&self, key: &HoloHash) -> V;
}

type Constructor<V> = Box<dyn Fn(&HoloHash) -> V + Send + Sync>;

/// A map that builds each value on first access and memoises it
///
/// Typically holds one store per hash, so every caller asking for the same
/// hash shares one store (and one set of network requests).
pub struct LazyHoloHashMap<V> {
    built: Arc<Mutex<HoloHashMap<V>>>,
    new_value: Arc<Constructor<V>>,
}

impl<V> Clone for LazyHoloHashMap<V> {
    fn clone(&self) -> Self {
        Self {
            built: self.built.clone(),
            new_value: self.new_value.clone(),
        }
    }
}

impl<V: Clone> LazyHoloHashMap<V> {
    pub fn new(new_value: impl Fn(&HoloHash) -> V + Send + Sync + 'static) -> Self {
        Self {
            built: Arc::new(Mutex::new(HoloHashMap::new())),
            new_value: Arc::new(Box::new(new_value)),
        }
    }

    /// Number of values built so far
    pub fn built_count(&self) -> usize {
        self.built.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl<V: Clone> GetOnlyMap<V> for LazyHoloHashMap<V> {
    fn get(&self, key: &HoloHash) -> V {
        if let Some(existing) = self
            .built
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return existing.clone();
        }

        // Build outside the lock: constructors may look up other keys
        let value = (self.new_value)(key);
        let mut built = self.built.lock().unwrap_or_else(PoisonError::into_inner);
        built.get(key).cloned().unwrap_or_else(|| {
            built.insert(key.clone(), value.clone());
            value
        })
    }
}

/// The values of `map` for the given keys
pub fn slice<V>(map: &impl GetOnlyMap<V>, keys: &[HoloHash]) -> HoloHashMap<V> {
    keys.iter().map(|key| (key.clone(), map.get(key))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holochain::hash::HashType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn hash(byte: u8) -> HoloHash {
        HoloHash::from_parts(HashType::Entry, [byte; 32], [0; 4])
    }

    #[test]
    fn test_equal_bytes_share_one_entry() {
        let mut map = HoloHashMap::new();
        map.insert(hash(1), "first");
        map.insert(HoloHash::from_raw(hash(1).into_bytes()), "second");

        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&hash(1)), Some(&"second"));
    }

    #[test]
    fn test_iteration_returns_original_keys() {
        let map: HoloHashMap<u32> = vec![(hash(1), 1), (hash(2), 2)].into_iter().collect();
        let mut keys: Vec<HoloHash> = map.keys().collect();
        keys.sort();
        assert_eq!(keys, vec![hash(1), hash(2)]);
        assert!(map.iter().all(|(key, value)| key == hash(*value as u8)));
    }

    #[test]
    fn test_from_iter_last_write_wins() {
        let map: HoloHashMap<u32> = vec![(hash(1), 1), (hash(1), 10)].into_iter().collect();
        assert_eq!(map.into_iter().collect::<Vec<_>>(), vec![(hash(1), 10)]);
    }

    #[test]
    fn test_lazy_map_builds_each_key_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let lazy = LazyHoloHashMap::new(move |key: &HoloHash| {
            counter.fetch_add(1, Ordering::SeqCst);
            key.as_bytes()[3]
        });

        assert_eq!(lazy.get(&hash(4)), 4);
        assert_eq!(lazy.get(&hash(4)), 4);
        assert_eq!(lazy.get(&hash(5)), 5);
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(lazy.built_count(), 2);
    }

    #[test]
    fn test_slice_picks_requested_keys() {
        let lazy = LazyHoloHashMap::new(|key: &HoloHash| key.as_bytes()[3]);
        let sliced = slice(&lazy, &[hash(7), hash(8), hash(7)]);
        assert_eq!(sliced.len(), 2);
        assert_eq!(sliced.get(&hash(8)), Some(&8));
    }
}
