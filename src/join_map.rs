//! Joining maps of async stores keyed by hash

use crate::derive::map_completed;
use crate::holochain::{slice, GetOnlyMap, HoloHash, HoloHashMap};
use crate::join::{join_async, JoinOptions};
use crate::store::{AsyncStore, Store};

/// Join a map of async stores into an async store of the map of their values
///
/// Error and pending policies behave as in [`join_async`]; filtered-out
/// entries are missing from the resulting map. Keys in the result are the
/// original hashes.
pub fn join_async_map<V>(
    map: HoloHashMap<AsyncStore<V>>,
    options: JoinOptions,
) -> AsyncStore<HoloHashMap<V>>
where
    V: Clone + Send + Sync + 'static,
{
    let stores: Vec<AsyncStore<(HoloHash, V)>> = map
        .into_iter()
        .map(|(key, store)| {
            store.map(move |result| result.clone().map(|value| (key.clone(), value)))
        })
        .collect();

    map_completed(join_async(stores, options), |entries| entries.into_iter().collect())
}

/// Build a store for every entry of `map` and join them
pub fn map_and_join<T, U>(
    map: &HoloHashMap<T>,
    f: impl Fn(&HoloHash, &T) -> AsyncStore<U>,
    options: JoinOptions,
) -> AsyncStore<HoloHashMap<U>>
where
    U: Clone + Send + Sync + 'static,
{
    join_async_map(map.map_values(f), options)
}

/// Join the stores of `map` for the given hashes
///
/// Entries whose store completes with `None` are left out of the result.
pub fn slice_and_join<V>(
    map: &impl GetOnlyMap<AsyncStore<Option<V>>>,
    hashes: &[HoloHash],
    options: JoinOptions,
) -> AsyncStore<HoloHashMap<V>>
where
    V: Clone + Send + Sync + 'static,
{
    let joined = join_async_map(slice(map, hashes), options);
    map_completed(joined, |found| {
        found
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key, value)))
            .collect()
    })
}

/// Join plain stores of a hash map, without pending or error states
pub fn join_map<V>(map: HoloHashMap<Store<V>>) -> Store<HoloHashMap<V>>
where
    V: Clone + Send + Sync + 'static,
{
    let (keys, stores): (Vec<HoloHash>, Vec<Store<V>>) = map.into_iter().unzip();
    crate::derive::derived(stores, move |values| {
        keys.iter().cloned().zip(values.iter().cloned()).collect()
    })
}
