//! First-completed-wins selection

use std::sync::{Arc, Mutex, PoisonError};

use crate::derive::derive_with;
use crate::store::{AsyncResult, AsyncStore};

/// The value of whichever store completes first
///
/// Once a value is found it is kept for the lifetime of the returned store
/// and later source changes are not notified. Until then the race is
/// pending, unless every source has errored, in which case it carries the
/// first error.
pub fn race<T>(stores: Vec<AsyncStore<T>>) -> AsyncStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    let winner: Arc<Mutex<Option<T>>> = Arc::default();

    // `None` once a winner has been published
    let pick = move |results: &[AsyncResult<T>]| {
        let mut winner = winner.lock().unwrap_or_else(PoisonError::into_inner);
        if winner.is_some() {
            return None;
        }
        if let Some(value) = results.iter().find_map(AsyncResult::value) {
            *winner = Some(value.clone());
            return Some(AsyncResult::Complete(value.clone()));
        }
        Some(match results.first() {
            Some(AsyncResult::Error(error)) if results.iter().all(AsyncResult::is_error) => {
                AsyncResult::Error(error.clone())
            }
            _ => AsyncResult::Pending,
        })
    };

    let current: Vec<AsyncResult<T>> = stores.iter().map(|store| store.get()).collect();
    let initial = pick(&current).unwrap_or(AsyncResult::Pending);
    derive_with(stores, initial, move |results, ctx| {
        if let Some(result) = pick(results) {
            ctx.set(result);
        }
    })
}
