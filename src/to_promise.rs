//! Awaiting a store's first settled result

use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;

use crate::error::{Result, StoreError};
use crate::store::{AsyncResult, AsyncStore};

/// Subscribe to `store` until it completes or errors, then unsubscribe
///
/// Every call subscribes on its own, so a lazy store is activated (and
/// deactivated again) once per call.
pub async fn to_promise<T>(store: &AsyncStore<T>) -> Result<T>
where
    T: Clone + Send + Sync + 'static,
{
    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));

    let subscription = store.subscribe(move |result: &AsyncResult<T>| {
        let outcome = match result {
            AsyncResult::Pending => return,
            AsyncResult::Complete(value) => Ok(value.clone()),
            AsyncResult::Error(error) => Err(error.clone()),
        };
        if let Some(tx) = tx.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = tx.send(outcome);
        }
    });

    let outcome = rx.await.map_err(|_| StoreError::Closed);
    subscription.unsubscribe();
    outcome?
}
