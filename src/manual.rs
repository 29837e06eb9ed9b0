//! Stores reloaded on demand

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::holochain::fetch::{shared, Fetch, SharedFetch};
use crate::store::{AsyncResult, AsyncStore, Setter, Store, Subscription, Teardown};
use crate::task;

/// An async store that loads once on first use and then only when
/// [`ManualReloadStore::reload`] is called
pub struct ManualReloadStore<T> {
    store: AsyncStore<T>,
    setter: Setter<AsyncResult<T>>,
    load: SharedFetch<T>,
    loaded: Arc<AtomicBool>,
}

impl<T> Clone for ManualReloadStore<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            setter: self.setter.clone(),
            load: self.load.clone(),
            loaded: self.loaded.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ManualReloadStore<T> {
    pub fn new(load: impl Fetch<T>) -> Self {
        let load = shared(load);
        let loaded = Arc::new(AtomicBool::new(false));

        let initial_load = load.clone();
        let initial_loaded = loaded.clone();
        let store = Store::readable(AsyncResult::Pending, move |setter| {
            if initial_loaded.load(Ordering::SeqCst) {
                return Teardown::none();
            }
            let load = initial_load.clone();
            let loaded = initial_loaded.clone();
            let task_setter = setter.clone();
            task::spawn(async move {
                let result = load.fetch().await;
                loaded.store(true, Ordering::SeqCst);
                task_setter.set(result.into());
            })
            .unwrap_or_else(|error| {
                setter.set(AsyncResult::Error(error));
                Teardown::none()
            })
        });

        Self {
            setter: store.setter(),
            store,
            load,
            loaded,
        }
    }

    /// Run the load again and publish its result
    pub async fn reload(&self) {
        debug!("Reloading store");
        let result = self.load.fetch().await;
        self.loaded.store(true, Ordering::SeqCst);
        self.setter.set(result.into());
    }

    pub fn store(&self) -> AsyncStore<T> {
        self.store.clone()
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&AsyncResult<T>) + Send + Sync + 'static,
    ) -> Subscription {
        self.store.subscribe(callback)
    }

    pub fn get(&self) -> AsyncResult<T> {
        self.store.get()
    }
}
