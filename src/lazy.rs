//! Stores that load on first subscription

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::Result;
use crate::holochain::fetch::{shared, Fetch};
use crate::store::{AsyncResult, AsyncStore, Setter, Store, Teardown};
use crate::task;

fn spawn_or_error<T>(
    setter: &Setter<AsyncResult<T>>,
    future: impl Future<Output = ()> + Send + 'static,
) -> Teardown
where
    T: Clone + Send + Sync + 'static,
{
    task::spawn(future).unwrap_or_else(|error| {
        setter.set(AsyncResult::Error(error));
        Teardown::none()
    })
}

/// One activation of an [`async_readable`] store
#[derive(Default)]
struct Activation {
    closed: bool,
    cleanup: Option<Teardown>,
}

fn lock(activation: &Mutex<Activation>) -> MutexGuard<'_, Activation> {
    activation.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Publishes completed values into an [`async_readable`] store
///
/// Values set after the activation that created it has ended are dropped.
pub struct CompleteSetter<T> {
    setter: Setter<AsyncResult<T>>,
    activation: Arc<Mutex<Activation>>,
}

impl<T> Clone for CompleteSetter<T> {
    fn clone(&self) -> Self {
        Self {
            setter: self.setter.clone(),
            activation: self.activation.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> CompleteSetter<T> {
    pub fn set(&self, value: T) {
        let activation = &self.activation;
        self.setter
            .set_if(AsyncResult::Complete(value), || !lock(activation).closed);
    }
}

/// An async store driven by `load`
///
/// Each time the store gains its first subscriber, `load` runs with a
/// [`CompleteSetter`]. Every value it sets is published as complete. If
/// `load` fails, its error becomes the store's value. The teardown it
/// resolves to runs when the last subscriber leaves.
pub fn async_readable<T, F, Fut>(load: F) -> AsyncStore<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(CompleteSetter<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Teardown>> + Send + 'static,
{
    let load = Arc::new(load);
    Store::readable(AsyncResult::Pending, move |setter| {
        let activation: Arc<Mutex<Activation>> = Arc::default();
        let complete = CompleteSetter {
            setter: setter.clone(),
            activation: activation.clone(),
        };
        let load = load.clone();
        let task_setter = setter.clone();
        let task_activation = activation.clone();

        let task = spawn_or_error(&setter, async move {
            match load(complete).await {
                Ok(cleanup) => {
                    let mut state = lock(&task_activation);
                    if state.closed {
                        drop(state);
                        cleanup.run();
                    } else {
                        state.cleanup = Some(cleanup);
                    }
                }
                Err(error) => {
                    warn!(%error, "Async store loader failed");
                    task_setter.set(AsyncResult::Error(error));
                }
            }
        });

        task.and(Teardown::new(move || {
            let cleanup = {
                let mut state = lock(&activation);
                state.closed = true;
                state.cleanup.take()
            };
            if let Some(cleanup) = cleanup {
                cleanup.run();
            }
        }))
    })
}

/// Run `load` each time the store gains its first subscriber
pub fn lazy_load<T>(load: impl Fetch<T>) -> AsyncStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    let load = shared(load);
    Store::readable(AsyncResult::Pending, move |setter| {
        let load = load.clone();
        let task_setter = setter.clone();
        spawn_or_error(&setter, async move {
            task_setter.set(load.fetch().await.into());
        })
    })
}

/// Like [`lazy_load`], then reload every `interval` while subscribed
///
/// A failed first load is surfaced and ends polling for this activation.
/// Later failures are ignored, and a reload only notifies when the value
/// differs from the current one.
pub fn lazy_load_and_poll<T>(load: impl Fetch<T>, interval: Duration) -> AsyncStore<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let load = shared(load);
    Store::readable(AsyncResult::Pending, move |setter| {
        let load = load.clone();
        let task_setter = setter.clone();
        spawn_or_error(&setter, async move {
            let mut current = match load.fetch().await {
                Ok(value) => value,
                Err(error) => {
                    task_setter.set(AsyncResult::Error(error));
                    return;
                }
            };
            task_setter.set(AsyncResult::Complete(current.clone()));

            loop {
                tokio::time::sleep(interval).await;
                match load.fetch().await {
                    Ok(value) if value != current => {
                        current = value;
                        task_setter.set(AsyncResult::Complete(current.clone()));
                    }
                    Ok(_) => {}
                    Err(error) => debug!(%error, "Ignoring failed reload"),
                }
            }
        })
    })
}
