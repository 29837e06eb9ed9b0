//! Derivation operators
//!
//! All operators here share one engine: on activation it subscribes to the
//! sources in order, and every time all of them hold a value it recomputes.
//! A recomputation may publish a value directly, follow a nested store, or
//! await a future. Only the most recent recomputation may publish: the
//! previous nested subscription or task is released before the next one is
//! created, and results from stale generations are dropped.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::warn;

use crate::error::Result;
use crate::store::{AsyncResult, AsyncStore, Setter, Store, Subscription, Teardown};
use crate::task;

/// What a derivation step produces
pub enum Step<U> {
    /// A settled result, published immediately
    Ready(AsyncResult<U>),
    /// A store to follow until the next recomputation
    Store(AsyncStore<U>),
    /// A future; the derived store is pending until it resolves
    Future(BoxFuture<'static, Result<U>>),
}

impl<U: Clone + Send + Sync + 'static> Step<U> {
    pub fn value(value: U) -> Self {
        Step::Ready(AsyncResult::Complete(value))
    }

    pub fn store(store: AsyncStore<U>) -> Self {
        Step::Store(store)
    }

    pub fn future(future: impl Future<Output = Result<U>> + Send + 'static) -> Self {
        Step::Future(future.boxed())
    }

    /// Transform the value this step eventually produces
    pub fn map<V>(self, f: impl Fn(U) -> V + Send + Sync + 'static) -> Step<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        match self {
            Step::Ready(result) => Step::Ready(result.map(f)),
            Step::Store(store) => Step::Store(map_completed(store, f)),
            Step::Future(future) => Step::Future(future.map(move |r| r.map(f)).boxed()),
        }
    }
}

impl<U> From<AsyncStore<U>> for Step<U> {
    fn from(store: AsyncStore<U>) -> Self {
        Step::Store(store)
    }
}

impl<U> From<Result<U>> for Step<U> {
    fn from(result: Result<U>) -> Self {
        Step::Ready(result.into())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared<S> {
    active: bool,
    initializing: bool,
    generation: u64,
    values: Vec<Option<S>>,
    /// Nested subscription or task owned by the current generation
    nested: Option<Teardown>,
}

/// Publishing handle given to a derivation handler for one recomputation
pub(crate) struct DeriveCtx<S, O> {
    setter: Setter<O>,
    shared: Arc<Mutex<Shared<S>>>,
    generation: u64,
}

impl<S, O> Clone for DeriveCtx<S, O> {
    fn clone(&self) -> Self {
        Self {
            setter: self.setter.clone(),
            shared: self.shared.clone(),
            generation: self.generation,
        }
    }
}

impl<S, O> DeriveCtx<S, O>
where
    S: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    /// Publish `value` if no newer recomputation or teardown has happened
    ///
    /// The generation check runs under the output store's lock, so a stale
    /// recomputation can never land after a newer one.
    pub(crate) fn set(&self, value: O) {
        let shared = &self.shared;
        let generation = self.generation;
        self.setter.set_if(value, || {
            let shared = lock(shared);
            shared.active && shared.generation == generation
        });
    }

    /// Publish every value of `store` until the next recomputation
    pub(crate) fn follow(&self, store: &Store<O>) {
        let ctx = self.clone();
        let subscription: Subscription = store.subscribe(move |value| ctx.set(value.clone()));
        self.attach(Teardown::new(move || drop(subscription)));
    }

    /// Publish the output of `future` unless a newer recomputation happens first
    pub(crate) fn spawn(&self, future: impl Future<Output = O> + Send + 'static) -> Result<()> {
        let ctx = self.clone();
        let teardown = task::spawn(async move {
            let value = future.await;
            ctx.set(value);
        })?;
        self.attach(teardown);
        Ok(())
    }

    fn attach(&self, teardown: Teardown) {
        let mut shared = lock(&self.shared);
        if shared.active && shared.generation == self.generation {
            let previous = shared.nested.replace(teardown);
            drop(shared);
            drop(previous);
        } else {
            drop(shared);
            teardown.run();
        }
    }
}

/// Shared derivation engine
///
/// `handler` runs whenever every source holds a value, with the latest
/// values in source order.
pub(crate) fn derive_with<S, O, H>(sources: Vec<Store<S>>, initial: O, handler: H) -> Store<O>
where
    S: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
    H: Fn(&[S], &DeriveCtx<S, O>) + Send + Sync + 'static,
{
    let handler = Arc::new(handler);

    Store::readable(initial, move |setter| {
        let count = sources.len();
        let shared = Arc::new(Mutex::new(Shared {
            active: true,
            initializing: true,
            generation: 0,
            values: (0..count).map(|_| None).collect(),
            nested: None,
        }));

        let recompute: Arc<dyn Fn() + Send + Sync> = {
            let shared = shared.clone();
            let handler = handler.clone();
            Arc::new(move || {
                let (generation, previous, values) = {
                    let mut state = lock(&shared);
                    if !state.active {
                        return;
                    }
                    state.generation += 1;
                    let values: Vec<S> = state.values.iter().flatten().cloned().collect();
                    (state.generation, state.nested.take(), values)
                };
                // Release the previous nested source before following a new one
                drop(previous);

                if values.len() != count {
                    return;
                }
                let ctx = DeriveCtx {
                    setter: setter.clone(),
                    shared: shared.clone(),
                    generation,
                };
                handler(&values, &ctx);
            })
        };

        let subscriptions: Vec<Subscription> = sources
            .iter()
            .enumerate()
            .map(|(index, source)| {
                let shared = shared.clone();
                let recompute = recompute.clone();
                source.subscribe(move |value: &S| {
                    let ready = {
                        let mut state = lock(&shared);
                        state.values[index] = Some(value.clone());
                        !state.initializing && state.values.iter().all(Option::is_some)
                    };
                    if ready {
                        recompute();
                    }
                })
            })
            .collect();

        lock(&shared).initializing = false;
        recompute();

        Teardown::new(move || {
            drop(subscriptions);
            let nested = {
                let mut state = lock(&shared);
                state.active = false;
                state.generation += 1;
                state.nested.take()
            };
            drop(nested);
        })
    })
}

/// Synchronous derivation over any number of stores of the same type
///
/// The initial value is computed from the sources' current values.
pub fn derived<S, U>(
    sources: Vec<Store<S>>,
    f: impl Fn(&[S]) -> U + Send + Sync + 'static,
) -> Store<U>
where
    S: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    let current: Vec<S> = sources.iter().map(Store::get).collect();
    let initial = f(&current);
    derive_with(sources, initial, move |values, ctx| ctx.set(f(values)))
}

/// Derive an async store from any number of stores
///
/// `f` may return a ready value, a store to follow, or a future to await.
pub fn derive<S, U>(
    sources: Vec<Store<S>>,
    f: impl Fn(&[S]) -> Step<U> + Send + Sync + 'static,
) -> AsyncStore<U>
where
    S: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    derive_with(sources, AsyncResult::Pending, move |values, ctx| {
        run_step(f(values), ctx)
    })
}

fn run_step<S, U>(step: Step<U>, ctx: &DeriveCtx<S, AsyncResult<U>>)
where
    S: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    match step {
        Step::Ready(result) => ctx.set(result),
        Step::Store(store) => ctx.follow(&store),
        Step::Future(future) => {
            ctx.set(AsyncResult::Pending);
            if let Err(error) = ctx.spawn(future.map(AsyncResult::from)) {
                warn!(%error, "Could not spawn derived future");
                ctx.set(AsyncResult::Error(error));
            }
        }
    }
}

/// Follow the store returned by `f` for the latest value of `store`
pub fn derive_store<S, U>(
    store: Store<S>,
    f: impl Fn(&S) -> Store<U> + Send + Sync + 'static,
) -> Store<U>
where
    S: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    let initial = f(&store.get()).get();
    derive_with(vec![store], initial, move |values, ctx| {
        ctx.follow(&f(&values[0]));
    })
}

/// Derive from an async store once it completes
///
/// Pending and error states of the source pass through without calling `f`.
pub fn async_derived<T, U>(
    store: AsyncStore<T>,
    f: impl Fn(T) -> Step<U> + Send + Sync + 'static,
) -> AsyncStore<U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    derive(vec![store], move |values| match &values[0] {
        AsyncResult::Pending => Step::Ready(AsyncResult::Pending),
        AsyncResult::Error(error) => Step::Ready(AsyncResult::Error(error.clone())),
        AsyncResult::Complete(value) => f(value.clone()),
    })
}

/// Transform the value of an async store when it is complete
pub fn map_completed<T, U>(
    store: AsyncStore<T>,
    f: impl Fn(T) -> U + Send + Sync + 'static,
) -> AsyncStore<U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    async_derived(store, move |value| Step::value(f(value)))
}

/// Follow the async store built from the completed value of `store`
pub fn async_derive_store<T, U>(
    store: AsyncStore<T>,
    f: impl Fn(T) -> AsyncStore<U> + Send + Sync + 'static,
) -> AsyncStore<U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    async_derived(store, move |value| Step::Store(f(value)))
}

/// Pair the value of `store` with the value of the store derived from it
pub fn async_derive_and_join<T, U>(
    store: AsyncStore<T>,
    f: impl Fn(T) -> AsyncStore<U> + Send + Sync + 'static,
) -> AsyncStore<(T, U)>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    async_derived(store, move |value: T| {
        let derived = f(value.clone());
        Step::Store(map_completed(derived, move |u| (value.clone(), u)))
    })
}

impl<S: Clone + Send + Sync + 'static> Store<S> {
    /// Synchronously map every value of this store
    pub fn map<U>(&self, f: impl Fn(&S) -> U + Send + Sync + 'static) -> Store<U>
    where
        U: Clone + Send + Sync + 'static,
    {
        derived(vec![self.clone()], move |values| f(&values[0]))
    }
}
