//! Push-based observable stores
//!
//! A [`Store<T>`] holds a current value and a list of subscribers. New
//! subscribers immediately receive the current value, and every
//! [`Setter::set`] is delivered to the subscribers present when it was
//! issued, in subscription order. Deliveries for one store are queued and
//! run one at a time, so if another thread is mid-delivery the value is
//! handed to that thread and `set` returns before it is delivered.
//!
//! Stores are lazy: the activation hook given to [`Store::readable`] runs
//! when the subscriber count goes from zero to one, and the [`Teardown`] it
//! returns runs when the count drops back to zero. No work happens while
//! nobody is subscribed.
//!
//! ```rust,ignore
//! use holochain_stores::{Store, Teardown};
//!
//! let clock = Store::readable(0u64, |set| {
//!     let handle = tokio::spawn(async move {
//!         let mut ticks = 0;
//!         loop {
//!             tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!             ticks += 1;
//!             set.set(ticks);
//!         }
//!     });
//!     Teardown::new(move || handle.abort())
//! });
//!
//! let subscription = clock.subscribe(|ticks| println!("{ticks}"));
//! // Dropping the subscription stops the task
//! drop(subscription);
//! ```

mod async_result;

pub use async_result::AsyncResult;

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::warn;

/// A store of [`AsyncResult`] values
pub type AsyncStore<T> = Store<AsyncResult<T>>;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;
type StartFn<T> = Box<dyn Fn(Setter<T>) -> Teardown + Send + Sync>;

/// Cleanup returned by an activation hook
///
/// Runs exactly once: either when the last subscriber leaves, or when the
/// teardown is dropped without having run.
#[must_use = "dropping a Teardown runs it immediately"]
pub struct Teardown(Option<Box<dyn FnOnce() + Send>>);

impl Teardown {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    /// A teardown that does nothing
    pub fn none() -> Self {
        Self(None)
    }

    /// Combine two teardowns, running `self` first
    pub fn and(mut self, mut other: Teardown) -> Self {
        match (self.0.take(), other.0.take()) {
            (Some(first), Some(second)) => Self::new(move || {
                first();
                second();
            }),
            (Some(only), None) | (None, Some(only)) => Self(Some(only)),
            (None, None) => Self(None),
        }
    }

    pub fn run(self) {
        drop(self)
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

struct State<T> {
    value: T,
    subscribers: Vec<(u64, Callback<T>)>,
    next_id: u64,
    /// Set once the activation hook has returned, cleared on deactivation
    started: bool,
    teardown: Option<Teardown>,
    /// A delivery loop is running; further deliveries queue behind it
    notifying: bool,
    queued: VecDeque<Delivery<T>>,
}

/// A value and the subscribers it goes to, fixed when it was queued
struct Delivery<T> {
    value: T,
    targets: Vec<(u64, Callback<T>)>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    start: Option<StartFn<T>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn deliver<T>(callback: &Callback<T>, value: &T) {
    if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
        warn!("Store subscriber panicked, continuing with remaining subscribers");
    }
}

impl<T: Clone + Send + Sync + 'static> Inner<T> {
    fn set(&self, value: T) {
        self.set_if(value, || true);
    }

    /// Record and deliver `value` if `keep` holds, checked under the
    /// store lock
    fn set_if(&self, value: T, keep: impl FnOnce() -> bool) {
        let mut state = lock(&self.state);
        if !keep() {
            return;
        }
        state.value = value.clone();

        // Values set while inactive (or during activation) are only
        // recorded; the next subscriber gets them through the replay.
        if !state.started || state.subscribers.is_empty() {
            return;
        }
        let targets = state.subscribers.clone();
        self.dispatch(state, Delivery { value, targets });
    }

    /// Queue `delivery` and, unless another loop is already running,
    /// deliver everything queued in order
    ///
    /// Replays and sets share the queue, so every subscriber sees values
    /// in the order the store recorded them.
    fn dispatch<'a>(&'a self, mut state: MutexGuard<'a, State<T>>, delivery: Delivery<T>) {
        state.queued.push_back(delivery);
        if state.notifying {
            return;
        }
        state.notifying = true;

        while let Some(Delivery { value, targets }) = state.queued.pop_front() {
            drop(state);
            for (id, callback) in targets {
                let still_subscribed = lock(&self.state)
                    .subscribers
                    .iter()
                    .any(|(sub_id, _)| *sub_id == id);
                if still_subscribed {
                    deliver(&callback, &value);
                }
            }
            state = lock(&self.state);
        }
        state.notifying = false;
    }

    fn unsubscribe(&self, id: u64) {
        let teardown = {
            let mut state = lock(&self.state);
            state.subscribers.retain(|(sub_id, _)| *sub_id != id);
            if state.subscribers.is_empty() && state.started {
                state.started = false;
                state.queued.clear();
                state.teardown.take()
            } else {
                None
            }
        };
        // Runs outside the lock: teardowns commonly set a reset value
        drop(teardown);
    }
}

/// Handle used by activation hooks and tasks to publish new values
///
/// Holds only a weak reference: once the store is gone, `set` is a no-op.
pub struct Setter<T> {
    inner: Weak<Inner<T>>,
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Setter<T> {
    pub fn set(&self, value: T) {
        if let Some(inner) = self.inner.upgrade() {
            inner.set(value);
        }
    }

    /// Set `value` only if `keep` holds when the store lock is taken
    ///
    /// `keep` runs under the store lock and must not touch this store.
    pub(crate) fn set_if(&self, value: T, keep: impl FnOnce() -> bool) {
        if let Some(inner) = self.inner.upgrade() {
            inner.set_if(value, keep);
        }
    }

    /// Whether the store this setter writes to still exists
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

/// Active subscription to a store
///
/// Unsubscribes when dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self)
    }

    /// Keep the subscription alive for the rest of the program
    pub fn detach(mut self) {
        self.unsubscribe = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

/// A lazily activated observable value
pub struct Store<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subscribers = lock(&self.inner.state).subscribers.len();
        f.debug_struct("Store")
            .field("subscribers", &subscribers)
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Store<T> {
    fn from_parts(initial: T, start: Option<StartFn<T>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    value: initial,
                    subscribers: Vec::new(),
                    next_id: 0,
                    started: false,
                    teardown: None,
                    notifying: false,
                    queued: VecDeque::new(),
                }),
                start,
            }),
        }
    }

    /// A store that runs `start` on its first subscriber
    ///
    /// Values set from inside `start` before it returns are not notified
    /// individually; the first subscriber receives the latest one.
    pub fn readable(
        initial: T,
        start: impl Fn(Setter<T>) -> Teardown + Send + Sync + 'static,
    ) -> Self {
        Self::from_parts(initial, Some(Box::new(start)))
    }

    /// A store whose value never changes
    pub fn constant(value: T) -> Self {
        Self::from_parts(value, None)
    }

    /// Register `callback`, replaying the current value to it immediately
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let callback: Callback<T> = Arc::new(callback);

        let (id, activate) = {
            let mut state = lock(&self.inner.state);
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.push((id, callback.clone()));
            (id, state.subscribers.len() == 1 && !state.started)
        };

        if activate {
            let teardown = match &self.inner.start {
                Some(start) => start(self.setter()),
                None => Teardown::none(),
            };
            let mut state = lock(&self.inner.state);
            if state.subscribers.is_empty() {
                // Unsubscribed while the activation hook was running
                drop(state);
                teardown.run();
            } else {
                state.started = true;
                state.teardown = Some(teardown);
            }
        }

        // The replay queues behind any delivery already in progress
        let state = lock(&self.inner.state);
        if state.subscribers.iter().any(|(sub_id, _)| *sub_id == id) {
            let value = state.value.clone();
            self.inner.dispatch(
                state,
                Delivery {
                    value,
                    targets: vec![(id, callback)],
                },
            );
        } else {
            drop(state);
        }

        let inner = self.inner.clone();
        Subscription {
            unsubscribe: Some(Box::new(move || inner.unsubscribe(id))),
        }
    }

    /// Current value, without activating the store
    pub fn get(&self) -> T {
        lock(&self.inner.state).value.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.state).subscribers.len()
    }

    /// Whether the activation hook is currently live
    pub fn is_active(&self) -> bool {
        lock(&self.inner.state).started
    }

    /// Subscribe with a no-op callback, keeping the store active until the
    /// returned subscription is dropped
    pub fn keep_alive(&self) -> Subscription {
        self.subscribe(|_| {})
    }

    /// Keep this store active for the rest of the program
    pub fn always_subscribed(self) -> Self {
        self.keep_alive().detach();
        self
    }

    pub(crate) fn setter(&self) -> Setter<T> {
        Setter {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> AsyncStore<T> {
    /// An async store that is already complete
    pub fn completed(value: T) -> Self {
        Self::constant(AsyncResult::Complete(value))
    }
}

/// A store that can be set from outside
pub struct Writable<T> {
    store: Store<T>,
}

impl<T> Clone for Writable<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Writable<T> {
    pub fn new(initial: T) -> Self {
        Self {
            store: Store::from_parts(initial, None),
        }
    }

    pub fn set(&self, value: T) {
        self.store.inner.set(value);
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.store.get());
        self.set(next);
    }

    /// Read-only view of this store
    pub fn store(&self) -> Store<T> {
        self.store.clone()
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.store.subscribe(callback)
    }

    pub fn get(&self) -> T {
        self.store.get()
    }
}

impl<T> From<Writable<T>> for Store<T> {
    fn from(writable: Writable<T>) -> Self {
        writable.store
    }
}
