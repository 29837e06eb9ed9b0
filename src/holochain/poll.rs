//! Shared poll and push engine for remote-state stores
//!
//! Every activation of a polled store opens a session. The session fetches
//! immediately, then again `interval` after each fetch settles, and applies
//! matching push signals to its cached value in between. Both paths reduce
//! their input to a canonical value and only notify when it differs from
//! the cached one.
//!
//! Signals that arrive while a fetch is in flight are recorded and replayed
//! onto the fetch result, so a snapshot taken before a signal cannot undo
//! it. Deactivation closes the session: the poll task is aborted, the
//! signal listener removed, and late fetch results are discarded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::{debug, warn};

use super::client::ZomeClient;
use super::fetch::SharedFetch;
use crate::error::Result;
use crate::store::{AsyncResult, AsyncStore, Setter, Store, Teardown};
use crate::task;

/// How one kind of store turns fetches and signals into its value
pub(crate) trait Reconcile: Send + Sync + 'static {
    type Fetched: Send + 'static;
    type Value: Clone + Send + Sync + 'static;
    type Signal: Clone + Send + Sync + 'static;

    /// Canonical value for a fetch result
    fn from_fetched(&self, fetched: Self::Fetched) -> Result<Self::Value>;

    /// Whether two canonical values count as unchanged
    fn same(&self, a: &Self::Value, b: &Self::Value) -> bool;

    /// Canonical value after `signal`, or `None` if the signal does not apply
    fn apply_signal(&self, current: &Self::Value, signal: &Self::Signal) -> Option<Self::Value>;
}

struct Cache<V, S> {
    value: Option<V>,
    /// Signals seen since the in-flight fetch started
    in_flight: Option<Vec<S>>,
    outbox: VecDeque<AsyncResult<V>>,
    publishing: bool,
}

struct Session<R: Reconcile> {
    name: &'static str,
    reconciler: Arc<R>,
    setter: Setter<AsyncResult<R::Value>>,
    active: AtomicBool,
    cache: Mutex<Cache<R::Value, R::Signal>>,
}

type CacheGuard<'a, R> = MutexGuard<'a, Cache<<R as Reconcile>::Value, <R as Reconcile>::Signal>>;

impl<R: Reconcile> Session<R> {
    fn lock(&self) -> CacheGuard<'_, R> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn begin_fetch(&self) -> bool {
        let mut cache = self.lock();
        if !self.is_active() {
            return false;
        }
        cache.in_flight = Some(Vec::new());
        true
    }

    fn finish_fetch(&self, result: Result<R::Fetched>) {
        let mut cache = self.lock();
        if !self.is_active() {
            debug!(store = self.name, "Discarding fetch result of closed session");
            return;
        }
        let replay = cache.in_flight.take().unwrap_or_default();

        match result.and_then(|fetched| self.reconciler.from_fetched(fetched)) {
            Ok(mut value) => {
                for signal in &replay {
                    if let Some(next) = self.reconciler.apply_signal(&value, signal) {
                        value = next;
                    }
                }
                if !replay.is_empty() {
                    debug!(
                        store = self.name,
                        replayed = replay.len(),
                        "Replayed signals onto fetch result"
                    );
                }
                self.update(&mut cache, value);
            }
            Err(error) => {
                warn!(store = self.name, %error, "Fetch failed");
                // The next successful fetch publishes again
                cache.value = None;
                cache.outbox.push_back(AsyncResult::Error(error));
            }
        }
        self.publish(cache);
    }

    fn handle_signal(&self, signal: &R::Signal) {
        let mut cache = self.lock();
        if !self.is_active() {
            return;
        }
        if let Some(replay) = cache.in_flight.as_mut() {
            replay.push(signal.clone());
        }
        // Nothing to edit until the first fetch lands; the replay covers it
        let Some(current) = cache.value.as_ref() else {
            return;
        };
        let Some(next) = self.reconciler.apply_signal(current, signal) else {
            return;
        };
        self.update(&mut cache, next);
        self.publish(cache);
    }

    fn update(&self, cache: &mut Cache<R::Value, R::Signal>, value: R::Value) {
        if let Some(current) = &cache.value {
            if self.reconciler.same(current, &value) {
                debug!(store = self.name, "Value unchanged, skipping notification");
                return;
            }
        }
        cache.value = Some(value.clone());
        cache.outbox.push_back(AsyncResult::Complete(value));
    }

    /// Deliver queued results in the order they were computed
    ///
    /// Delivery happens outside the lock. A result queued while another
    /// thread is delivering is picked up by that thread. The active check
    /// runs under the store lock, so nothing lands after `close`.
    fn publish<'a>(&'a self, mut cache: CacheGuard<'a, R>) {
        if cache.publishing {
            return;
        }
        cache.publishing = true;
        while let Some(next) = cache.outbox.pop_front() {
            if !self.is_active() {
                cache.outbox.clear();
                break;
            }
            drop(cache);
            self.setter.set_if(next, || self.is_active());
            cache = self.lock();
        }
        cache.publishing = false;
    }

    fn close(&self) {
        let mut cache = self.lock();
        self.active.store(false, Ordering::SeqCst);
        cache.value = None;
        cache.in_flight = None;
        cache.outbox.clear();
    }
}

async fn poll_loop<R: Reconcile>(
    session: Arc<Session<R>>,
    fetch: SharedFetch<R::Fetched>,
    interval: Duration,
) {
    loop {
        if !session.begin_fetch() {
            break;
        }
        let result = fetch.fetch().await;
        session.finish_fetch(result);

        if !session.is_active() {
            break;
        }
        debug!(
            store = session.name,
            interval_ms = interval.as_millis() as u64,
            "Scheduling next poll"
        );
        tokio::time::sleep(interval).await;
    }
}

/// A store that polls `fetch` and reconciles `client` signals while it has
/// subscribers
pub(crate) fn poll_store<R, C>(
    name: &'static str,
    reconciler: R,
    fetch: SharedFetch<R::Fetched>,
    client: C,
    interval: Duration,
) -> AsyncStore<R::Value>
where
    R: Reconcile,
    C: ZomeClient<R::Signal>,
{
    let reconciler = Arc::new(reconciler);

    Store::readable(AsyncResult::Pending, move |setter: Setter<AsyncResult<R::Value>>| {
        debug!(store = name, "Activating");
        // A result delivered by a closed session must not be replayed
        setter.set(AsyncResult::Pending);

        let session = Arc::new(Session {
            name,
            reconciler: reconciler.clone(),
            setter: setter.clone(),
            active: AtomicBool::new(true),
            cache: Mutex::new(Cache {
                value: None,
                in_flight: None,
                outbox: VecDeque::new(),
                publishing: false,
            }),
        });

        let listener: Weak<Session<R>> = Arc::downgrade(&session);
        let unlisten = client.on_signal(Arc::new(move |signal: &R::Signal| {
            if let Some(session) = listener.upgrade() {
                session.handle_signal(signal);
            }
        }));

        let poll = match task::spawn(poll_loop(session.clone(), fetch.clone(), interval)) {
            Ok(poll) => poll,
            Err(error) => {
                warn!(store = name, %error, "Could not start polling");
                setter.set(AsyncResult::Error(error));
                Teardown::none()
            }
        };

        Teardown::new(move || {
            session.close();
            setter.set(AsyncResult::Pending);
            debug!(store = name, "Deactivated");
        })
        .and(poll)
        .and(unlisten)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::holochain::client::SignalHub;
    use crate::holochain::fetch::shared;
    use crate::store::testing::Recorder;
    use std::sync::atomic::AtomicUsize;

    /// A sorted set of numbers; signals add (positive) or remove (negative)
    struct Numbers;

    impl Reconcile for Numbers {
        type Fetched = Vec<i32>;
        type Value = Vec<i32>;
        type Signal = i32;

        fn from_fetched(&self, mut fetched: Vec<i32>) -> Result<Vec<i32>> {
            fetched.sort_unstable();
            fetched.dedup();
            Ok(fetched)
        }

        fn same(&self, a: &Vec<i32>, b: &Vec<i32>) -> bool {
            a == b
        }

        fn apply_signal(&self, current: &Vec<i32>, signal: &i32) -> Option<Vec<i32>> {
            let mut next = current.clone();
            if *signal > 0 {
                next.push(*signal);
            } else {
                next.retain(|n| *n != -signal);
            }
            self.from_fetched(next).ok()
        }
    }

    struct Remote {
        data: Mutex<Vec<i32>>,
        calls: AtomicUsize,
        delay: Duration,
        fail: AtomicBool,
    }

    fn remote(data: Vec<i32>, delay: Duration) -> Arc<Remote> {
        Arc::new(Remote {
            data: Mutex::new(data),
            calls: AtomicUsize::new(0),
            delay,
            fail: AtomicBool::new(false),
        })
    }

    fn numbers_store(remote: &Arc<Remote>, hub: &SignalHub<i32>) -> AsyncStore<Vec<i32>> {
        let remote = remote.clone();
        let fetch = shared(move || {
            let remote = remote.clone();
            async move {
                remote.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(remote.delay).await;
                if remote.fail.load(Ordering::SeqCst) {
                    return Err(StoreError::transport("remote unavailable"));
                }
                Ok(remote.data.lock().unwrap().clone())
            }
        });
        poll_store("numbers", Numbers, fetch, hub.clone(), Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_polls_do_not_notify() {
        let remote = remote(vec![2, 1], Duration::ZERO);
        let hub = SignalHub::new();
        let store = numbers_store(&remote, &hub);

        let recorder = Recorder::new(&store);
        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert_eq!(remote.calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            recorder.values(),
            vec![AsyncResult::Pending, AsyncResult::Complete(vec![1, 2])]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_edits_cached_value() {
        let remote = remote(vec![1], Duration::ZERO);
        let hub = SignalHub::new();
        let store = numbers_store(&remote, &hub);
        let recorder = Recorder::new(&store);
        tokio::time::sleep(Duration::from_millis(10)).await;

        hub.emit(&5);
        assert_eq!(recorder.last(), Some(AsyncResult::Complete(vec![1, 5])));

        // Duplicate add is a no-op
        hub.emit(&5);
        hub.emit(&-1);
        assert_eq!(
            recorder.values(),
            vec![
                AsyncResult::Pending,
                AsyncResult::Complete(vec![1]),
                AsyncResult::Complete(vec![1, 5]),
                AsyncResult::Complete(vec![5]),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_during_fetch_survives_stale_snapshot() {
        let remote = remote(vec![1], Duration::from_millis(100));
        let hub = SignalHub::new();
        let store = numbers_store(&remote, &hub);
        let recorder = Recorder::new(&store);

        // First fetch lands at 100ms
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(recorder.last(), Some(AsyncResult::Complete(vec![1])));

        // Second fetch starts at 1150ms with a snapshot that lacks 7
        tokio::time::sleep(Duration::from_millis(1020)).await;
        hub.emit(&7);
        assert_eq!(recorder.last(), Some(AsyncResult::Complete(vec![1, 7])));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(recorder.last(), Some(AsyncResult::Complete(vec![1, 7])));
        assert_eq!(recorder.values().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_surfaces_then_recovers() {
        let remote = remote(vec![3], Duration::ZERO);
        let hub = SignalHub::new();
        let store = numbers_store(&remote, &hub);
        let recorder = Recorder::new(&store);
        tokio::time::sleep(Duration::from_millis(10)).await;

        remote.fail.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(matches!(recorder.last(), Some(AsyncResult::Error(StoreError::Transport(_)))));

        remote.fail.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(recorder.last(), Some(AsyncResult::Complete(vec![3])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deactivation_stops_polling_and_resets() {
        let remote = remote(vec![1], Duration::ZERO);
        let hub = SignalHub::new();
        let store = numbers_store(&remote, &hub);

        let recorder = Recorder::new(&store);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(hub.listener_count(), 1);
        drop(recorder);

        assert_eq!(hub.listener_count(), 0);
        assert_eq!(store.get(), AsyncResult::Pending);

        let calls = remote.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(remote.calls.load(Ordering::SeqCst), calls);

        // Reactivation fetches from scratch
        let recorder = Recorder::new(&store);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(recorder.values(), vec![AsyncResult::Pending, AsyncResult::Complete(vec![1])]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_in_flight_at_deactivation_is_discarded() {
        let remote = remote(vec![4], Duration::from_millis(100));
        let hub = SignalHub::new();
        let store = numbers_store(&remote, &hub);

        let recorder = Recorder::new(&store);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        drop(recorder);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.get(), AsyncResult::Pending);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);

        let recorder = Recorder::new(&store);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            recorder.values(),
            vec![AsyncResult::Pending, AsyncResult::Complete(vec![4])]
        );
    }

    #[test]
    fn test_activation_without_runtime_errors() {
        let remote = remote(vec![], Duration::ZERO);
        let hub = SignalHub::new();
        let store = numbers_store(&remote, &hub);
        let recorder = Recorder::new(&store);
        assert_eq!(recorder.last(), Some(AsyncResult::Error(StoreError::NoRuntime)));
    }
}
