//! Bounded retries for eventually consistent reads

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::holochain::fetch::{shared, Fetch};
use crate::store::{AsyncResult, AsyncStore, Store, Teardown};
use crate::task;

/// Retry `fetch` until it succeeds, at most `max_retries` times
///
/// Starts on the first subscriber. Failed attempts are spaced by `interval`;
/// after the last one the store holds the last error. Once an attempt
/// succeeds the value is kept for the lifetime of the store and later
/// activations do not fetch again.
///
/// Retries only run while the store has subscribers. Losing the last
/// subscriber before success cancels the remaining attempts and resets
/// the store to pending; the next subscriber starts over.
pub fn retry_until_success<T>(
    fetch: impl Fetch<T>,
    interval: Duration,
    max_retries: u32,
) -> AsyncStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    let fetch = shared(fetch);
    let done = Arc::new(AtomicBool::new(false));
    let max_retries = max_retries.max(1);

    Store::readable(AsyncResult::Pending, move |setter| {
        if done.load(Ordering::SeqCst) {
            return Teardown::none();
        }

        let fetch = fetch.clone();
        let task_setter = setter.clone();
        let task_done = done.clone();
        let attempts = task::spawn(async move {
            for attempt in 1..=max_retries {
                match fetch.fetch().await {
                    Ok(value) => {
                        task_done.store(true, Ordering::SeqCst);
                        task_setter.set(AsyncResult::Complete(value));
                        return;
                    }
                    Err(error) if attempt < max_retries => {
                        debug!(attempt, max_retries, %error, "Fetch failed, retrying");
                        tokio::time::sleep(interval).await;
                    }
                    Err(error) => {
                        warn!(attempt, %error, "Fetch failed, giving up");
                        task_setter.set(AsyncResult::Error(error));
                    }
                }
            }
        });

        let attempts = match attempts {
            Ok(attempts) => attempts,
            Err(error) => {
                setter.set(AsyncResult::Error(error));
                Teardown::none()
            }
        };

        let done = done.clone();
        attempts.and(Teardown::new(move || {
            if !done.load(Ordering::SeqCst) {
                setter.set(AsyncResult::Pending);
            }
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::testing::Recorder;
    use std::sync::atomic::AtomicU32;

    fn failing_times(failures: u32, calls: Arc<AtomicU32>) -> impl Fetch<u32> {
        move || {
            let calls = calls.clone();
            async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call <= failures {
                    Err(StoreError::transport("not yet"))
                } else {
                    Ok(call)
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_three_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let store =
            retry_until_success(failing_times(3, calls.clone()), Duration::from_millis(10), 5);
        let recorder = Recorder::new(&store);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(recorder.last(), Some(AsyncResult::Complete(4)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let store = retry_until_success(
            failing_times(u32::MAX, calls.clone()),
            Duration::from_millis(10),
            2,
        );
        let recorder = Recorder::new(&store);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(matches!(recorder.last(), Some(AsyncResult::Error(StoreError::Transport(_)))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_is_cached_across_activations() {
        let calls = Arc::new(AtomicU32::new(0));
        let store =
            retry_until_success(failing_times(0, calls.clone()), Duration::from_millis(10), 3);

        let first = Recorder::new(&store);
        tokio::time::sleep(Duration::from_millis(5)).await;
        drop(first);

        let second = Recorder::new(&store);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(second.values(), vec![AsyncResult::Complete(1)]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribing_cancels_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let store = retry_until_success(
            failing_times(u32::MAX, calls.clone()),
            Duration::from_millis(10),
            100,
        );

        let recorder = Recorder::new(&store);
        tokio::time::sleep(Duration::from_millis(25)).await;
        drop(recorder);
        let seen = calls.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), seen);
        assert_eq!(store.get(), AsyncResult::Pending);
    }
}
