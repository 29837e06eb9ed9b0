//! Push-signal channel consumed by the stores
//!
//! The stores only need one thing from a zome client: a way to register a
//! listener for the signals the zome emits, and to remove it again.
//! [`SignalHub`] is an in-process implementation that can be fed directly
//! or from a `tokio::sync::broadcast` channel.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::Teardown;
use crate::task;

/// Callback invoked for every signal a client receives
pub type SignalListener<S> = Arc<dyn Fn(&S) + Send + Sync>;

/// Source of push signals for one zome
pub trait ZomeClient<S>: Send + Sync + 'static {
    /// Register `listener`; the returned teardown removes it
    fn on_signal(&self, listener: SignalListener<S>) -> Teardown;
}

impl<S, C: ZomeClient<S> + ?Sized> ZomeClient<S> for Arc<C> {
    fn on_signal(&self, listener: SignalListener<S>) -> Teardown {
        (**self).on_signal(listener)
    }
}

struct Listeners<S> {
    next_id: u64,
    entries: Vec<(u64, SignalListener<S>)>,
}

/// In-process signal fan-out
///
/// Listeners run synchronously inside [`SignalHub::emit`], in registration
/// order. A panicking listener is logged and skipped.
pub struct SignalHub<S> {
    listeners: Arc<Mutex<Listeners<S>>>,
}

impl<S> Clone for SignalHub<S> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
        }
    }
}

impl<S> Default for SignalHub<S> {
    fn default() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }
}

fn lock<S>(listeners: &Mutex<Listeners<S>>) -> MutexGuard<'_, Listeners<S>> {
    listeners.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: Send + Sync + 'static> SignalHub<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `signal` to every registered listener
    pub fn emit(&self, signal: &S) {
        let snapshot: Vec<SignalListener<S>> = lock(&self.listeners)
            .entries
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(signal))).is_err() {
                warn!("Signal listener panicked");
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).entries.len()
    }

    /// Emit every signal received on `receiver` until the channel closes
    /// or the returned teardown runs
    pub fn forward(&self, mut receiver: broadcast::Receiver<S>) -> Result<Teardown>
    where
        S: Clone,
    {
        let hub = self.clone();
        task::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(signal) => hub.emit(&signal),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Signal forwarder lagged, skipped signals");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Signal channel closed, stopping forwarder");
                        break;
                    }
                }
            }
        })
    }

    /// Like [`SignalHub::forward`], for raw JSON payloads
    ///
    /// Payloads that do not decode as `S` are not addressed to these stores
    /// and are skipped.
    pub fn forward_json(
        &self,
        mut receiver: broadcast::Receiver<serde_json::Value>,
    ) -> Result<Teardown>
    where
        S: DeserializeOwned,
    {
        let hub = self.clone();
        task::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(payload) => match serde_json::from_value::<S>(payload) {
                        Ok(signal) => hub.emit(&signal),
                        Err(error) => debug!(%error, "Ignoring undecodable signal payload"),
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Signal forwarder lagged, skipped signals");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Signal channel closed, stopping forwarder");
                        break;
                    }
                }
            }
        })
    }
}

impl<S: Send + Sync + 'static> ZomeClient<S> for SignalHub<S> {
    fn on_signal(&self, listener: SignalListener<S>) -> Teardown {
        let id = {
            let mut listeners = lock(&self.listeners);
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.entries.push((id, listener));
            id
        };

        let listeners = Arc::downgrade(&self.listeners);
        Teardown::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                lock(&listeners).entries.retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }
}
