//! Holochain Stores - Reactive async state for Holochain apps
//!
//! Lazy, push-based stores for data that lives on a Holochain DHT.
//!
//! # Architecture
//!
//! - **Stores**: a [`Store`] holds a value and notifies its subscribers.
//!   Work starts with the first subscriber and stops with the last.
//! - **Composition**: [`derive`], [`join_async`], [`pipe`] and the map
//!   joins build new stores out of existing ones.
//! - **Zome stores**: [`ZomeStores`] polls a fetch function while
//!   subscribed and applies the zome's signals to the cached value in
//!   between, notifying only when the canonical value changes.
//!
//! # Example
//!
//! ```rust,ignore
//! use holochain_stores::{SignalHub, StoreConfig, ZomeStores};
//!
//! let hub = SignalHub::new();
//! let stores: ZomeStores<_, EntryTypes, LinkTypes> =
//!     ZomeStores::new(hub.clone(), StoreConfig::from_env());
//!
//! let posts = stores.collection(
//!     move || {
//!         let zome = zome.clone();
//!         async move { zome.get_all_posts().await }
//!     },
//!     LinkTypes::AllPosts,
//! );
//!
//! let subscription = posts.subscribe(|result| match result {
//!     AsyncResult::Complete(links) => println!("{} posts", links.len()),
//!     AsyncResult::Error(e) => eprintln!("{e}"),
//!     AsyncResult::Pending => {}
//! });
//! ```

// Observable stores
pub mod store;

// Derivation and composition
pub mod derive;
pub mod join;
pub mod join_map;
pub mod pipe;

// Remote-state helpers
pub mod lazy;
pub mod manual;
pub mod race;
pub mod retry;
pub mod to_promise;

// Debugging aids
pub mod debug;

// Holochain domain layer
pub mod holochain;

// Configuration
pub mod config;

// Error types
pub mod error;

mod task;

// Re-export store types
pub use store::{AsyncResult, AsyncStore, Setter, Store, Subscription, Teardown, Writable};

// Re-export combinators
pub use derive::{
    async_derive_and_join, async_derive_store, async_derived, derive, derive_store, derived,
    map_completed, Step,
};
pub use join::{join_async, join_pair, join_results, ErrorPolicy, JoinOptions, PendingPolicy};
pub use join_map::{join_async_map, join_map, map_and_join, slice_and_join};
pub use pipe::{pipe, Pipe};

// Re-export remote-state helpers
pub use lazy::{async_readable, lazy_load, lazy_load_and_poll, CompleteSetter};
pub use manual::ManualReloadStore;
pub use race::race;
pub use retry::retry_until_success;
pub use to_promise::to_promise;

pub use debug::{with_logger, DebugRegistry};

// Re-export domain types
pub use holochain::{
    immutable_entry, ActionCommittedSignal, EntryRecord, Fetch, HoloHash, HoloHashMap,
    LazyHoloHashMap, Link, SignalHub, ZomeClient, ZomeStores,
};

// Re-export config and error types
pub use config::StoreConfig;
pub use error::{Result, StoreError};
