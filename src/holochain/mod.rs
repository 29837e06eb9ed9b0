//! Holochain domain layer
//!
//! Hashes, actions and signals as the stores see them, the client seam the
//! signals arrive through, and the polled stores built on top.

// Hashes and hash-keyed maps
pub mod hash;
pub mod hash_map;

// Actions, links, records and signals
pub mod types;

// Signal channel and fetch seams
pub mod client;
pub mod fetch;

// Canonical forms for change detection
pub mod reconcile;

// Poll and push engine
pub(crate) mod poll;

// Zome store constructors
pub mod stores;

// Test data
#[cfg(any(test, feature = "fake"))]
pub mod fake;

pub use client::{SignalHub, SignalListener, ZomeClient};
pub use fetch::{Fetch, SharedFetch};
pub use hash::{
    uniquify, ActionHash, AgentPubKey, AnyDhtHash, AnyLinkableHash, DnaHash, EntryHash, HashType,
    HoloHash,
};
pub use hash_map::{slice, GetOnlyMap, HoloHashMap, LazyHoloHashMap};
pub use reconcile::{
    are_deleted_links_equal, are_hashes_equal, canonical_actions, canonical_deleted_links,
    canonical_links, sort_actions_by_timestamp, sort_deleted_links, sort_links_by_timestamp,
    uniquify_actions, uniquify_links,
};
pub use stores::{immutable_entry, ZomeStores};
pub use types::{
    create_link_to_link, ActionCommittedSignal, ActionContent, ActionHashed, Create, CreateLink,
    Delete, DeleteLink, DeletedLink, EntryAction, EntryRecord, Link, SignedActionHashed, Timestamp,
    Update,
};
