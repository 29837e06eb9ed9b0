//! Error types for reactive stores

use thiserror::Error;

use crate::holochain::HoloHash;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Store error types
///
/// Errors are `Clone` because a single error value is replayed to every
/// subscriber of the store that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The fetched entry does not exist (or did not appear before retries ran out)
    #[error("NOT_FOUND")]
    NotFound,

    /// Several updates to the same entry could not be resolved to one latest version
    #[error("CONFLICTING_UPDATES: {} updates", .0.len())]
    ConflictingUpdates(Vec<HoloHash>),

    /// Error surfaced by the fetch function or the signal channel
    #[error("Transport error: {0}")]
    Transport(String),

    /// A hash could not be decoded from its string form
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    /// The source store went away before producing a result
    #[error("Store closed before producing a result")]
    Closed,

    /// Async work was requested outside of a tokio runtime
    #[error("No tokio runtime available to drive the store")]
    NoRuntime,
}

impl StoreError {
    /// Wrap any displayable error as a transport error
    pub fn transport(err: impl std::fmt::Display) -> Self {
        StoreError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Transport(err.to_string())
    }
}

impl From<base64::DecodeError> for StoreError {
    fn from(err: base64::DecodeError) -> Self {
        StoreError::InvalidHash(err.to_string())
    }
}
