//! Tri-state result carried by every async store

use crate::error::{Result, StoreError};

/// The state of an asynchronous value: still loading, loaded, or failed
#[derive(Debug, Clone, PartialEq)]
pub enum AsyncResult<T> {
    /// No value yet
    Pending,
    /// The value was loaded
    Complete(T),
    /// Loading failed
    Error(StoreError),
}

impl<T> Default for AsyncResult<T> {
    fn default() -> Self {
        Self::Pending
    }
}

impl<T> AsyncResult<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, AsyncResult::Pending)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, AsyncResult::Complete(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AsyncResult::Error(_))
    }

    /// The completed value, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            AsyncResult::Complete(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&StoreError> {
        match self {
            AsyncResult::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> AsyncResult<&T> {
        match self {
            AsyncResult::Pending => AsyncResult::Pending,
            AsyncResult::Complete(value) => AsyncResult::Complete(value),
            AsyncResult::Error(error) => AsyncResult::Error(error.clone()),
        }
    }

    /// Transform the completed value, passing pending and error through
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> AsyncResult<U> {
        match self {
            AsyncResult::Pending => AsyncResult::Pending,
            AsyncResult::Complete(value) => AsyncResult::Complete(f(value)),
            AsyncResult::Error(error) => AsyncResult::Error(error),
        }
    }

    /// `None` while pending, otherwise the settled result
    pub fn into_result(self) -> Option<Result<T>> {
        match self {
            AsyncResult::Pending => None,
            AsyncResult::Complete(value) => Some(Ok(value)),
            AsyncResult::Error(error) => Some(Err(error)),
        }
    }
}

impl<T> From<Result<T>> for AsyncResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => AsyncResult::Complete(value),
            Err(error) => AsyncResult::Error(error),
        }
    }
}
