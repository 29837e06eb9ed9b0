//! Spawning store-owned tasks

use std::future::Future;

use crate::error::{Result, StoreError};
use crate::store::Teardown;

/// Spawn `future` on the current tokio runtime, returning a teardown that
/// aborts it
pub(crate) fn spawn<F>(future: F) -> Result<Teardown>
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
    let task = handle.spawn(future);
    Ok(Teardown::new(move || task.abort()))
}
