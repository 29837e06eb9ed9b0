//! Injected fetch functions

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// A repeatable read of remote state
///
/// Stores call this on activation and on every poll, so implementations
/// must be idempotent. Any async closure returning `Result<T>` is a `Fetch`.
#[async_trait]
pub trait Fetch<T>: Send + Sync + 'static {
    async fn fetch(&self) -> Result<T>;
}

#[async_trait]
impl<T, F, Fut> Fetch<T> for F
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    async fn fetch(&self) -> Result<T> {
        (self)().await
    }
}

/// A shareable fetch
pub type SharedFetch<T> = Arc<dyn Fetch<T>>;

pub(crate) fn shared<T>(fetch: impl Fetch<T>) -> SharedFetch<T> {
    Arc::new(fetch)
}
