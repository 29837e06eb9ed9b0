//! Joining several async stores into one

use crate::derive::{derived, map_completed};
use crate::store::{AsyncResult, AsyncStore};

/// How errored sources affect a join
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// The first error in source order becomes the joined result
    #[default]
    Bubble,
    /// Errored sources are left out of the joined value
    FilterOut,
}

/// How pending sources affect a join
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PendingPolicy {
    /// Any pending source keeps the joined result pending
    #[default]
    Bubble,
    /// Pending sources are left out of the joined value
    FilterOut,
}

/// Join policy; errors are resolved before pendings are looked at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinOptions {
    pub errors: ErrorPolicy,
    pub pendings: PendingPolicy,
}

impl JoinOptions {
    pub fn filter_out_errors(mut self) -> Self {
        self.errors = ErrorPolicy::FilterOut;
        self
    }

    pub fn filter_out_pendings(mut self) -> Self {
        self.pendings = PendingPolicy::FilterOut;
        self
    }
}

/// Combine source results according to `options`, keeping source order
pub fn join_results<T: Clone>(
    results: &[AsyncResult<T>],
    options: JoinOptions,
) -> AsyncResult<Vec<T>> {
    if options.errors == ErrorPolicy::Bubble {
        if let Some(error) = results.iter().find_map(AsyncResult::error) {
            return AsyncResult::Error(error.clone());
        }
    }
    if options.pendings == PendingPolicy::Bubble && results.iter().any(AsyncResult::is_pending) {
        return AsyncResult::Pending;
    }

    AsyncResult::Complete(results.iter().filter_map(AsyncResult::value).cloned().collect())
}

/// Join async stores into a store of all their values, in source order
pub fn join_async<T>(stores: Vec<AsyncStore<T>>, options: JoinOptions) -> AsyncStore<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    derived(stores, move |results| join_results(results, options))
}

#[derive(Clone)]
enum Side<A, B> {
    Left(A),
    Right(B),
}

/// Join two async stores of different types, bubbling errors and pendings
pub fn join_pair<A, B>(left: AsyncStore<A>, right: AsyncStore<B>) -> AsyncStore<(A, B)>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    let left = left.map(|r| r.clone().map(Side::<A, B>::Left));
    let right = right.map(|r| r.clone().map(Side::<A, B>::Right));

    let joined = join_async(vec![left, right], JoinOptions::default());
    let paired = map_completed(joined, |sides| match sides.as_slice() {
        [Side::Left(a), Side::Right(b)] => Some((a.clone(), b.clone())),
        _ => None,
    });
    // Both sides are always present under the bubbling policy
    paired.map(|r| match r {
        AsyncResult::Complete(Some(pair)) => AsyncResult::Complete(pair.clone()),
        AsyncResult::Complete(None) | AsyncResult::Pending => AsyncResult::Pending,
        AsyncResult::Error(error) => AsyncResult::Error(error.clone()),
    })
}
