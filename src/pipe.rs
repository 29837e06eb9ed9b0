//! Sequential async pipelines
//!
//! ```rust,ignore
//! let author_profile = pipe(post_store, |post| Step::store(profiles.get(post.author)))
//!     .then_with_context(|profile, (post, ())| {
//!         Step::value((post.title.clone(), profile.nickname))
//!     })
//!     .into_store();
//! ```
//!
//! Every step runs only on a completed input; pending and error states
//! short-circuit the rest of the pipeline. A step sees the previous value
//! and, through [`Pipe::then_with_context`], all earlier values as a nested
//! tuple, most recent first.

use crate::derive::{async_derived, map_completed, Step};
use crate::store::AsyncStore;

/// An async store whose value is the output of the last step, carrying the
/// outputs of all earlier steps as context
pub struct Pipe<T, C> {
    store: AsyncStore<(T, C)>,
}

impl<T> Pipe<T, ()>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(store: AsyncStore<T>) -> Self {
        Self {
            store: map_completed(store, |value| (value, ())),
        }
    }
}

impl<T, C> Pipe<T, C>
where
    T: Clone + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    /// Append a step that receives the previous value
    pub fn then<U>(self, f: impl Fn(T) -> Step<U> + Send + Sync + 'static) -> Pipe<U, (T, C)>
    where
        U: Clone + Send + Sync + 'static,
    {
        self.then_with_context(move |value, _| f(value))
    }

    /// Append a step that receives the previous value and all earlier ones
    pub fn then_with_context<U>(
        self,
        f: impl Fn(T, &C) -> Step<U> + Send + Sync + 'static,
    ) -> Pipe<U, (T, C)>
    where
        U: Clone + Send + Sync + 'static,
    {
        let store = async_derived(self.store, move |(value, context): (T, C)| {
            let step = f(value.clone(), &context);
            step.map(move |output| (output, (value.clone(), context.clone())))
        });
        Pipe { store }
    }

    /// The value of the last step
    pub fn into_store(self) -> AsyncStore<T> {
        map_completed(self.store, |(value, _)| value)
    }

    /// The value of the last step together with all earlier values
    pub fn with_context(self) -> AsyncStore<(T, C)> {
        self.store
    }
}

/// Start a pipeline from `store` with its first step
pub fn pipe<T, U>(
    store: AsyncStore<T>,
    f: impl Fn(T) -> Step<U> + Send + Sync + 'static,
) -> Pipe<U, (T, ())>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    Pipe::new(store).then(f)
}
