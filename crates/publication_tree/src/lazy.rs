//! Memoized async cell
//!
//! A [`Lazy`] holds a resolver that produces a value the first time someone
//! asks for it. The in-flight future is stored alongside the result so that
//! overlapping callers share one resolution instead of racing to start their
//! own.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};

type Resolver<T> = Box<dyn Fn() -> BoxFuture<'static, T> + Send>;

enum LazyState<T: Clone> {
    Unstarted(Resolver<T>),
    Pending(Shared<BoxFuture<'static, T>>),
    Done(T),
}

/// A deferred value computed at most once. Clones share the same state.
pub struct Lazy<T: Clone> {
    state: Arc<Mutex<LazyState<T>>>,
}

impl<T: Clone> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Lazy<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(resolver: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let resolver: Resolver<T> = Box::new(move || resolver().boxed());
        Self {
            state: Arc::new(Mutex::new(LazyState::Unstarted(resolver))),
        }
    }

    /// A cell that is already resolved
    pub fn ready(value: T) -> Self {
        Self {
            state: Arc::new(Mutex::new(LazyState::Done(value))),
        }
    }

    /// Resolve the value, running the resolver if nobody has yet
    pub async fn value(&self) -> T {
        let pending = match self.begin() {
            Ok(value) => return value,
            Err(pending) => pending,
        };

        let value = pending.await;
        *self.lock() = LazyState::Done(value.clone());
        value
    }

    /// The resolved value, without forcing
    pub fn peek(&self) -> Option<T> {
        match &*self.lock() {
            LazyState::Done(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(&*self.lock(), LazyState::Done(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(&*self.lock(), LazyState::Pending(_))
    }

    fn begin(&self) -> Result<T, Shared<BoxFuture<'static, T>>> {
        let mut state = self.lock();
        let pending = match &*state {
            LazyState::Done(value) => return Ok(value.clone()),
            LazyState::Pending(pending) => return Err(pending.clone()),
            LazyState::Unstarted(resolve) => resolve().shared(),
        };
        *state = LazyState::Pending(pending.clone());
        Err(pending)
    }

    fn lock(&self) -> MutexGuard<'_, LazyState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.lock().unwrap_or_else(PoisonError::into_inner) {
            LazyState::Unstarted(_) => "unstarted",
            LazyState::Pending(_) => "pending",
            LazyState::Done(_) => "done",
        };
        f.debug_struct("Lazy").field("state", &state).finish()
    }
}
