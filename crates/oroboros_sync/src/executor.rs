//! Tracks which threads are currently executing deferred commands.
//!
//! A thread that executes commands must never block on an [`AsyncResult`],
//! because the command that would resolve it can only run on that same
//! thread. The core thread marks itself for its whole lifetime; any other
//! thread is marked for the duration of a playback.
//!
//! [`AsyncResult`]: crate::AsyncResult

use std::cell::Cell;

thread_local! {
    static EXECUTOR_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Returns true if the calling thread is executing deferred commands.
#[must_use]
pub fn is_executor_thread() -> bool {
    EXECUTOR_DEPTH.with(|depth| depth.get() > 0)
}

/// Marks the current thread as an executor until the scope is dropped.
///
/// Scopes nest, so a playback started from inside the core thread does not
/// clear the mark when it finishes.
pub(crate) struct ExecutorScope {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl ExecutorScope {
    pub(crate) fn enter() -> Self {
        EXECUTOR_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self {
            _not_send: std::marker::PhantomData,
        }
    }
}

impl Drop for ExecutorScope {
    fn drop(&mut self) {
        EXECUTOR_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}
