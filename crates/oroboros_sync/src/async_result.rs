//! # Async Result
//!
//! Single-assignment return channel from the core thread back to the
//! simulation thread.
//!
//! ```text
//!   Simulation thread                     Core thread
//!   ─────────────────                     ───────────
//!   let r = queue.enqueue_with_result(..)
//!   ...keeps simulating...                playback: action(&r) → r.resolve(7)
//!   r.block_until_complete()?  ◄───────── condvar.notify_all()
//!   r.return_value::<i32>() == 7
//! ```
//!
//! The value is written at most once. Once resolved, a result never goes
//! back to the unresolved state.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{SyncError, SyncResult};
use crate::executor::is_executor_thread;

/// What a resolved result ended up holding.
enum Outcome {
    /// The command produced a value.
    Value(Box<dyn Any + Send>),
    /// The command finished without a value.
    Empty,
    /// The command failed; the error explains why.
    Failed(SyncError),
}

/// Shared state between the producer holding the result and the command
/// that resolves it.
struct ResultState {
    /// Fast-path flag, mirrors `outcome.is_some()`.
    done: AtomicBool,
    outcome: Mutex<Option<Outcome>>,
    condvar: Condvar,
}

/// Handle to the return value of a deferred command.
///
/// Cloning the handle shares the same underlying result; the result is
/// freed when the last clone is dropped.
#[derive(Clone)]
pub struct AsyncResult {
    state: Arc<ResultState>,
}

impl AsyncResult {
    /// Creates a new, unresolved result.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(ResultState {
                done: AtomicBool::new(false),
                outcome: Mutex::new(None),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Returns true once the owning command has resolved the result.
    ///
    /// Never blocks.
    #[inline]
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state.done.load(Ordering::Acquire)
    }

    /// Blocks the calling thread until the result is resolved.
    ///
    /// There is no timeout. Callers that need one poll [`is_resolved`].
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::WouldDeadlock`] when called from a thread that is
    /// currently executing deferred commands, since the command that would
    /// resolve this result could never run.
    ///
    /// [`is_resolved`]: Self::is_resolved
    pub fn block_until_complete(&self) -> SyncResult<()> {
        if self.is_resolved() {
            return Ok(());
        }

        if is_executor_thread() {
            tracing::error!("refusing to block on an async result from an executing thread");
            return Err(SyncError::WouldDeadlock);
        }

        let mut guard = self.state.outcome.lock();
        while guard.is_none() {
            self.state.condvar.wait(&mut guard);
        }
        Ok(())
    }

    /// Resolves the result with a value, waking every waiter.
    ///
    /// Called by the command that owns this result, on the core thread.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyResolved`] if the result was already
    /// resolved. The first value is kept.
    pub fn resolve<T: Any + Send>(&self, value: T) -> SyncResult<()> {
        self.settle(Outcome::Value(Box::new(value)))
    }

    /// Resolves the result without a value.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyResolved`] if the result was already
    /// resolved.
    pub fn complete(&self) -> SyncResult<()> {
        self.settle(Outcome::Empty)
    }

    /// Resolves the result with an error indicator.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyResolved`] if the result was already
    /// resolved.
    pub fn fail(&self, error: SyncError) -> SyncResult<()> {
        self.settle(Outcome::Failed(error))
    }

    fn settle(&self, outcome: Outcome) -> SyncResult<()> {
        let mut guard = self.state.outcome.lock();
        if guard.is_some() {
            tracing::error!("async result resolved twice, keeping the first outcome");
            return Err(SyncError::AlreadyResolved);
        }

        *guard = Some(outcome);
        self.state.done.store(true, Ordering::Release);
        drop(guard);

        self.state.condvar.notify_all();
        Ok(())
    }

    /// Reads the return value.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotResolved`] before the command ran
    /// - [`SyncError::TypeMismatch`] if the value has another type
    /// - [`SyncError::NoValue`] if the command completed without a value
    /// - the command's error if it failed
    pub fn try_return_value<T: Any + Clone>(&self) -> SyncResult<T> {
        let guard = self.state.outcome.lock();
        match guard.as_ref() {
            None => Err(SyncError::NotResolved),
            Some(Outcome::Value(value)) => {
                value
                    .downcast_ref::<T>()
                    .cloned()
                    .ok_or(SyncError::TypeMismatch {
                        expected: type_name::<T>(),
                    })
            }
            Some(Outcome::Empty) => Err(SyncError::NoValue),
            Some(Outcome::Failed(error)) => Err(error.clone()),
        }
    }

    /// Reads the return value, falling back to `T::default()`.
    ///
    /// Only valid after the result is resolved.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if the value is missing or has another type.
    /// Release builds log the error and return the default.
    #[must_use]
    pub fn return_value<T: Any + Clone + Default>(&self) -> T {
        match self.try_return_value::<T>() {
            Ok(value) => value,
            Err(error) => {
                if cfg!(debug_assertions) {
                    panic!("return value read from async result: {error}");
                }
                tracing::error!(%error, "return value read from async result");
                T::default()
            }
        }
    }

    /// Returns the error the owning command failed with, if any.
    #[must_use]
    pub fn failure(&self) -> Option<SyncError> {
        match self.state.outcome.lock().as_ref() {
            Some(Outcome::Failed(error)) => Some(error.clone()),
            _ => None,
        }
    }
}

impl Default for AsyncResult {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AsyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncResult")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_new_result_is_unresolved() {
        let result = AsyncResult::new();
        assert!(!result.is_resolved());
        assert_eq!(result.try_return_value::<i32>(), Err(SyncError::NotResolved));
    }

    #[test]
    fn test_resolve_and_read() {
        let result = AsyncResult::new();
        result.resolve(7_i32).unwrap();

        assert!(result.is_resolved());
        assert_eq!(result.return_value::<i32>(), 7);
        assert!(result.failure().is_none());
    }

    #[test]
    fn test_double_resolve_keeps_first_value() {
        let result = AsyncResult::new();
        result.resolve(1_u32).unwrap();

        assert_eq!(result.resolve(2_u32), Err(SyncError::AlreadyResolved));
        assert_eq!(result.complete(), Err(SyncError::AlreadyResolved));
        assert_eq!(result.return_value::<u32>(), 1);
    }

    #[test]
    fn test_type_mismatch() {
        let result = AsyncResult::new();
        result.resolve(String::from("texture")).unwrap();

        assert!(matches!(
            result.try_return_value::<u64>(),
            Err(SyncError::TypeMismatch { .. })
        ));
        assert_eq!(result.try_return_value::<String>().unwrap(), "texture");
    }

    #[test]
    fn test_complete_without_value() {
        let result = AsyncResult::new();
        result.complete().unwrap();

        assert!(result.is_resolved());
        assert_eq!(result.try_return_value::<i32>(), Err(SyncError::NoValue));
    }

    #[test]
    fn test_failed_result_reports_error() {
        let result = AsyncResult::new();
        let error = SyncError::CommandFailed {
            queue_id: 1,
            sequence: 4,
            message: "upload failed".into(),
        };
        result.fail(error.clone()).unwrap();

        assert!(result.is_resolved());
        assert_eq!(result.failure(), Some(error.clone()));
        assert_eq!(result.try_return_value::<i32>(), Err(error));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "return value read from async result")]
    fn test_premature_read_panics_in_debug() {
        let result = AsyncResult::new();
        let _ = result.return_value::<i32>();
    }

    #[test]
    fn test_clones_share_state() {
        let result = AsyncResult::new();
        let shared = result.clone();
        shared.resolve(3_i64).unwrap();
        assert!(result.is_resolved());
        assert_eq!(result.return_value::<i64>(), 3);
    }

    #[test]
    fn test_block_until_complete_wakes_waiter() {
        let result = AsyncResult::new();
        let resolver = result.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            resolver.resolve(42_i32).unwrap();
        });

        result.block_until_complete().unwrap();
        assert_eq!(result.return_value::<i32>(), 42);
        handle.join().unwrap();
    }

    #[test]
    fn test_block_on_executor_thread_is_refused() {
        let result = AsyncResult::new();
        let _scope = crate::executor::ExecutorScope::enter();
        assert_eq!(result.block_until_complete(), Err(SyncError::WouldDeadlock));
    }

    #[test]
    fn test_block_on_resolved_result_from_executor_is_fine() {
        let result = AsyncResult::new();
        result.complete().unwrap();
        let _scope = crate::executor::ExecutorScope::enter();
        assert!(result.block_until_complete().is_ok());
    }
}
