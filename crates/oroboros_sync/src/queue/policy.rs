//! Thread-safety policies for [`CommandQueue`].
//!
//! ```text
//!   SingleProducer: RefCell<QueueState>  + owner check on every call
//!   MultiProducer:  Mutex<QueueState>    + any thread may call
//! ```
//!
//! Both policies expose the same call sites; the policy is picked by the
//! queue's type parameter.
//!
//! [`CommandQueue`]: super::CommandQueue

use std::cell::RefCell;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::command::DeferredCommand;
use crate::error::{SyncError, SyncResult};

pub(crate) mod sealed {
    use super::{DeferredCommand, SyncResult, ThreadId};

    /// Everything a policy guards: the pending buffer and the sequence
    /// counter.
    pub struct QueueState {
        pub(crate) pending: Vec<DeferredCommand>,
        pub(crate) next_sequence: u64,
    }

    impl QueueState {
        pub(crate) fn with_capacity(capacity: usize) -> Self {
            Self {
                pending: Vec::with_capacity(capacity),
                next_sequence: 0,
            }
        }
    }

    pub trait Sealed {
        fn create(owner: ThreadId, state: QueueState) -> Self;

        fn owner(&self) -> ThreadId;

        fn with_state<R>(&self, queue_id: u32, f: impl FnOnce(&mut QueueState) -> R)
            -> SyncResult<R>;
    }
}

use sealed::QueueState;

/// Selects how a command queue protects its pending buffer.
///
/// Sealed: the two implementations are [`SingleProducer`] and
/// [`MultiProducer`].
pub trait QueuePolicy: sealed::Sealed + Send + 'static {
    /// True if any thread may record commands.
    const THREAD_SAFE: bool;
}

/// One producer thread, no locking.
///
/// Every call checks that it comes from the owner thread. A violation is a
/// programming error: it panics in debug builds, and in release builds it is
/// logged and the call is refused without touching the buffer.
pub struct SingleProducer {
    owner: ThreadId,
    state: RefCell<QueueState>,
}

impl sealed::Sealed for SingleProducer {
    fn create(owner: ThreadId, state: QueueState) -> Self {
        Self {
            owner,
            state: RefCell::new(state),
        }
    }

    fn owner(&self) -> ThreadId {
        self.owner
    }

    fn with_state<R>(&self, queue_id: u32, f: impl FnOnce(&mut QueueState) -> R) -> SyncResult<R> {
        let actual = thread::current().id();
        if actual != self.owner {
            let error = SyncError::WrongThread {
                queue_id,
                owner: self.owner,
                actual,
            };
            if cfg!(debug_assertions) {
                panic!("{error}");
            }
            tracing::error!(%error, "single-producer command queue used from the wrong thread");
            return Err(error);
        }

        Ok(f(&mut self.state.borrow_mut()))
    }
}

impl QueuePolicy for SingleProducer {
    const THREAD_SAFE: bool = false;
}

/// Any number of producer threads; a mutex guards the pending buffer.
pub struct MultiProducer {
    owner: ThreadId,
    state: Mutex<QueueState>,
}

impl sealed::Sealed for MultiProducer {
    fn create(owner: ThreadId, state: QueueState) -> Self {
        Self {
            owner,
            state: Mutex::new(state),
        }
    }

    fn owner(&self) -> ThreadId {
        self.owner
    }

    fn with_state<R>(&self, _queue_id: u32, f: impl FnOnce(&mut QueueState) -> R) -> SyncResult<R> {
        Ok(f(&mut self.state.lock()))
    }
}

impl QueuePolicy for MultiProducer {
    const THREAD_SAFE: bool = true;
}
