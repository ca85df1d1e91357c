//! # Sync Error Types
//!
//! All errors that can occur while handing work to the core thread.

use std::thread::ThreadId;
use thiserror::Error;

/// Errors that can occur in the command queue layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A single-producer queue was used from a thread other than its owner.
    #[error("command queue {queue_id} accessed from {actual:?}, owner is {owner:?}")]
    WrongThread {
        /// Queue that was accessed.
        queue_id: u32,
        /// Thread the queue is bound to.
        owner: ThreadId,
        /// Thread that made the call.
        actual: ThreadId,
    },

    /// An async result was resolved a second time.
    #[error("async result already resolved")]
    AlreadyResolved,

    /// A return value was read before the command executed.
    #[error("async result not resolved yet")]
    NotResolved,

    /// The stored return value has a different type than requested.
    #[error("async result holds a different type than {expected}")]
    TypeMismatch {
        /// Name of the requested type.
        expected: &'static str,
    },

    /// The command resolved without producing a value.
    #[error("async result completed without a return value")]
    NoValue,

    /// Blocking here would wait on work only this thread can execute.
    #[error("blocking on the executing thread would deadlock")]
    WouldDeadlock,

    /// A command panicked during playback.
    #[error("command {sequence} on queue {queue_id} failed: {message}")]
    CommandFailed {
        /// Queue the command was recorded on.
        queue_id: u32,
        /// Sequence number of the command.
        sequence: u64,
        /// Panic message.
        message: String,
    },

    /// The core thread has shut down or never started.
    #[error("core thread is not running")]
    CoreThreadStopped,

    /// The OS refused to start the core thread.
    #[error("failed to spawn core thread: {0}")]
    ThreadSpawn(String),

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
