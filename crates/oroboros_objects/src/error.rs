//! # Object Error Types
//!
//! Lifecycle violations and counterpart failures.

use oroboros_sync::SyncError;
use thiserror::Error;

use crate::id::CoreObjectId;

/// Errors that can occur in the dual object layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectError {
    /// `initialize` was called on an object that already left Uninitialized.
    #[error("core object {id} is already initialized")]
    AlreadyInitialized {
        /// Object id.
        id: CoreObjectId,
    },

    /// The object was already destroyed.
    #[error("core object {id} is already destroyed")]
    AlreadyDestroyed {
        /// Object id.
        id: CoreObjectId,
    },

    /// The operation needs `initialize` first.
    #[error("core object {id} is not initialized")]
    NotInitialized {
        /// Object id.
        id: CoreObjectId,
    },

    /// The counterpart factory failed; the object stays Uninitialized.
    #[error("failed to create counterpart for core object {id}: {reason}")]
    CreateFailed {
        /// Object id.
        id: CoreObjectId,
        /// Error reported by the factory.
        reason: String,
    },

    /// Counterpart initialisation failed; the object is now Destroyed.
    #[error("counterpart of core object {id} failed to initialize: {reason}")]
    InitFailed {
        /// Object id.
        id: CoreObjectId,
        /// Error reported by the counterpart.
        reason: String,
    },

    /// Raised by a counterpart or factory implementation.
    #[error("{0}")]
    Counterpart(String),

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Queue or async result failure.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Result type for object operations.
pub type ObjectResult<T> = Result<T, ObjectError>;
