//! The two halves of a dual object.
//!
//! ```text
//!   simulation thread                 core thread
//!   ┌───────────────────┐            ┌────────────────────┐
//!   │ CoreSource        │  factory   │ CoreCounterpart    │
//!   │  create_counterpart ─────────► │  initialize()      │
//!   │  sync_to_core()  ──payload───► │  apply_sync_data() │
//!   │  core_dependencies()           │  destroy()         │
//!   │  on_dependency_dirty()         └────────────────────┘
//!   └───────────────────┘
//! ```

use std::any::Any;

use oroboros_sync::{CoreSyncData, FrameAlloc};

use crate::error::ObjectResult;
use crate::flags::DirtyFlags;
use crate::id::CoreObjectId;

/// Simulation-side state of a dual object.
///
/// Lives behind the object's lock; every method runs on a producer thread.
pub trait CoreSource: Send + 'static {
    /// Builds the core-thread counterpart from the current state.
    ///
    /// Runs on the thread calling `initialize()`. The counterpart's own
    /// [`initialize`](CoreCounterpart::initialize) runs later, on the core
    /// thread when the object needs cross-thread init.
    ///
    /// # Errors
    ///
    /// A failure leaves the object Uninitialized.
    fn create_counterpart(&self) -> ObjectResult<Box<dyn CoreCounterpart>>;

    /// Serialises the state selected by `dirty` into a payload.
    ///
    /// Allocate the payload from `alloc` so the sync pass can budget it.
    fn sync_to_core(&self, dirty: DirtyFlags, alloc: &mut FrameAlloc) -> CoreSyncData;

    /// Ids of the objects this one depends on.
    ///
    /// Read at `initialize()` and on `refresh_core_dependencies()`, never per
    /// frame.
    fn core_dependencies(&self) -> Vec<CoreObjectId> {
        Vec::new()
    }

    /// Decides which flags to raise on this object when `dependency` was
    /// marked dirty with `flags`.
    ///
    /// Returning [`DirtyFlags::NONE`] stops propagation through this object.
    fn on_dependency_dirty(&self, dependency: CoreObjectId, flags: DirtyFlags) -> DirtyFlags {
        let _ = (dependency, flags);
        DirtyFlags::DEPENDENCY
    }
}

/// Core-thread half of a dual object.
///
/// Only ever touched by commands played back on the core queue, except for
/// objects initialised synchronously.
pub trait CoreCounterpart: Send + 'static {
    /// Finishes construction on the core thread.
    ///
    /// # Errors
    ///
    /// A failure drops the counterpart and moves the object to Destroyed.
    fn initialize(&mut self) -> ObjectResult<()> {
        Ok(())
    }

    /// Applies a payload produced by [`CoreSource::sync_to_core`].
    fn apply_sync_data(&mut self, data: &CoreSyncData);

    /// Releases core-thread resources. The counterpart is dropped right after.
    fn destroy(&mut self) {}

    /// Upcast for [`CounterpartHandle::with`](crate::CounterpartHandle::with).
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
