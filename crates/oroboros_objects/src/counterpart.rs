//! Shared slot holding an object's counterpart.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use oroboros_sync::CoreSyncData;
use parking_lot::Mutex;

use crate::error::{ObjectError, ObjectResult};
use crate::id::CoreObjectId;
use crate::traits::CoreCounterpart;

type Slot = Option<Box<dyn CoreCounterpart>>;

/// Handle to an object's counterpart slot.
///
/// Commands capture a clone of this handle rather than the object, so a
/// queued command never keeps the simulation-side object alive.
#[derive(Clone, Default)]
pub struct CounterpartHandle {
    slot: Arc<Mutex<Slot>>,
}

impl CounterpartHandle {
    /// Returns true while a counterpart is installed.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Runs `f` on the counterpart if it is present and of type `T`.
    ///
    /// Meant for commands on the core thread and for tests.
    pub fn with<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut slot = self.slot.lock();
        let counterpart = slot.as_mut()?;
        counterpart.as_any_mut().downcast_mut::<T>().map(f)
    }

    pub(crate) fn install(&self, counterpart: Box<dyn CoreCounterpart>) {
        *self.slot.lock() = Some(counterpart);
    }

    /// Runs the counterpart's `initialize`. On failure the counterpart is
    /// dropped.
    pub(crate) fn initialize(&self, id: CoreObjectId) -> ObjectResult<()> {
        let mut slot = self.slot.lock();
        let Some(counterpart) = slot.as_mut() else {
            return Err(ObjectError::InitFailed {
                id,
                reason: "no counterpart installed".to_owned(),
            });
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| counterpart.initialize()))
            .unwrap_or_else(|_| Err(ObjectError::Counterpart("initialize panicked".to_owned())));

        outcome.map_err(|error| {
            *slot = None;
            ObjectError::InitFailed {
                id,
                reason: error.to_string(),
            }
        })
    }

    pub(crate) fn apply(&self, data: &CoreSyncData) {
        if let Some(counterpart) = self.slot.lock().as_mut() {
            counterpart.apply_sync_data(data);
        }
    }

    /// Destroys and drops the counterpart, if any.
    pub(crate) fn destroy(&self) {
        let taken = self.slot.lock().take();
        if let Some(mut counterpart) = taken {
            counterpart.destroy();
        }
    }
}

impl fmt::Debug for CounterpartHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterpartHandle")
            .field("present", &self.is_present())
            .finish()
    }
}
