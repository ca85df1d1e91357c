//! Object identity and lifecycle state.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Next id to hand out. Starts at 1 so ids are never zero.
static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique id of a core object.
///
/// Ids are monotonic and never reused, so they stay valid as weak keys
/// (dependency edges, breakpoints, logs) after the object is gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreObjectId(NonZeroU64);

impl CoreObjectId {
    /// Allocates a fresh id.
    #[must_use]
    pub fn next() -> Self {
        let raw = NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed);
        // Wrapping a u64 counter would take centuries at any realistic rate.
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    /// Returns the raw id value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for CoreObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a core object.
///
/// ```text
///   Uninitialized ──initialize()──► Initializing ──counterpart init──► Initialized
///         │                              │                                │
///         └──────────────────────────────┴────────destroy()───────────────┴──► Destroyed
/// ```
///
/// Without cross-thread init the Initializing step completes before
/// `initialize()` returns. Destroyed is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CoreObjectState {
    /// Constructed, no counterpart yet.
    Uninitialized = 0,
    /// Counterpart created, its initialisation queued on the core thread.
    Initializing = 1,
    /// Counterpart ready.
    Initialized = 2,
    /// Torn down.
    Destroyed = 3,
}

impl CoreObjectState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Uninitialized,
            1 => Self::Initializing,
            2 => Self::Initialized,
            _ => Self::Destroyed,
        }
    }
}

/// Lock-free state cell, shared with commands running on the core thread.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(CoreObjectState::Uninitialized as u8))
    }

    pub(crate) fn load(&self) -> CoreObjectState {
        CoreObjectState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: CoreObjectState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves to Destroyed and returns the state it left.
    pub(crate) fn destroy(&self) -> CoreObjectState {
        CoreObjectState::from_u8(self.0.swap(CoreObjectState::Destroyed as u8, Ordering::AcqRel))
    }

    /// Moves `from` to `to`; on failure returns the actual state.
    pub(crate) fn transition(
        &self,
        from: CoreObjectState,
        to: CoreObjectState,
    ) -> Result<(), CoreObjectState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(CoreObjectState::from_u8)
    }
}
