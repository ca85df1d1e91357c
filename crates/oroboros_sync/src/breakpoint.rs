//! # Command Breakpoints
//!
//! Lets a debugger or a test trap the execution of one specific historical
//! command, identified by the queue it was recorded on and its sequence
//! number.
//!
//! The registry is handed to a queue at construction, so independent queues
//! (and independent tests) never see each other's markers. Breakpoints are
//! diagnostic only and never change what runs or in which order.

use std::collections::HashSet;
use std::fmt;

use parking_lot::Mutex;

/// Identifies one command: `(queue id, sequence number)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointKey {
    /// Queue the command was recorded on.
    pub queue_id: u32,
    /// Sequence number of the command in that queue.
    pub sequence: u64,
}

impl BreakpointKey {
    /// Creates a new key.
    #[must_use]
    pub const fn new(queue_id: u32, sequence: u64) -> Self {
        Self { queue_id, sequence }
    }
}

/// Callback invoked when a marked command is about to execute.
pub type BreakpointHook = Box<dyn Fn(BreakpointKey) + Send + Sync + 'static>;

/// Set of breakpoint markers plus a log of the ones that fired.
#[derive(Default)]
pub struct BreakpointRegistry {
    markers: Mutex<HashSet<BreakpointKey>>,
    hits: Mutex<Vec<BreakpointKey>>,
    hook: Option<BreakpointHook>,
}

impl BreakpointRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that calls `hook` whenever a marker fires.
    ///
    /// Attach a debugger break or a test assertion here.
    #[must_use]
    pub fn with_hook(hook: impl Fn(BreakpointKey) + Send + Sync + 'static) -> Self {
        Self {
            hook: Some(Box::new(hook)),
            ..Self::default()
        }
    }

    /// Adds a marker. Returns false if it was already present.
    pub fn add(&self, key: BreakpointKey) -> bool {
        self.markers.lock().insert(key)
    }

    /// Removes a marker. Returns false if it was not present.
    pub fn remove(&self, key: BreakpointKey) -> bool {
        self.markers.lock().remove(&key)
    }

    /// Returns true if a marker exists for `key`.
    #[must_use]
    pub fn contains(&self, key: BreakpointKey) -> bool {
        self.markers.lock().contains(&key)
    }

    /// Called by playback before each command executes.
    pub(crate) fn check(&self, key: BreakpointKey) {
        if !self.contains(key) {
            return;
        }

        tracing::warn!(
            queue_id = key.queue_id,
            sequence = key.sequence,
            "command breakpoint hit"
        );
        self.hits.lock().push(key);
        if let Some(hook) = &self.hook {
            hook(key);
        }
    }

    /// Returns every breakpoint hit so far, in execution order.
    #[must_use]
    pub fn hits(&self) -> Vec<BreakpointKey> {
        self.hits.lock().clone()
    }

    /// Clears the hit log, keeping the markers.
    pub fn clear_hits(&self) {
        self.hits.lock().clear();
    }
}

impl fmt::Debug for BreakpointRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakpointRegistry")
            .field("markers", &self.markers.lock().len())
            .field("hits", &self.hits.lock().len())
            .field("has_hook", &self.hook.is_some())
            .finish()
    }
}
