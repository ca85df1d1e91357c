//! # Core Object Manager
//!
//! Creates core objects, tracks their dependency edges and runs the
//! per-frame sync pass.
//!
//! ```text
//!   sync_to_core():
//!     1. reset the frame allocator (sync_object skips this step)
//!     2. collect live objects that are dirty and Initializing/Initialized
//!     3. order them dependencies-first
//!     4. per object: serialise ─► enqueue apply command ─► clear synced flags
//! ```
//!
//! The apply commands land on the manager's queue; whoever owns the core
//! side (a [`CoreThread`](oroboros_sync::CoreThread) or a manual loop) flushes
//! and plays them back.

use std::collections::HashMap;
use std::sync::Arc;

use oroboros_sync::{FrameAlloc, SharedCommandQueue};
use parking_lot::Mutex;

use crate::config::ManagerConfig;
use crate::error::ObjectResult;
use crate::id::{CoreObjectId, CoreObjectState};
use crate::object::{CoreObject, CreateOptions};
use crate::registry::{ObjectNode, Registry};
use crate::traits::CoreSource;

/// Numbers from one sync pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncPassStats {
    /// Frame number of the allocator during this pass.
    pub frame: u64,
    /// Live objects looked at.
    pub examined: usize,
    /// Objects whose payload was queued.
    pub synced: usize,
    /// Objects that were dirty but could not be synced.
    pub failed: usize,
    /// Total payload bytes queued.
    pub payload_bytes: usize,
    /// Bytes over the frame budget.
    pub overflow_bytes: usize,
}

/// Registry and sync driver for core objects sharing one queue.
pub struct CoreObjectManager {
    registry: Arc<Registry>,
    queue: Arc<SharedCommandQueue>,
    alloc: Mutex<FrameAlloc>,
}

impl CoreObjectManager {
    /// Creates a manager whose objects queue their commands on `queue`.
    #[must_use]
    pub fn new(queue: Arc<SharedCommandQueue>) -> Self {
        Self::build(queue, &ManagerConfig::default())
    }

    /// Creates a manager with explicit settings.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectError::InvalidConfig`](crate::ObjectError::InvalidConfig)
    /// if `config` does not validate.
    pub fn with_config(queue: Arc<SharedCommandQueue>, config: &ManagerConfig) -> ObjectResult<Self> {
        config.validate()?;
        Ok(Self::build(queue, config))
    }

    fn build(queue: Arc<SharedCommandQueue>, config: &ManagerConfig) -> Self {
        tracing::info!(
            queue_id = queue.queue_id(),
            frame_budget = config.frame_budget_bytes,
            "core object manager created"
        );
        Self {
            registry: Arc::new(Registry::default()),
            queue,
            alloc: Mutex::new(FrameAlloc::new(config.frame_budget_bytes)),
        }
    }

    /// Creates and registers an Uninitialized object.
    ///
    /// Call [`CoreObject::initialize`] on the result before using it.
    pub fn create<S: CoreSource>(&self, source: S, options: CreateOptions) -> CoreObject<S> {
        CoreObject::new(source, options, Arc::clone(&self.queue), &self.registry)
    }

    /// Queues a payload for every dirty object, dependencies first.
    ///
    /// Uninitialized and Destroyed objects are skipped; their flags stay put
    /// until they can be synced.
    pub fn sync_to_core(&self) -> SyncPassStats {
        let nodes = self.registry.live_nodes();
        self.run_pass(nodes, true)
    }

    /// Syncs one object plus the dirty objects it depends on, transitively.
    ///
    /// Does not start a new frame: the payload counts against the budget of
    /// the frame begun by the last [`sync_to_core`](Self::sync_to_core).
    pub fn sync_object<S: CoreSource>(&self, object: &CoreObject<S>) -> SyncPassStats {
        let closure = self.registry.graph.read().dependency_closure(object.id());
        let nodes = closure
            .into_iter()
            .filter_map(|id| self.registry.node(id))
            .collect();
        self.run_pass(nodes, false)
    }

    fn run_pass(&self, nodes: Vec<Arc<dyn ObjectNode>>, new_frame: bool) -> SyncPassStats {
        let mut alloc = self.alloc.lock();
        if new_frame {
            alloc.reset();
        }

        let mut stats = SyncPassStats {
            frame: alloc.frame(),
            examined: nodes.len(),
            ..SyncPassStats::default()
        };

        let mut ids = Vec::new();
        let mut dirty: HashMap<CoreObjectId, Arc<dyn ObjectNode>> = HashMap::new();
        for node in nodes {
            let syncable = matches!(
                node.state(),
                CoreObjectState::Initializing | CoreObjectState::Initialized
            );
            if syncable && !node.dirty_flags().is_empty() {
                ids.push(node.id());
                dirty.insert(node.id(), node);
            }
        }

        let order = self.registry.graph.read().sync_order(&ids);
        for id in order {
            let Some(node) = dirty.get(&id) else {
                continue;
            };
            match node.queue_sync(&mut alloc) {
                Ok(bytes) => {
                    stats.synced += 1;
                    stats.payload_bytes += bytes;
                }
                Err(error) => {
                    // Destroyed between collection and sync.
                    stats.failed += 1;
                    tracing::warn!(%id, %error, "core object skipped in sync pass");
                }
            }
        }

        stats.overflow_bytes = alloc.overflow();
        drop(alloc);

        tracing::debug!(
            frame = stats.frame,
            synced = stats.synced,
            bytes = stats.payload_bytes,
            "core sync pass queued"
        );
        stats
    }

    /// Returns the number of registered objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.registry.len()
    }

    /// Objects that depend on `id`.
    #[must_use]
    pub fn dependants_of(&self, id: CoreObjectId) -> Vec<CoreObjectId> {
        self.registry.graph.read().dependants_of(id).to_vec()
    }

    /// Objects `id` depends on.
    #[must_use]
    pub fn dependencies_of(&self, id: CoreObjectId) -> Vec<CoreObjectId> {
        self.registry.graph.read().dependencies_of(id).to_vec()
    }

    /// Returns the queue objects send their commands to.
    #[must_use]
    pub fn queue(&self) -> &Arc<SharedCommandQueue> {
        &self.queue
    }

    /// Returns the payload bytes used in the current frame.
    #[must_use]
    pub fn frame_bytes_used(&self) -> usize {
        self.alloc.lock().used()
    }
}

impl std::fmt::Debug for CoreObjectManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreObjectManager")
            .field("queue_id", &self.queue.queue_id())
            .field("objects", &self.object_count())
            .finish()
    }
}
