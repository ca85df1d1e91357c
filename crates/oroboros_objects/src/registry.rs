//! Live object table and dirty propagation.
//!
//! Shared between the manager and every object it created. Objects hold it
//! weakly, so dropping the manager never keeps objects alive or vice versa.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};

use oroboros_sync::FrameAlloc;
use parking_lot::RwLock;

use crate::error::ObjectResult;
use crate::flags::DirtyFlags;
use crate::graph::DependencyGraph;
use crate::id::{CoreObjectId, CoreObjectState};

/// Type-erased view of a core object, as seen by the registry.
pub(crate) trait ObjectNode: Send + Sync {
    fn id(&self) -> CoreObjectId;

    fn state(&self) -> CoreObjectState;

    fn dirty_flags(&self) -> DirtyFlags;

    /// ORs flags in without propagating.
    fn raise(&self, flags: DirtyFlags);

    /// Asks the source which flags a dependency change raises.
    fn dependency_dirty(&self, dependency: CoreObjectId, flags: DirtyFlags) -> DirtyFlags;

    /// Serialises, queues the apply command and clears the synced bits.
    /// Returns the payload size.
    fn queue_sync(&self, alloc: &mut FrameAlloc) -> ObjectResult<usize>;
}

#[derive(Default)]
pub(crate) struct Registry {
    objects: RwLock<HashMap<CoreObjectId, Weak<dyn ObjectNode>>>,
    pub(crate) graph: RwLock<DependencyGraph>,
}

impl Registry {
    pub(crate) fn register(&self, id: CoreObjectId, node: Weak<dyn ObjectNode>) {
        self.objects.write().insert(id, node);
    }

    pub(crate) fn unregister(&self, id: CoreObjectId) {
        self.objects.write().remove(&id);
        self.graph.write().remove(id);
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub(crate) fn node(&self, id: CoreObjectId) -> Option<Arc<dyn ObjectNode>> {
        self.objects.read().get(&id).and_then(Weak::upgrade)
    }

    /// Every object still alive, in creation order.
    pub(crate) fn live_nodes(&self) -> Vec<Arc<dyn ObjectNode>> {
        let mut nodes: Vec<Arc<dyn ObjectNode>> = self
            .objects
            .read()
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        nodes.sort_unstable_by_key(|node| node.id());
        nodes
    }

    pub(crate) fn set_dependencies(&self, id: CoreObjectId, dependencies: &[CoreObjectId]) {
        self.graph.write().set_dependencies(id, dependencies);
    }

    /// Walks dependency → dependant edges breadth-first from `origin`.
    ///
    /// Each dependant is asked exactly once per walk; whatever it raises is
    /// passed on to its own dependants. Returns how many dependants were
    /// asked.
    pub(crate) fn propagate(&self, origin: CoreObjectId, flags: DirtyFlags) -> usize {
        let mut visited = HashSet::from([origin]);
        let mut pending = VecDeque::from([(origin, flags)]);
        let mut notified = 0;

        while let Some((changed, changed_flags)) = pending.pop_front() {
            let dependants = self.graph.read().dependants_of(changed).to_vec();

            for dependant in dependants {
                if !visited.insert(dependant) {
                    continue;
                }
                let Some(node) = self.node(dependant) else {
                    continue;
                };
                if node.state() == CoreObjectState::Destroyed {
                    continue;
                }

                let raised = node.dependency_dirty(changed, changed_flags);
                notified += 1;
                if raised.is_empty() {
                    continue;
                }
                node.raise(raised);
                pending.push_back((dependant, raised));
            }
        }

        if notified > 0 {
            tracing::trace!(%origin, notified, "dependency dirtiness propagated");
        }
        notified
    }
}
