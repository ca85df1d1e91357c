//! # Dependency Graph
//!
//! Edges between core objects, keyed by id.
//!
//! ```text
//!   dependencies:  Cam ──► [VP, Scene]      (what an object reads)
//!   dependants:    VP  ──► [Cam]            (who must hear about VP changes)
//! ```
//!
//! Ids are weak keys: a destroyed dependency's id may linger in a
//! dependant's list and is ignored everywhere it no longer resolves.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::id::CoreObjectId;

/// Both edge directions, kept in sync.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    dependencies: HashMap<CoreObjectId, Vec<CoreObjectId>>,
    dependants: HashMap<CoreObjectId, Vec<CoreObjectId>>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the dependency list of `id`.
    ///
    /// Duplicates and self-edges are dropped.
    pub fn set_dependencies(&mut self, id: CoreObjectId, dependencies: &[CoreObjectId]) {
        self.unlink_dependencies(id);

        let mut unique = Vec::with_capacity(dependencies.len());
        for &dependency in dependencies {
            if dependency == id || unique.contains(&dependency) {
                continue;
            }
            unique.push(dependency);
            self.dependants.entry(dependency).or_default().push(id);
        }

        if !unique.is_empty() {
            self.dependencies.insert(id, unique);
        }
    }

    /// Forgets `id` as a dependant. Its own dependants keep their edges
    /// until they refresh.
    pub fn remove(&mut self, id: CoreObjectId) {
        self.unlink_dependencies(id);
        self.dependants.remove(&id);
    }

    fn unlink_dependencies(&mut self, id: CoreObjectId) {
        let Some(old) = self.dependencies.remove(&id) else {
            return;
        };
        for dependency in old {
            if let Some(list) = self.dependants.get_mut(&dependency) {
                list.retain(|&d| d != id);
                if list.is_empty() {
                    self.dependants.remove(&dependency);
                }
            }
        }
    }

    /// Objects `id` depends on.
    #[must_use]
    pub fn dependencies_of(&self, id: CoreObjectId) -> &[CoreObjectId] {
        self.dependencies.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Objects that depend on `id`.
    #[must_use]
    pub fn dependants_of(&self, id: CoreObjectId) -> &[CoreObjectId] {
        self.dependants.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns true if no edges exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Orders `ids` so every dependency comes before its dependants.
    ///
    /// Only edges between members of `ids` count. Uses Kahn's algorithm;
    /// members caught in a cycle are appended in their input order after
    /// everything that could be sorted.
    #[must_use]
    pub fn sync_order(&self, ids: &[CoreObjectId]) -> Vec<CoreObjectId> {
        let members: HashSet<CoreObjectId> = ids.iter().copied().collect();
        let mut in_degree: HashMap<CoreObjectId, usize> = HashMap::with_capacity(ids.len());

        for &id in ids {
            let degree = self
                .dependencies_of(id)
                .iter()
                .filter(|d| members.contains(*d))
                .count();
            in_degree.insert(id, degree);
        }

        // Seed in input order so unrelated objects keep a stable order.
        let mut ready: VecDeque<CoreObjectId> = ids
            .iter()
            .copied()
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();
        let mut order = Vec::with_capacity(ids.len());

        while let Some(id) = ready.pop_front() {
            order.push(id);
            for &dependant in self.dependants_of(id) {
                if let Some(degree) = in_degree.get_mut(&dependant) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(dependant);
                    }
                }
            }
        }

        if order.len() < in_degree.len() {
            let placed: HashSet<CoreObjectId> = order.iter().copied().collect();
            let cyclic: Vec<CoreObjectId> = ids
                .iter()
                .copied()
                .filter(|id| !placed.contains(id))
                .collect();
            tracing::warn!(?cyclic, "dependency cycle between core objects");
            order.extend(cyclic);
        }

        order
    }

    /// `id` plus everything it depends on, transitively, dependencies first.
    #[must_use]
    pub fn dependency_closure(&self, id: CoreObjectId) -> Vec<CoreObjectId> {
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        let mut found = Vec::new();

        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            found.push(next);
            stack.extend_from_slice(self.dependencies_of(next));
        }

        self.sync_order(&found)
    }
}
