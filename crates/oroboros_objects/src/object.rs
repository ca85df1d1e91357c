//! # Core Objects
//!
//! A [`CoreObject`] is the simulation-side handle of a dual object. It owns
//! the source state, a dirty mask and the counterpart that lives on the core
//! thread.
//!
//! ```text
//!   simulation thread                          core queue (FIFO)
//!   ─────────────────                          ─────────────────
//!   initialize()     ── create_counterpart ──► [counterpart.initialize()]
//!   modify(flags, f) ── mark_core_dirty ─────► dependants raise DEPENDENCY
//!   sync pass        ── sync_to_core ────────► [counterpart.apply_sync_data()]
//!   destroy() / drop ────────────────────────► [counterpart.destroy()]
//! ```
//!
//! Every counterpart command goes through the same queue, so teardown always
//! runs after the mutations queued before it.

use std::fmt;
use std::sync::{Arc, Weak};

use oroboros_sync::{AsyncResult, CoreSyncData, FrameAlloc, SharedCommandQueue};
use parking_lot::Mutex;

use crate::counterpart::CounterpartHandle;
use crate::error::{ObjectError, ObjectResult};
use crate::flags::{DirtyCell, DirtyFlags};
use crate::id::{CoreObjectId, CoreObjectState, StateCell};
use crate::registry::{ObjectNode, Registry};
use crate::traits::CoreSource;

/// How an object initialises its counterpart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CreateOptions {
    /// Run the counterpart's `initialize` as a command on the core queue.
    ///
    /// When false, `initialize()` runs it on the calling thread and the
    /// object is Initialized before `initialize()` returns.
    pub cross_thread_init: bool,
}

impl CreateOptions {
    /// Counterpart initialised on the core thread.
    #[must_use]
    pub const fn cross_thread() -> Self {
        Self {
            cross_thread_init: true,
        }
    }

    /// Counterpart initialised synchronously on the calling thread.
    #[must_use]
    pub const fn local() -> Self {
        Self {
            cross_thread_init: false,
        }
    }
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self::cross_thread()
    }
}

pub(crate) struct ObjectInner<S: CoreSource> {
    id: CoreObjectId,
    cross_thread: bool,
    state: Arc<StateCell>,
    dirty: DirtyCell,
    source: Mutex<S>,
    counterpart: CounterpartHandle,
    init: AsyncResult,
    queue: Arc<SharedCommandQueue>,
    registry: Weak<Registry>,
}

impl<S: CoreSource> ObjectInner<S> {
    fn state(&self) -> CoreObjectState {
        self.state.load()
    }

    fn sync_with(&self, flags: DirtyFlags, alloc: &mut FrameAlloc) -> ObjectResult<CoreSyncData> {
        match self.state() {
            CoreObjectState::Uninitialized => Err(ObjectError::NotInitialized { id: self.id }),
            CoreObjectState::Destroyed => Err(ObjectError::AlreadyDestroyed { id: self.id }),
            CoreObjectState::Initializing | CoreObjectState::Initialized => {
                Ok(self.source.lock().sync_to_core(flags, alloc))
            }
        }
    }

    fn unregister(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }

    /// Releases the counterpart after the state moved to Destroyed.
    fn teardown(&self, previous: CoreObjectState) {
        self.unregister();

        match previous {
            CoreObjectState::Destroyed => return,
            CoreObjectState::Uninitialized => {
                // Nothing was created; wake anyone waiting on init.
                let _ = self
                    .init
                    .resolve::<ObjectResult<()>>(Err(ObjectError::AlreadyDestroyed { id: self.id }));
            }
            CoreObjectState::Initializing | CoreObjectState::Initialized => {
                if self.cross_thread {
                    let slot = self.counterpart.clone();
                    self.queue.enqueue(move || slot.destroy());
                } else {
                    self.counterpart.destroy();
                }
            }
        }

        tracing::debug!(id = %self.id, ?previous, "core object destroyed");
    }
}

/// Records the outcome of counterpart init in the object's state.
fn finish_init(state: &StateCell, id: CoreObjectId, outcome: &ObjectResult<()>) {
    match outcome {
        Ok(()) => {
            if state
                .transition(CoreObjectState::Initializing, CoreObjectState::Initialized)
                .is_err()
            {
                tracing::debug!(%id, "core object destroyed before its counterpart finished init");
            }
        }
        Err(error) => {
            state.store(CoreObjectState::Destroyed);
            tracing::error!(%id, %error, "counterpart initialization failed");
        }
    }
}

impl<S: CoreSource> ObjectNode for ObjectInner<S> {
    fn id(&self) -> CoreObjectId {
        self.id
    }

    fn state(&self) -> CoreObjectState {
        self.state.load()
    }

    fn dirty_flags(&self) -> DirtyFlags {
        self.dirty.load()
    }

    fn raise(&self, flags: DirtyFlags) {
        self.dirty.insert(flags);
    }

    fn dependency_dirty(&self, dependency: CoreObjectId, flags: DirtyFlags) -> DirtyFlags {
        self.source.lock().on_dependency_dirty(dependency, flags)
    }

    fn queue_sync(&self, alloc: &mut FrameAlloc) -> ObjectResult<usize> {
        let flags = self.dirty.load();
        let payload = self.sync_with(flags, alloc)?;
        let bytes = payload.len();

        let slot = self.counterpart.clone();
        self.queue.enqueue(move || slot.apply(&payload));
        self.dirty.remove(flags);
        Ok(bytes)
    }
}

impl<S: CoreSource> Drop for ObjectInner<S> {
    fn drop(&mut self) {
        let previous = self.state.destroy();
        self.teardown(previous);
    }
}

/// Simulation-side handle of a dual object.
///
/// Cloning shares the object. Dropping the last handle without calling
/// [`destroy`](Self::destroy) tears the counterpart down the same way.
pub struct CoreObject<S: CoreSource> {
    inner: Arc<ObjectInner<S>>,
}

impl<S: CoreSource> CoreObject<S> {
    pub(crate) fn new(
        source: S,
        options: CreateOptions,
        queue: Arc<SharedCommandQueue>,
        registry: &Arc<Registry>,
    ) -> Self {
        let inner = Arc::new(ObjectInner {
            id: CoreObjectId::next(),
            cross_thread: options.cross_thread_init,
            state: Arc::new(StateCell::new()),
            dirty: DirtyCell::default(),
            source: Mutex::new(source),
            counterpart: CounterpartHandle::default(),
            init: AsyncResult::new(),
            queue,
            registry: Arc::downgrade(registry),
        });

        let node: Arc<dyn ObjectNode> = inner.clone();
        registry.register(inner.id, Arc::downgrade(&node));
        Self { inner }
    }

    /// Returns the object's id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> CoreObjectId {
        self.inner.id
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> CoreObjectState {
        self.inner.state()
    }

    /// Returns true once the counterpart has finished initialising.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state() == CoreObjectState::Initialized
    }

    /// Returns true if the counterpart initialises on the core thread.
    #[must_use]
    pub fn requires_cross_thread_init(&self) -> bool {
        self.inner.cross_thread
    }

    /// Creates the counterpart and starts its initialisation.
    ///
    /// Must be called once, right after creation. With cross-thread init the
    /// object is Initializing until the core thread has run the queued init
    /// command; otherwise it is Initialized (or Destroyed, on failure) when
    /// this returns.
    ///
    /// # Errors
    ///
    /// - [`ObjectError::AlreadyInitialized`] / [`ObjectError::AlreadyDestroyed`]
    ///   on a second call
    /// - [`ObjectError::CreateFailed`] if the factory fails; the object stays
    ///   Uninitialized
    /// - [`ObjectError::InitFailed`] if a synchronous counterpart init fails
    pub fn initialize(&self) -> ObjectResult<()> {
        let inner = &*self.inner;
        let id = inner.id;

        inner
            .state
            .transition(CoreObjectState::Uninitialized, CoreObjectState::Initializing)
            .map_err(|actual| match actual {
                CoreObjectState::Destroyed => ObjectError::AlreadyDestroyed { id },
                _ => ObjectError::AlreadyInitialized { id },
            })?;

        let created = inner.source.lock().create_counterpart();
        let counterpart = match created {
            Ok(counterpart) => counterpart,
            Err(error) => {
                let _ = inner
                    .state
                    .transition(CoreObjectState::Initializing, CoreObjectState::Uninitialized);
                tracing::error!(%id, %error, "counterpart factory failed");
                return Err(ObjectError::CreateFailed {
                    id,
                    reason: error.to_string(),
                });
            }
        };
        inner.counterpart.install(counterpart);
        self.refresh_core_dependencies();

        if inner.cross_thread {
            let state = Arc::clone(&inner.state);
            let slot = inner.counterpart.clone();
            let init = inner.init.clone();
            let registry = inner.registry.clone();
            inner.queue.enqueue(move || {
                let outcome = slot.initialize(id);
                finish_init(&state, id, &outcome);
                if outcome.is_err() {
                    if let Some(registry) = registry.upgrade() {
                        registry.unregister(id);
                    }
                }
                let _ = init.resolve(outcome);
            });
            tracing::debug!(%id, "counterpart init queued");
            return Ok(());
        }

        let outcome = inner.counterpart.initialize(id);
        finish_init(&inner.state, id, &outcome);
        let _ = inner.init.resolve(outcome.clone());
        if outcome.is_err() {
            inner.unregister();
        }
        outcome
    }

    /// Blocks until the counterpart has been initialised.
    ///
    /// Returns immediately for objects initialised synchronously. Never call
    /// this from the core thread: it is refused with
    /// [`SyncError::WouldDeadlock`](oroboros_sync::SyncError::WouldDeadlock).
    ///
    /// # Errors
    ///
    /// - [`ObjectError::NotInitialized`] before `initialize()`
    /// - [`ObjectError::InitFailed`] if the counterpart failed to initialise
    /// - [`ObjectError::Sync`] if the init command itself failed
    pub fn block_until_core_initialized(&self) -> ObjectResult<()> {
        if self.state() == CoreObjectState::Uninitialized {
            return Err(ObjectError::NotInitialized { id: self.id() });
        }
        self.inner.init.block_until_complete()?;
        self.inner.init.try_return_value::<ObjectResult<()>>()?
    }

    /// Returns the init result for non-blocking polling, once `initialize()`
    /// has been called. Its value is an `ObjectResult<()>`.
    #[must_use]
    pub fn init_result(&self) -> Option<AsyncResult> {
        match self.state() {
            CoreObjectState::Uninitialized => None,
            _ => Some(self.inner.init.clone()),
        }
    }

    /// Destroys the object and schedules counterpart teardown.
    ///
    /// For cross-thread objects teardown is a command on the core queue,
    /// ordered after every command queued for this object before.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectError::AlreadyDestroyed`] on a second call.
    pub fn destroy(&self) -> ObjectResult<()> {
        let previous = self.inner.state.destroy();
        if previous == CoreObjectState::Destroyed {
            return Err(ObjectError::AlreadyDestroyed { id: self.id() });
        }
        self.inner.teardown(previous);
        Ok(())
    }

    /// Marks state as changed and lets dependants react.
    ///
    /// Flags accumulate until the next sync pass. Calling this on a destroyed
    /// object is a bug: it panics in debug builds and is ignored with a
    /// warning in release builds.
    pub fn mark_core_dirty(&self, flags: DirtyFlags) {
        if self.state() == CoreObjectState::Destroyed {
            let id = self.id();
            if cfg!(debug_assertions) {
                panic!("mark_core_dirty on destroyed core object {id}");
            }
            tracing::warn!(%id, "mark_core_dirty on destroyed core object ignored");
            return;
        }

        self.inner.dirty.insert(flags);
        self.mark_dependencies_dirty(flags);
    }

    /// Tells every dependant, transitively, that this object changed with
    /// `flags`. Returns how many dependants were asked.
    pub fn mark_dependencies_dirty(&self, flags: DirtyFlags) -> usize {
        self.inner
            .registry
            .upgrade()
            .map_or(0, |registry| registry.propagate(self.id(), flags))
    }

    /// Re-reads [`CoreSource::core_dependencies`] and rebuilds this object's
    /// edges. Call it whenever the dependency list changes.
    pub fn refresh_core_dependencies(&self) {
        let dependencies = self.inner.source.lock().core_dependencies();
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.set_dependencies(self.id(), &dependencies);
        }
    }

    /// Returns the dependency edges currently registered for this object.
    #[must_use]
    pub fn core_dependencies(&self) -> Vec<CoreObjectId> {
        self.inner
            .registry
            .upgrade()
            .map(|registry| registry.graph.read().dependencies_of(self.id()).to_vec())
            .unwrap_or_default()
    }

    /// Serialises the dirty subset of the state.
    ///
    /// Does not clear the flags; queue the payload, then call
    /// [`mark_core_clean`](Self::mark_core_clean).
    ///
    /// # Errors
    ///
    /// [`ObjectError::NotInitialized`] before `initialize()`,
    /// [`ObjectError::AlreadyDestroyed`] after `destroy()`.
    pub fn sync_to_core(&self, alloc: &mut FrameAlloc) -> ObjectResult<CoreSyncData> {
        self.inner.sync_with(self.core_dirty_flags(), alloc)
    }

    /// Serialises the dirty state, queues the apply command and clears the
    /// synced flags. Returns the payload size.
    ///
    /// # Errors
    ///
    /// Same as [`sync_to_core`](Self::sync_to_core).
    pub fn queue_sync(&self, alloc: &mut FrameAlloc) -> ObjectResult<usize> {
        self.inner.queue_sync(alloc)
    }

    /// Clears every dirty flag.
    pub fn mark_core_clean(&self) {
        self.inner.dirty.clear();
    }

    /// Returns true if any dirty flag is set.
    #[must_use]
    pub fn is_core_dirty(&self) -> bool {
        !self.inner.dirty.load().is_empty()
    }

    /// Returns the accumulated dirty flags.
    #[must_use]
    pub fn core_dirty_flags(&self) -> DirtyFlags {
        self.inner.dirty.load()
    }

    /// Mutates the source, then marks `flags` dirty.
    pub fn modify<R>(&self, flags: DirtyFlags, f: impl FnOnce(&mut S) -> R) -> R {
        let result = f(&mut *self.inner.source.lock());
        self.mark_core_dirty(flags);
        result
    }

    /// Reads the source.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&*self.inner.source.lock())
    }

    /// Returns a handle to the counterpart slot.
    #[must_use]
    pub fn counterpart(&self) -> CounterpartHandle {
        self.inner.counterpart.clone()
    }

    /// Returns the queue this object's commands go to.
    #[must_use]
    pub fn queue(&self) -> &Arc<SharedCommandQueue> {
        &self.inner.queue
    }
}

impl<S: CoreSource> Clone for CoreObject<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: CoreSource> fmt::Debug for CoreObject<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreObject")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("dirty", &self.core_dirty_flags())
            .field("cross_thread_init", &self.inner.cross_thread)
            .finish()
    }
}
