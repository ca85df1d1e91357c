//! # Command Queue
//!
//! Records deferred commands on the simulation thread and hands them to the
//! core thread in batches.
//!
//! ## The Problem
//!
//! ```text
//! Simulation thread:  creates textures, moves cameras, destroys buffers
//! Core thread:        owns the device, must see every change in order
//!
//! Calling into the device directly:  RACE CONDITION → CRASH
//! Locking around every call:         LOCK CONTENTION → 0 FPS
//! ```
//!
//! ## The Solution: Record, Flush, Play Back
//!
//! ```text
//!   enqueue(A) enqueue(B) enqueue(C)      flush()           playback()
//!   ┌───┬───┬───┐                    ┌──────────────┐    A → B → C
//!   │ A │ B │ C │  ── pending ──►    │ CommandBatch │ ──► (core thread)
//!   └───┴───┴───┘                    └──────────────┘
//!         ▲                                  │
//!         └──── empty buffer from pool ◄─────┘ (recycled after playback)
//! ```
//!
//! `flush()` swaps the pending buffer for an empty one, so producers keep
//! recording while the previous batch executes. Commands run in exactly the
//! order they were recorded.

mod batch;
mod policy;

pub use batch::{CommandBatch, PlaybackReport};
pub use policy::{MultiProducer, QueuePolicy, SingleProducer};

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crossbeam_channel::{Receiver, Sender};

use crate::async_result::AsyncResult;
use crate::breakpoint::BreakpointRegistry;
use crate::command::DeferredCommand;
use crate::config::QueueConfig;
use crate::error::SyncResult;
use policy::sealed::QueueState;

/// Queue ids start at 1 so that 0 never names a real queue.
static NEXT_QUEUE_ID: AtomicU32 = AtomicU32::new(1);

/// Queue that only its owner thread may use.
pub type LocalCommandQueue = CommandQueue<SingleProducer>;

/// Queue that any thread may record into.
pub type SharedCommandQueue = CommandQueue<MultiProducer>;

/// Ordered buffer of deferred commands.
///
/// See the [module docs](self) for the record/flush/playback cycle.
pub struct CommandQueue<P: QueuePolicy> {
    /// Process-unique id, used to key breakpoints.
    id: u32,
    /// Pending buffer under the selected thread-safety policy.
    policy: P,
    /// Executed buffers come back here from playback.
    recycled_tx: Sender<Vec<DeferredCommand>>,
    /// Empty buffers waiting to be reused by `flush`.
    recycled_rx: Receiver<Vec<DeferredCommand>>,
    /// Capacity of freshly allocated buffers.
    initial_capacity: usize,
    /// Optional diagnostic sink.
    breakpoints: Option<Arc<BreakpointRegistry>>,
}

impl<P: QueuePolicy> CommandQueue<P> {
    /// Creates a queue bound to `owner`, with default buffer sizes.
    #[must_use]
    pub fn new(owner: ThreadId) -> Self {
        Self::with_config(owner, &QueueConfig::default())
    }

    /// Creates a queue bound to the calling thread.
    #[must_use]
    pub fn for_current_thread() -> Self {
        Self::new(thread::current().id())
    }

    /// Creates a queue bound to `owner` using `config` for buffer sizing.
    #[must_use]
    pub fn with_config(owner: ThreadId, config: &QueueConfig) -> Self {
        let (recycled_tx, recycled_rx) = crossbeam_channel::bounded(config.recycled_buffers);
        Self {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            policy: P::create(owner, QueueState::with_capacity(config.initial_capacity)),
            recycled_tx,
            recycled_rx,
            initial_capacity: config.initial_capacity,
            breakpoints: None,
        }
    }

    /// Attaches a breakpoint registry checked during playback.
    #[must_use]
    pub fn with_breakpoints(mut self, registry: Arc<BreakpointRegistry>) -> Self {
        self.breakpoints = Some(registry);
        self
    }

    /// Returns the process-unique id of this queue.
    #[inline]
    #[must_use]
    pub const fn queue_id(&self) -> u32 {
        self.id
    }

    /// Returns the thread the queue is bound to.
    #[must_use]
    pub fn owner_thread(&self) -> ThreadId {
        self.policy.owner()
    }

    /// Returns true if any thread may record commands.
    #[must_use]
    pub const fn is_thread_safe(&self) -> bool {
        P::THREAD_SAFE
    }

    /// Returns the attached breakpoint registry, if any.
    #[must_use]
    pub fn breakpoints(&self) -> Option<&Arc<BreakpointRegistry>> {
        self.breakpoints.as_ref()
    }

    /// Queues a command with no return value.
    pub fn enqueue(&self, action: impl FnOnce() + Send + 'static) {
        // A refusal is logged by the policy; nothing waits on a plain command.
        let _ = self.record(|sequence| DeferredCommand::plain(sequence, Box::new(action), None));
    }

    /// Queues a command with no return value and reports `notification_id`
    /// to the playback notify callback once it has executed.
    pub fn enqueue_notified(&self, action: impl FnOnce() + Send + 'static, notification_id: u32) {
        let _ = self.record(|sequence| {
            DeferredCommand::plain(sequence, Box::new(action), Some(notification_id))
        });
    }

    /// Queues a command that resolves the returned [`AsyncResult`].
    ///
    /// The action must resolve the result before returning.
    #[must_use = "the async result is the only way to observe the return value"]
    pub fn enqueue_with_result(
        &self,
        action: impl FnOnce(&AsyncResult) + Send + 'static,
    ) -> AsyncResult {
        let result = AsyncResult::new();
        let paired = result.clone();
        let recorded =
            self.record(|sequence| DeferredCommand::with_result(sequence, Box::new(action), paired, None));
        Self::fail_unrecorded(&result, recorded);
        result
    }

    /// Queues a command that resolves the returned [`AsyncResult`] and
    /// reports `notification_id` once it has executed.
    #[must_use = "the async result is the only way to observe the return value"]
    pub fn enqueue_with_result_notified(
        &self,
        action: impl FnOnce(&AsyncResult) + Send + 'static,
        notification_id: u32,
    ) -> AsyncResult {
        let result = AsyncResult::new();
        let paired = result.clone();
        let recorded = self.record(|sequence| {
            DeferredCommand::with_result(sequence, Box::new(action), paired, Some(notification_id))
        });
        Self::fail_unrecorded(&result, recorded);
        result
    }

    fn record(&self, make: impl FnOnce(u64) -> DeferredCommand) -> SyncResult<()> {
        self.policy.with_state(self.id, |state| {
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.pending.push(make(sequence));
        })
    }

    /// A refused command never runs, so its result is failed right away and
    /// waiters see the refusal instead of blocking forever.
    fn fail_unrecorded(result: &AsyncResult, recorded: SyncResult<()>) {
        if let Err(error) = recorded {
            let _ = result.fail(error);
        }
    }

    /// Detaches every pending command into a batch.
    ///
    /// The pending buffer is replaced by an empty one, reused from the pool
    /// when one is available. Producers may keep recording while the batch
    /// executes.
    #[must_use = "a dropped batch discards its commands"]
    pub fn flush(&self) -> CommandBatch {
        let empty = self
            .recycled_rx
            .try_recv()
            .unwrap_or_else(|_| Vec::with_capacity(self.initial_capacity));

        let commands = self
            .policy
            .with_state(self.id, |state| std::mem::replace(&mut state.pending, empty))
            .unwrap_or_default();

        tracing::debug!(queue_id = self.id, commands = commands.len(), "command queue flushed");

        CommandBatch::new(
            self.id,
            commands,
            self.recycled_tx.clone(),
            self.breakpoints.clone(),
        )
    }

    /// Executes `batch` in order on the calling thread.
    ///
    /// Same as [`CommandBatch::playback`].
    pub fn playback(batch: CommandBatch, notify: impl FnMut(u32)) -> PlaybackReport {
        batch.playback(notify)
    }

    /// Flushes and immediately plays the batch back on the calling thread.
    pub fn flush_and_playback(&self, notify: impl FnMut(u32)) -> PlaybackReport {
        self.flush().playback(notify)
    }

    /// Discards every pending command without executing it.
    ///
    /// Async results of discarded commands stay unresolved forever. Never
    /// cancel while a producer may be blocked on one of them.
    pub fn cancel_all(&self) {
        let discarded = self
            .policy
            .with_state(self.id, |state| {
                let count = state.pending.len();
                state.pending.clear();
                count
            })
            .unwrap_or(0);

        if discarded > 0 {
            tracing::debug!(queue_id = self.id, discarded, "pending commands cancelled");
        }
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of pending commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.policy
            .with_state(self.id, |state| state.pending.len())
            .unwrap_or(0)
    }

    /// Returns the sequence number the next recorded command will get.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.policy
            .with_state(self.id, |state| state.next_sequence)
            .unwrap_or(0)
    }

    /// Returns the number of empty buffers waiting in the pool.
    #[must_use]
    pub fn pooled_buffers(&self) -> usize {
        self.recycled_rx.len()
    }
}

impl<P: QueuePolicy> fmt::Debug for CommandQueue<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandQueue")
            .field("id", &self.id)
            .field("thread_safe", &P::THREAD_SAFE)
            .field("owner", &self.policy.owner())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoint::BreakpointKey;
    use crate::error::SyncError;
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnOnce() + Send>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |name: &'static str| {
            let sink = Arc::clone(&sink);
            Box::new(move || sink.lock().push(name)) as Box<dyn FnOnce() + Send>
        };
        (log, make)
    }

    #[test]
    fn test_fifo_order() {
        let queue = LocalCommandQueue::for_current_thread();
        let (log, make) = recorder();

        for name in ["a", "b", "c", "d"] {
            queue.enqueue(make(name));
        }
        assert_eq!(queue.len(), 4);

        let report = queue.flush().playback(|_| {});
        assert_eq!(report.executed, 4);
        assert_eq!(*log.lock(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_result_resolved_only_after_playback() {
        let queue = LocalCommandQueue::for_current_thread();
        let (log, make) = recorder();

        queue.enqueue(make("A"));
        let sink = Arc::clone(&log);
        let b = queue.enqueue_with_result(move |result| {
            sink.lock().push("B");
            let _ = result.resolve(7_i32);
        });
        queue.enqueue(make("C"));

        let batch = queue.flush();
        assert!(!b.is_resolved());

        let report = LocalCommandQueue::playback(batch, |_| {});
        assert!(report.is_clean());
        assert_eq!(*log.lock(), vec!["A", "B", "C"]);
        assert!(b.is_resolved());
        assert_eq!(b.return_value::<i32>(), 7);
    }

    #[test]
    fn test_empty_flush() {
        let queue = LocalCommandQueue::for_current_thread();
        assert!(queue.is_empty());

        let batch = queue.flush();
        assert!(batch.is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cancel_all_discards_pending() {
        let queue = LocalCommandQueue::for_current_thread();
        let (log, make) = recorder();

        queue.enqueue(make("dropped"));
        let result = queue.enqueue_with_result(|r| {
            let _ = r.complete();
        });
        queue.cancel_all();

        assert!(queue.is_empty());
        let batch = queue.flush();
        assert!(batch.is_empty());
        drop(batch);

        assert!(log.lock().is_empty());
        assert!(!result.is_resolved());
    }

    #[test]
    fn test_sequence_numbers_are_monotonic() {
        let queue = LocalCommandQueue::for_current_thread();
        queue.enqueue(|| {});
        queue.enqueue(|| {});
        let _ = queue.flush();
        queue.enqueue(|| {});

        let batch = queue.flush();
        let sequences: Vec<u64> = batch.iter().map(DeferredCommand::sequence).collect();
        assert_eq!(sequences, vec![2]);
        assert_eq!(queue.next_sequence(), 3);
    }

    #[test]
    fn test_queue_ids_are_unique() {
        let a = LocalCommandQueue::for_current_thread();
        let b = SharedCommandQueue::for_current_thread();
        assert_ne!(a.queue_id(), b.queue_id());
        assert_ne!(a.queue_id(), 0);
    }

    #[test]
    fn test_notifications_reported_in_order() {
        let queue = LocalCommandQueue::for_current_thread();
        queue.enqueue_notified(|| {}, 10);
        queue.enqueue(|| {});
        let _result = queue.enqueue_with_result_notified(
            |r| {
                let _ = r.complete();
            },
            11,
        );

        let mut notified = Vec::new();
        let report = queue.flush_and_playback(|id| notified.push(id));
        assert_eq!(notified, vec![10, 11]);
        assert_eq!(report.notified, 2);
    }

    #[test]
    fn test_buffers_are_recycled() {
        let queue = LocalCommandQueue::for_current_thread();
        assert_eq!(queue.pooled_buffers(), 0);

        queue.enqueue(|| {});
        let _ = queue.flush_and_playback(|_| {});
        assert_eq!(queue.pooled_buffers(), 1);

        // The next flush takes the pooled buffer as the new pending buffer.
        let _ = queue.flush();
        assert_eq!(queue.pooled_buffers(), 1);
    }

    #[test]
    fn test_breakpoint_hits_marked_command() {
        let registry = Arc::new(BreakpointRegistry::new());
        let queue = LocalCommandQueue::for_current_thread().with_breakpoints(Arc::clone(&registry));

        queue.enqueue(|| {});
        queue.enqueue(|| {});
        queue.enqueue(|| {});
        registry.add(BreakpointKey::new(queue.queue_id(), 1));

        let report = queue.flush_and_playback(|_| {});
        assert_eq!(report.executed, 3);
        assert_eq!(registry.hits(), vec![BreakpointKey::new(queue.queue_id(), 1)]);
    }

    #[test]
    fn test_breakpoints_do_not_cross_queues() {
        let registry = Arc::new(BreakpointRegistry::new());
        let first = LocalCommandQueue::for_current_thread().with_breakpoints(Arc::clone(&registry));
        let second = LocalCommandQueue::for_current_thread();

        registry.add(BreakpointKey::new(first.queue_id(), 0));
        second.enqueue(|| {});
        let _ = second.flush_and_playback(|_| {});
        assert!(registry.hits().is_empty());

        first.enqueue(|| {});
        let _ = first.flush_and_playback(|_| {});
        assert_eq!(registry.hits().len(), 1);
    }

    #[test]
    fn test_failed_command_does_not_stop_batch() {
        let queue = LocalCommandQueue::for_current_thread();
        let (log, make) = recorder();

        queue.enqueue(make("upload"));
        queue.enqueue(|| panic!("texture upload exploded"));
        let failing = queue.enqueue_with_result(|_| panic!("readback exploded"));
        queue.enqueue(make("swap"));

        let report = queue.flush_and_playback(|_| {});
        assert_eq!(report.executed, 4);
        assert_eq!(report.failures.len(), 2);
        assert!(!report.is_clean());
        assert_eq!(*log.lock(), vec!["upload", "swap"]);

        match &report.failures[0] {
            SyncError::CommandFailed { sequence, message, .. } => {
                assert_eq!(*sequence, 1);
                assert!(message.contains("texture upload exploded"));
            }
            other => panic!("unexpected failure {other:?}"),
        }

        assert!(failing.is_resolved());
        assert!(matches!(failing.failure(), Some(SyncError::CommandFailed { sequence: 2, .. })));
    }

    #[test]
    fn test_panicking_hook_and_notify_do_not_stop_batch() {
        let registry = Arc::new(BreakpointRegistry::with_hook(|_| panic!("debugger detached")));
        let queue = LocalCommandQueue::for_current_thread().with_breakpoints(Arc::clone(&registry));
        let (log, make) = recorder();

        queue.enqueue(make("upload"));
        queue.enqueue_notified(make("present"), 7);
        queue.enqueue(make("swap"));
        registry.add(BreakpointKey::new(queue.queue_id(), 0));

        let report = queue.flush_and_playback(|id| {
            if id == 7 {
                panic!("listener gone");
            }
        });

        assert_eq!(report.executed, 3);
        assert_eq!(report.notified, 1);
        assert_eq!(*log.lock(), vec!["upload", "present", "swap"]);
        assert_eq!(report.failures.len(), 2);
        match &report.failures[0] {
            SyncError::CommandFailed { sequence, message, .. } => {
                assert_eq!(*sequence, 0);
                assert!(message.contains("breakpoint hook: debugger detached"));
            }
            other => panic!("unexpected failure {other:?}"),
        }
        match &report.failures[1] {
            SyncError::CommandFailed { sequence, message, .. } => {
                assert_eq!(*sequence, 1);
                assert!(message.contains("notify callback: listener gone"));
            }
            other => panic!("unexpected failure {other:?}"),
        }
    }

    #[test]
    fn test_unresolved_result_is_completed_empty() {
        let queue = LocalCommandQueue::for_current_thread();
        let forgotten = queue.enqueue_with_result(|_| {});
        let _ = queue.flush_and_playback(|_| {});

        assert!(forgotten.is_resolved());
        assert_eq!(forgotten.try_return_value::<i32>(), Err(SyncError::NoValue));
    }

    #[test]
    fn test_shared_queue_multi_producer() {
        let queue = Arc::new(SharedCommandQueue::for_current_thread());
        let counter = Arc::new(Mutex::new(0_u32));

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let counter = Arc::clone(&counter);
                        queue.enqueue(move || *counter.lock() += 1);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(queue.len(), 400);
        let report = queue.flush_and_playback(|_| {});
        assert_eq!(report.executed, 400);
        assert_eq!(*counter.lock(), 400);
    }

    #[test]
    fn test_shared_queue_preserves_per_producer_order() {
        let queue = Arc::new(SharedCommandQueue::for_current_thread());
        let log = Arc::new(Mutex::new(Vec::new()));

        let producers: Vec<_> = (0..3_u32)
            .map(|producer| {
                let queue = Arc::clone(&queue);
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for step in 0..50_u32 {
                        let log = Arc::clone(&log);
                        queue.enqueue(move || log.lock().push((producer, step)));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        let _ = queue.flush_and_playback(|_| {});

        let log = log.lock();
        for producer in 0..3_u32 {
            let steps: Vec<u32> = log.iter().filter(|(p, _)| *p == producer).map(|(_, s)| *s).collect();
            assert_eq!(steps, (0..50).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_flush_while_producing_keeps_new_commands() {
        let queue = SharedCommandQueue::for_current_thread();
        queue.enqueue(|| {});
        let batch = queue.flush();
        queue.enqueue(|| {});

        assert_eq!(batch.len(), 1);
        assert_eq!(queue.len(), 1);
        let _ = batch.playback(|_| {});
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_batch_plays_back_on_other_thread() {
        let queue = LocalCommandQueue::for_current_thread();
        let result = queue.enqueue_with_result(|r| {
            let _ = r.resolve(thread::current().name().map(str::to_owned));
        });

        let batch = queue.flush();
        thread::Builder::new()
            .name("core".into())
            .spawn(move || batch.playback(|_| {}))
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(result.return_value::<Option<String>>(), Some("core".to_owned()));
        assert_eq!(queue.pooled_buffers(), 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "accessed from")]
    fn test_single_producer_wrong_thread_panics() {
        let queue = LocalCommandQueue::for_current_thread();
        let result = thread::spawn(move || queue.enqueue(|| {})).join();
        if let Err(payload) = result {
            std::panic::resume_unwind(payload);
        }
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_wrong_thread_result_fails_instead_of_hanging() {
        let owner = thread::spawn(|| thread::current().id()).join().unwrap();
        let queue = LocalCommandQueue::new(owner);

        let result = queue.enqueue_with_result(|r| {
            let _ = r.resolve(1_i32);
        });
        let notified = queue.enqueue_with_result_notified(|r| {
            let _ = r.complete();
        }, 3);

        assert!(result.block_until_complete().is_ok());
        assert!(matches!(result.failure(), Some(SyncError::WrongThread { .. })));
        assert!(matches!(notified.failure(), Some(SyncError::WrongThread { .. })));
    }

    #[test]
    fn test_single_producer_bound_to_other_thread() {
        let owner = thread::spawn(|| thread::current().id()).join().unwrap();
        let queue = LocalCommandQueue::new(owner);
        assert_eq!(queue.owner_thread(), owner);
        assert!(!queue.is_thread_safe());
        assert!(SharedCommandQueue::new(owner).is_thread_safe());
    }
}
