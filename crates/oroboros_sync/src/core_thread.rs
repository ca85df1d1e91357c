//! # Core Thread
//!
//! The consumer side: one dedicated thread that plays back command batches
//! submitted by the simulation thread.
//!
//! ```text
//!   simulation thread(s)                     core thread
//!   ────────────────────                     ───────────
//!   queue_command() ──► SharedCommandQueue
//!   submit(block)   ──► flush() ──► [bounded channel] ──► batch.playback()
//!        │                                                     │
//!        └──── block: wait on frame fence ◄──── fence.complete()
//!                                         notify ids ──► drain_notifications()
//! ```
//!
//! The channel is bounded by `max_in_flight_batches`, so a producer that
//! runs too far ahead of the core thread blocks in `submit` until a frame
//! has been played back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::async_result::AsyncResult;
use crate::config::CoreThreadConfig;
use crate::error::{SyncError, SyncResult};
use crate::executor::ExecutorScope;
use crate::queue::{CommandBatch, SharedCommandQueue};

/// Work sent to the core thread.
enum Submission {
    /// One flushed frame of commands plus the fence completed after it.
    Batch {
        batch: CommandBatch,
        fence: AsyncResult,
    },
    /// Stop after everything queued before this.
    Shutdown,
}

/// State written by the core thread and read by producers.
#[derive(Default)]
struct CoreShared {
    failures: Mutex<Vec<SyncError>>,
    frames: AtomicU64,
}

/// Owns the core thread and the shared queue that feeds it.
pub struct CoreThread {
    queue: Arc<SharedCommandQueue>,
    submissions: Sender<Submission>,
    notifications: Receiver<u32>,
    shared: Arc<CoreShared>,
    thread_id: ThreadId,
    handle: Option<JoinHandle<()>>,
}

impl CoreThread {
    /// Starts the core thread.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if `config` does not validate, or
    /// [`SyncError::ThreadSpawn`] if the OS refuses the thread.
    pub fn spawn(config: CoreThreadConfig) -> SyncResult<Self> {
        config.validate()?;

        let (submit_tx, submit_rx) = crossbeam_channel::bounded(config.max_in_flight_batches);
        let (notify_tx, notify_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(CoreShared::default());

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || Self::run(&submit_rx, &notify_tx, &worker_shared))
            .map_err(|e| SyncError::ThreadSpawn(e.to_string()))?;

        let thread_id = handle.thread().id();
        let queue = Arc::new(SharedCommandQueue::with_config(thread_id, &config.queue));

        tracing::info!(
            thread = %config.thread_name,
            queue_id = queue.queue_id(),
            max_in_flight = config.max_in_flight_batches,
            "core thread started"
        );

        Ok(Self {
            queue,
            submissions: submit_tx,
            notifications: notify_rx,
            shared,
            thread_id,
            handle: Some(handle),
        })
    }

    /// Core thread main loop.
    fn run(submissions: &Receiver<Submission>, notifications: &Sender<u32>, shared: &CoreShared) {
        // Everything on this thread executes commands; blocking here on an
        // async result must be refused.
        let _executing = ExecutorScope::enter();

        for submission in submissions {
            match submission {
                Submission::Batch { batch, fence } => {
                    let report = batch.playback(|id| {
                        // Nobody draining is fine; the ids are informational.
                        let _ = notifications.send(id);
                    });

                    if !report.is_clean() {
                        shared.failures.lock().extend(report.failures);
                    }
                    shared.frames.fetch_add(1, Ordering::Release);
                    let _ = fence.complete();
                }
                Submission::Shutdown => break,
            }
        }

        tracing::info!("core thread stopped");
    }

    /// Returns the queue the core thread consumes.
    ///
    /// Share it with anything that records commands, such as an object
    /// manager.
    #[inline]
    #[must_use]
    pub fn queue(&self) -> &Arc<SharedCommandQueue> {
        &self.queue
    }

    /// Records a command for the next submitted frame.
    pub fn queue_command(&self, action: impl FnOnce() + Send + 'static) {
        self.queue.enqueue(action);
    }

    /// Records a command that produces a value.
    ///
    /// With `block` set, the pending frame is submitted and the call waits
    /// until the command has executed, so the value is ready on return.
    ///
    /// # Errors
    ///
    /// Fails like [`submit`](Self::submit) when blocking.
    pub fn queue_return_command(
        &self,
        action: impl FnOnce(&AsyncResult) + Send + 'static,
        block: bool,
    ) -> SyncResult<AsyncResult> {
        let result = self.queue.enqueue_with_result(action);
        if block {
            self.submit(true)?;
            result.block_until_complete()?;
        }
        Ok(result)
    }

    /// Flushes the queue and hands the batch to the core thread.
    ///
    /// With `block` set, waits until that batch has been played back.
    ///
    /// # Errors
    ///
    /// - [`SyncError::WouldDeadlock`] when called from the core thread with
    ///   `block` set, or when the core thread's channel is full.
    /// - [`SyncError::CoreThreadStopped`] after shutdown. The flushed
    ///   commands are discarded.
    pub fn submit(&self, block: bool) -> SyncResult<()> {
        let on_core_thread = self.is_core_thread();
        if block && on_core_thread {
            tracing::error!("refusing a blocking submit from the core thread");
            return Err(SyncError::WouldDeadlock);
        }

        let batch = self.queue.flush();
        let fence = AsyncResult::new();
        let submission = Submission::Batch {
            batch,
            fence: fence.clone(),
        };

        if on_core_thread {
            // The core thread cannot wait for itself to make room.
            match self.submissions.try_send(submission) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => return Err(SyncError::WouldDeadlock),
                Err(TrySendError::Disconnected(_)) => return Err(SyncError::CoreThreadStopped),
            }
        } else if self.submissions.send(submission).is_err() {
            tracing::error!("submit after core thread shutdown, commands discarded");
            return Err(SyncError::CoreThreadStopped);
        }

        if block {
            fence.block_until_complete()?;
        }
        Ok(())
    }

    /// Returns the core thread's id.
    #[inline]
    #[must_use]
    pub const fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Returns true if called from the core thread.
    #[must_use]
    pub fn is_core_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Returns true until [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Takes every notification id reported since the last call.
    pub fn drain_notifications(&self) -> Vec<u32> {
        self.notifications.try_iter().collect()
    }

    /// Takes every command failure reported since the last call.
    pub fn take_failures(&self) -> Vec<SyncError> {
        std::mem::take(&mut *self.shared.failures.lock())
    }

    /// Returns the number of batches played back so far.
    #[must_use]
    pub fn frames_executed(&self) -> u64 {
        self.shared.frames.load(Ordering::Acquire)
    }

    /// Stops the core thread.
    ///
    /// Commands recorded but not submitted are cancelled. Batches already
    /// submitted still execute before the thread exits.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.queue.cancel_all();
        let _ = self.submissions.send(Submission::Shutdown);

        if handle.join().is_err() {
            tracing::error!("core thread panicked during shutdown");
        }
    }
}

impl Drop for CoreThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CoreThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreThread")
            .field("thread_id", &self.thread_id)
            .field("queue_id", &self.queue.queue_id())
            .field("running", &self.is_running())
            .field("frames_executed", &self.frames_executed())
            .finish()
    }
}
