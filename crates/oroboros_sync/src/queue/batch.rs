//! Flushed command batches and their playback.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::async_result::AsyncResult;
use crate::breakpoint::{BreakpointKey, BreakpointRegistry};
use crate::command::{CommandAction, DeferredCommand};
use crate::error::SyncError;
use crate::executor::ExecutorScope;

/// Outcome of one playback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    /// Commands executed (including failed ones).
    pub executed: usize,
    /// Notify callbacks invoked.
    pub notified: usize,
    /// One [`SyncError::CommandFailed`] per panicking command, breakpoint
    /// hook or notify callback.
    pub failures: Vec<SyncError>,
}

impl PlaybackReport {
    /// Returns true if no command failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.executed += other.executed;
        self.notified += other.notified;
        self.failures.extend(other.failures);
    }
}

/// A detached run of commands, ready to be played back on the core thread.
///
/// Dropping a batch without playing it back discards its commands. Either
/// way, the emptied buffer goes back to the queue's pool.
pub struct CommandBatch {
    queue_id: u32,
    commands: Vec<DeferredCommand>,
    recycle: Sender<Vec<DeferredCommand>>,
    breakpoints: Option<Arc<BreakpointRegistry>>,
}

impl CommandBatch {
    pub(crate) fn new(
        queue_id: u32,
        commands: Vec<DeferredCommand>,
        recycle: Sender<Vec<DeferredCommand>>,
        breakpoints: Option<Arc<BreakpointRegistry>>,
    ) -> Self {
        Self {
            queue_id,
            commands,
            recycle,
            breakpoints,
        }
    }

    /// Returns the id of the queue this batch was flushed from.
    #[inline]
    #[must_use]
    pub const fn queue_id(&self) -> u32 {
        self.queue_id
    }

    /// Returns the number of commands in the batch.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if the batch holds no commands.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Iterates over the commands in execution order.
    pub fn iter(&self) -> std::slice::Iter<'_, DeferredCommand> {
        self.commands.iter()
    }

    /// Executes every command in order on the calling thread.
    ///
    /// For each command:
    /// 1. breakpoint check (diagnostic only)
    /// 2. run the action; result commands get their [`AsyncResult`]
    /// 3. if the command asked for it, `notify(notification_id)`
    ///
    /// A panicking command is isolated: its async result is failed, the
    /// failure is logged and reported, and the rest of the batch still runs.
    /// A panicking breakpoint hook or notify callback is reported the same
    /// way and does not stop the batch either.
    /// The notify callback fires for failed commands too, since they did
    /// finish executing.
    pub fn playback(mut self, mut notify: impl FnMut(u32)) -> PlaybackReport {
        let _executing = ExecutorScope::enter();
        let mut report = PlaybackReport::default();
        let mut commands = std::mem::take(&mut self.commands);

        for command in commands.drain(..) {
            let (sequence, action, notification) = command.into_parts();

            if let Some(registry) = &self.breakpoints {
                let key = BreakpointKey::new(self.queue_id, sequence);
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| registry.check(key))) {
                    let error = callback_failed(self.queue_id, sequence, "breakpoint hook", &*payload);
                    tracing::error!(%error, "breakpoint hook panicked");
                    report.failures.push(error);
                }
            }

            if let Err(error) = execute(self.queue_id, sequence, action) {
                tracing::error!(%error, "deferred command failed");
                report.failures.push(error);
            }
            report.executed += 1;

            if let Some(id) = notification {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| notify(id))) {
                    let error = callback_failed(self.queue_id, sequence, "notify callback", &*payload);
                    tracing::error!(%error, "notify callback panicked");
                    report.failures.push(error);
                }
                report.notified += 1;
            }
        }

        // Hand the emptied buffer back so Drop recycles it.
        self.commands = commands;

        tracing::debug!(
            queue_id = self.queue_id,
            executed = report.executed,
            failed = report.failures.len(),
            "command batch played back"
        );
        report
    }
}

fn execute(queue_id: u32, sequence: u64, action: CommandAction) -> Result<(), SyncError> {
    match action {
        CommandAction::Plain(run) => panic::catch_unwind(AssertUnwindSafe(run))
            .map_err(|payload| command_failed(queue_id, sequence, &*payload)),
        CommandAction::WithResult(run, result) => {
            match panic::catch_unwind(AssertUnwindSafe(|| run(&result))) {
                Ok(()) => {
                    complete_if_forgotten(&result, queue_id, sequence);
                    Ok(())
                }
                Err(payload) => {
                    let error = command_failed(queue_id, sequence, &*payload);
                    // The action may have resolved before panicking; keep that.
                    if !result.is_resolved() {
                        let _ = result.fail(error.clone());
                    }
                    Err(error)
                }
            }
        }
    }
}

fn complete_if_forgotten(result: &AsyncResult, queue_id: u32, sequence: u64) {
    if result.is_resolved() {
        return;
    }
    tracing::warn!(queue_id, sequence, "command returned without resolving its async result");
    let _ = result.complete();
}

fn command_failed(queue_id: u32, sequence: u64, payload: &(dyn Any + Send)) -> SyncError {
    SyncError::CommandFailed {
        queue_id,
        sequence,
        message: panic_message(payload),
    }
}

fn callback_failed(
    queue_id: u32,
    sequence: u64,
    callback: &str,
    payload: &(dyn Any + Send),
) -> SyncError {
    SyncError::CommandFailed {
        queue_id,
        sequence,
        message: format!("{callback}: {}", panic_message(payload)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

impl Drop for CommandBatch {
    fn drop(&mut self) {
        if !self.commands.is_empty() {
            tracing::debug!(
                queue_id = self.queue_id,
                discarded = self.commands.len(),
                "command batch dropped without playback"
            );
        }

        let mut buffer = std::mem::take(&mut self.commands);
        buffer.clear();
        // Pool full or queue gone: let the buffer go.
        let _ = self.recycle.try_send(buffer);
    }
}

impl fmt::Debug for CommandBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBatch")
            .field("queue_id", &self.queue_id)
            .field("commands", &self.commands.len())
            .finish()
    }
}
