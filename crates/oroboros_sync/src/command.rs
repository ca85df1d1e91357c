//! # Deferred Commands
//!
//! A deferred command is one unit of work recorded on the simulation thread
//! and executed later on the core thread.

use std::fmt;

use crate::async_result::AsyncResult;

/// A command callback that produces nothing.
pub type PlainAction = Box<dyn FnOnce() + Send + 'static>;

/// A command callback that must resolve the [`AsyncResult`] it is handed.
pub type ResultAction = Box<dyn FnOnce(&AsyncResult) + Send + 'static>;

/// The callback of a command.
///
/// A command either returns nothing or resolves an [`AsyncResult`], never
/// both.
pub enum CommandAction {
    /// Fire-and-forget work.
    Plain(PlainAction),
    /// Work whose return value is observed through the paired result.
    WithResult(ResultAction, AsyncResult),
}

/// One recorded unit of deferred work.
pub struct DeferredCommand {
    /// Sequence number within the owning queue (monotonic, never reused).
    sequence: u64,
    /// What to run.
    action: CommandAction,
    /// Notification id reported after execution, if requested.
    notification: Option<u32>,
}

impl DeferredCommand {
    /// Creates a command with no return value.
    pub fn plain(sequence: u64, action: PlainAction, notification: Option<u32>) -> Self {
        Self {
            sequence,
            action: CommandAction::Plain(action),
            notification,
        }
    }

    /// Creates a command that resolves `result`.
    pub fn with_result(
        sequence: u64,
        action: ResultAction,
        result: AsyncResult,
        notification: Option<u32>,
    ) -> Self {
        Self {
            sequence,
            action: CommandAction::WithResult(action, result),
            notification,
        }
    }

    /// Returns the sequence number of this command.
    #[inline]
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns true if the command resolves an async result.
    #[inline]
    #[must_use]
    pub const fn expects_result(&self) -> bool {
        matches!(self.action, CommandAction::WithResult(..))
    }

    /// Returns true if playback reports this command through the notify
    /// callback.
    #[inline]
    #[must_use]
    pub const fn notify_on_complete(&self) -> bool {
        self.notification.is_some()
    }

    /// Returns the notification id, if any.
    #[inline]
    #[must_use]
    pub const fn notification_id(&self) -> Option<u32> {
        self.notification
    }

    /// Returns the async result this command resolves, if any.
    #[must_use]
    pub fn result(&self) -> Option<&AsyncResult> {
        match &self.action {
            CommandAction::Plain(_) => None,
            CommandAction::WithResult(_, result) => Some(result),
        }
    }

    /// Splits the command into its parts for execution.
    pub(crate) fn into_parts(self) -> (u64, CommandAction, Option<u32>) {
        (self.sequence, self.action, self.notification)
    }
}

impl fmt::Debug for DeferredCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredCommand")
            .field("sequence", &self.sequence)
            .field("expects_result", &self.expects_result())
            .field("notification", &self.notification)
            .finish()
    }
}
