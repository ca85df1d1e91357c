//! # OROBOROS Sync
//!
//! Hand-off of work from the simulation thread to the core thread.
//!
//! ## Design Principles
//!
//! 1. **Record, then replay** - producers record deferred commands; the core
//!    thread plays whole batches back in recording order
//! 2. **One lock at most** - single-producer queues take no lock at all,
//!    multi-producer queues lock only the pending buffer
//! 3. **Single-assignment results** - a command's return value travels back
//!    through an [`AsyncResult`] that is resolved exactly once
//! 4. **Failures stay local** - a panicking command fails its own result and
//!    the rest of the batch keeps running
//!
//! ## Thread Model
//!
//! ```text
//!   simulation thread                            core thread
//!   ┌──────────────────┐   CommandBatch   ┌──────────────────────┐
//!   │ CommandQueue     │ ───────────────► │ playback()           │
//!   │   enqueue*()     │                  │   breakpoint check   │
//!   │   flush()        │ ◄─────────────── │   run / resolve      │
//!   └──────────────────┘  empty buffer    │   notify(id)         │
//!          ▲                              └──────────────────────┘
//!          └──── AsyncResult::block_until_complete() ◄── resolve()
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use oroboros_sync::{CoreThread, CoreThreadConfig};
//!
//! let core = CoreThread::spawn(CoreThreadConfig::default())?;
//!
//! core.queue_command(|| upload_mesh());
//! let size = core.queue_return_command(|r| { let _ = r.resolve(gpu_memory()); }, true)?;
//! let bytes: u64 = size.return_value();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod async_result;
pub mod breakpoint;
pub mod command;
pub mod config;
pub mod core_thread;
pub mod error;
pub mod executor;
pub mod memory;
pub mod queue;

pub use async_result::AsyncResult;
pub use breakpoint::{BreakpointHook, BreakpointKey, BreakpointRegistry};
pub use command::{CommandAction, DeferredCommand};
pub use config::{CoreThreadConfig, QueueConfig};
pub use core_thread::CoreThread;
pub use error::{SyncError, SyncResult};
pub use executor::is_executor_thread;
pub use memory::{CoreSyncData, FrameAlloc, SyncDataReader, SyncDataWriter};
pub use queue::{
    CommandBatch, CommandQueue, LocalCommandQueue, MultiProducer, PlaybackReport, QueuePolicy,
    SharedCommandQueue, SingleProducer,
};
