//! # OROBOROS Objects
//!
//! Dual objects: simulation-side state paired with a core-thread
//! counterpart, kept in sync through batched, ordered commands instead of
//! shared memory.
//!
//! ## Design Principles
//!
//! 1. **Two instances per entity** - the simulation mutates its
//!    [`CoreSource`]; the core thread only ever sees payloads applied to its
//!    [`CoreCounterpart`]
//! 2. **Bitmask dirtiness** - [`DirtyFlags`] say *what* changed so dependants
//!    can ignore changes that do not concern them
//! 3. **Weak dependency keys** - dependants name dependencies by
//!    [`CoreObjectId`] and never own them
//! 4. **One queue, one order** - init, payloads and teardown of an object all
//!    go through the same queue
//!
//! ## Example
//!
//! ```rust,ignore
//! use oroboros_objects::{CoreObjectManager, CreateOptions};
//! use oroboros_sync::{CoreThread, CoreThreadConfig};
//!
//! let core = CoreThread::spawn(CoreThreadConfig::default())?;
//! let manager = CoreObjectManager::new(core.queue().clone());
//!
//! let viewport = manager.create(Viewport::new(1920, 1080), CreateOptions::default());
//! viewport.initialize()?;
//!
//! viewport.modify(Viewport::SIZE, |v| v.resize(1280, 720));
//! manager.sync_to_core();
//! core.submit(false)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod counterpart;
pub mod error;
pub mod flags;
pub mod graph;
pub mod id;
pub mod manager;
pub mod object;
mod registry;
pub mod traits;

pub use config::ManagerConfig;
pub use counterpart::CounterpartHandle;
pub use error::{ObjectError, ObjectResult};
pub use flags::DirtyFlags;
pub use graph::DependencyGraph;
pub use id::{CoreObjectId, CoreObjectState};
pub use manager::{CoreObjectManager, SyncPassStats};
pub use object::{CoreObject, CreateOptions};
pub use traits::{CoreCounterpart, CoreSource};
