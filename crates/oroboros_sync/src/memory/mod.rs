//! # Sync Payload Memory
//!
//! ```text
//!   producer thread                         core thread
//!   ───────────────                         ───────────
//!   FrameAlloc::writer() ─► SyncDataWriter
//!        write::<T: Pod>()
//!        finish() ─────────► CoreSyncData ─► SyncDataReader::read::<T>()
//!   FrameAlloc::reset()  (next frame)
//! ```

mod frame_alloc;
mod sync_data;

pub use frame_alloc::FrameAlloc;
pub use sync_data::{CoreSyncData, SyncDataReader, SyncDataWriter};
