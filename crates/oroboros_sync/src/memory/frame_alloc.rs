//! # Frame Allocator
//!
//! Per-frame budget for sync payloads.
//!
//! Every sync pass serialises the dirty state of each object into a payload
//! that lives until the core thread has applied it, which is at most one
//! frame later. The frame allocator hands out those buffers and accounts them
//! against a fixed per-frame budget; `reset()` starts the next frame.

use super::sync_data::SyncDataWriter;

/// Payloads are accounted at this alignment.
const PAYLOAD_ALIGN: usize = 8;

/// A bump-style allocator for sync payloads, reset once per frame.
///
/// Unlike a plain arena it never refuses an allocation: a payload that does
/// not fit the budget is still handed out and counted as overflow, because
/// dropping a sync payload would leave the core thread out of date.
///
/// # Thread Safety
///
/// This allocator is NOT thread-safe. The sync pass owns it.
///
/// # Example
///
/// ```rust,ignore
/// let mut alloc = FrameAlloc::new(64 * 1024);
///
/// let mut writer = alloc.writer(16);
/// writer.write(&1.0_f32).write(&2_u32);
/// let payload = writer.finish();
///
/// // End of frame
/// alloc.reset();
/// ```
#[derive(Debug)]
pub struct FrameAlloc {
    /// Budget per frame, in bytes.
    capacity: usize,
    /// Bytes handed out this frame (aligned).
    used: usize,
    /// Bytes handed out beyond the budget this frame.
    overflow: usize,
    /// Largest `used` seen in any frame.
    peak: usize,
    /// Frames completed so far.
    frame: u64,
}

impl FrameAlloc {
    /// Creates a new allocator with a per-frame budget in bytes.
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: 0,
            overflow: 0,
            peak: 0,
            frame: 0,
        }
    }

    /// Returns the per-frame budget in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the bytes handed out this frame.
    #[inline]
    #[must_use]
    pub const fn used(&self) -> usize {
        self.used
    }

    /// Returns the budget left this frame.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.used)
    }

    /// Returns the bytes handed out beyond the budget this frame.
    #[inline]
    #[must_use]
    pub const fn overflow(&self) -> usize {
        self.overflow
    }

    /// Returns the highest per-frame usage seen so far.
    #[inline]
    #[must_use]
    pub const fn peak(&self) -> usize {
        self.peak
    }

    /// Returns the number of completed frames.
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Allocates an empty payload buffer with room for `size` bytes.
    pub fn alloc(&mut self, size: usize) -> Vec<u8> {
        let aligned = (size + PAYLOAD_ALIGN - 1) & !(PAYLOAD_ALIGN - 1);
        let new_used = self.used + aligned;

        if new_used > self.capacity {
            if self.overflow == 0 {
                tracing::warn!(
                    frame = self.frame,
                    capacity = self.capacity,
                    requested = new_used,
                    "frame allocator budget exceeded"
                );
            }
            self.overflow += new_used - self.capacity.max(self.used);
        }

        self.used = new_used;
        self.peak = self.peak.max(self.used);
        Vec::with_capacity(size)
    }

    /// Allocates a payload buffer and wraps it in a writer.
    pub fn writer(&mut self, size_hint: usize) -> SyncDataWriter {
        SyncDataWriter::new(self.alloc(size_hint))
    }

    /// Starts a new frame, releasing this frame's budget.
    ///
    /// Payloads handed out earlier stay valid: they are owned buffers. The
    /// budget only tracks how much was produced per frame.
    #[inline]
    pub fn reset(&mut self) {
        self.used = 0;
        self.overflow = 0;
        self.frame += 1;
    }
}
