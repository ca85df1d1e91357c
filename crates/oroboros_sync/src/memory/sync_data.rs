//! Sync payloads: plain bytes written on the producer, read on the core thread.
//!
//! Values go in and come out as [`bytemuck::Pod`] so a payload never needs a
//! serializer; the reader and writer only have to agree on the order.

use bytemuck::Pod;

/// A sync payload produced by `sync_to_core` and consumed by the counterpart.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CoreSyncData {
    bytes: Vec<u8>,
}

impl CoreSyncData {
    /// Creates an empty payload.
    #[must_use]
    pub const fn empty() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Wraps raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Returns the payload size in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the payload holds no bytes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Starts reading values from the front of the payload.
    #[must_use]
    pub fn reader(&self) -> SyncDataReader<'_> {
        SyncDataReader {
            bytes: &self.bytes,
            offset: 0,
        }
    }
}

impl std::fmt::Debug for CoreSyncData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreSyncData")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Appends plain values to a payload buffer.
#[derive(Debug)]
pub struct SyncDataWriter {
    bytes: Vec<u8>,
}

impl SyncDataWriter {
    /// Wraps a buffer, usually one from [`FrameAlloc`](super::FrameAlloc).
    #[must_use]
    pub fn new(mut buffer: Vec<u8>) -> Self {
        buffer.clear();
        Self { bytes: buffer }
    }

    /// Appends one value.
    pub fn write<T: Pod>(&mut self, value: &T) -> &mut Self {
        self.bytes.extend_from_slice(bytemuck::bytes_of(value));
        self
    }

    /// Appends a bool as one byte.
    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.bytes.push(u8::from(value));
        self
    }

    /// Appends a length-prefixed slice.
    ///
    /// The prefix is a `u32`; longer slices are cut to `u32::MAX` elements
    /// (a panic in debug builds, a warning in release builds).
    pub fn write_slice<T: Pod>(&mut self, values: &[T]) -> &mut Self {
        let len = slice_prefix(values.len());
        self.write(&len);
        let count = len as usize;
        self.bytes
            .extend_from_slice(bytemuck::cast_slice(&values[..count]));
        self
    }

    /// Returns the bytes written so far.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if nothing has been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Seals the payload.
    #[must_use]
    pub fn finish(self) -> CoreSyncData {
        CoreSyncData { bytes: self.bytes }
    }
}

/// Length prefix for a slice of `len` elements, clamped to `u32::MAX`.
fn slice_prefix(len: usize) -> u32 {
    match u32::try_from(len) {
        Ok(prefix) => prefix,
        Err(_) => {
            if cfg!(debug_assertions) {
                panic!("sync payload slice of {len} elements overflows the u32 prefix");
            }
            tracing::warn!(len, "sync payload slice truncated to u32::MAX elements");
            u32::MAX
        }
    }
}

/// Reads values back in the order they were written.
///
/// Every read returns `None` once the payload runs short; the cursor does
/// not advance on a failed read.
#[derive(Debug, Clone)]
pub struct SyncDataReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl SyncDataReader<'_> {
    /// Reads one value.
    pub fn read<T: Pod>(&mut self) -> Option<T> {
        let size = std::mem::size_of::<T>();
        let end = self.offset.checked_add(size)?;
        let raw = self.bytes.get(self.offset..end)?;
        self.offset = end;
        Some(bytemuck::pod_read_unaligned(raw))
    }

    /// Reads a bool written by [`SyncDataWriter::write_bool`].
    pub fn read_bool(&mut self) -> Option<bool> {
        self.read::<u8>().map(|byte| byte != 0)
    }

    /// Reads a slice written by [`SyncDataWriter::write_slice`].
    pub fn read_vec<T: Pod>(&mut self) -> Option<Vec<T>> {
        let start = self.offset;
        let len = self.read::<u32>()? as usize;
        let fits = len
            .checked_mul(std::mem::size_of::<T>())
            .is_some_and(|bytes| bytes <= self.remaining());
        if !fits {
            self.offset = start;
            return None;
        }
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            match self.read::<T>() {
                Some(value) => values.push(value),
                None => {
                    self.offset = start;
                    return None;
                }
            }
        }
        Some(values)
    }

    /// Returns the unread byte count.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    /// Returns true once every byte has been read.
    #[inline]
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Transform {
        position: [f32; 3],
        scale: f32,
    }

    #[test]
    fn test_mixed_payload_reads_in_order() {
        let mut writer = SyncDataWriter::new(Vec::new());
        let transform = Transform {
            position: [1.0, 2.0, 3.0],
            scale: 0.5,
        };
        writer.write(&7_u8).write(&transform).write_bool(true);
        let payload = writer.finish();

        let mut reader = payload.reader();
        assert_eq!(reader.read::<u8>(), Some(7));
        // Unaligned on purpose: the transform starts at byte 1.
        assert_eq!(reader.read::<Transform>(), Some(transform));
        assert_eq!(reader.read_bool(), Some(true));
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_short_read_does_not_advance() {
        let payload = CoreSyncData::from_bytes(vec![1, 2]);
        let mut reader = payload.reader();

        assert_eq!(reader.read::<u32>(), None);
        assert_eq!(reader.remaining(), 2);
        assert_eq!(reader.read::<u16>(), Some(u16::from_ne_bytes([1, 2])));
    }

    #[test]
    fn test_slice_payload() {
        let mut writer = SyncDataWriter::new(Vec::with_capacity(64));
        writer.write_slice(&[10_u32, 20, 30]);
        let payload = writer.finish();
        assert_eq!(payload.len(), 16);

        let mut reader = payload.reader();
        assert_eq!(reader.read_vec::<u32>(), Some(vec![10, 20, 30]));
    }

    #[test]
    fn test_truncated_slice_rewinds() {
        let mut writer = SyncDataWriter::new(Vec::new());
        writer.write(&4_u32).write(&1_u32);
        let payload = writer.finish();

        let mut reader = payload.reader();
        assert_eq!(reader.read_vec::<u32>(), None);
        assert_eq!(reader.remaining(), 8);
    }

    #[test]
    fn test_oversized_slice_prefix_rejected_without_allocating() {
        let mut writer = SyncDataWriter::new(Vec::new());
        writer.write(&u32::MAX).write(&9_u64);
        let payload = writer.finish();

        let mut reader = payload.reader();
        assert_eq!(reader.read_vec::<u64>(), None);
        assert_eq!(reader.remaining(), 12);
        assert_eq!(reader.read::<u32>(), Some(u32::MAX));
    }

    #[test]
    fn test_slice_prefix_in_range() {
        assert_eq!(slice_prefix(0), 0);
        assert_eq!(slice_prefix(u32::MAX as usize), u32::MAX);
    }

    #[test]
    #[cfg(all(debug_assertions, target_pointer_width = "64"))]
    #[should_panic(expected = "overflows the u32 prefix")]
    fn test_slice_prefix_overflow_asserts_in_debug() {
        let _ = slice_prefix(u32::MAX as usize + 1);
    }

    #[test]
    #[cfg(all(not(debug_assertions), target_pointer_width = "64"))]
    fn test_slice_prefix_overflow_clamps_in_release() {
        assert_eq!(slice_prefix(u32::MAX as usize + 1), u32::MAX);
    }

    #[test]
    fn test_empty_payload() {
        let payload = CoreSyncData::empty();
        assert!(payload.is_empty());
        assert!(payload.reader().is_exhausted());
    }
}
