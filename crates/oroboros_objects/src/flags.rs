//! Dirty bitmask for core objects.
//!
//! Bits 0..31 belong to the object type (e.g. `TRANSFORM`, `VIEWPORT_SIZE`);
//! bit 31 is reserved for "a dependency changed".

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};
use std::sync::atomic::{AtomicU32, Ordering};

/// Which aspects of an object changed since the last sync.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DirtyFlags(u32);

impl DirtyFlags {
    /// Nothing changed.
    pub const NONE: Self = Self(0);
    /// Reserved: set on dependants when one of their dependencies changed.
    pub const DEPENDENCY: Self = Self(1 << 31);
    /// Every object-defined bit, without the dependency bit.
    pub const ALL_OWN: Self = Self(!(1 << 31));
    /// Every bit.
    pub const ALL: Self = Self(u32::MAX);

    /// Creates flags from raw bits.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Creates a single object-defined flag. `index` must be below 31.
    #[inline]
    #[must_use]
    pub const fn bit(index: u32) -> Self {
        debug_assert!(index < 31, "bit 31 is reserved for DEPENDENCY");
        Self(1 << index)
    }

    /// Returns the raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if no bit is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if every bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if any bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for DirtyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DirtyFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for DirtyFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for DirtyFlags {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl Not for DirtyFlags {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl fmt::Debug for DirtyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.contains(Self::DEPENDENCY) {
            write!(f, "DirtyFlags({:#x} | DEPENDENCY)", self.0 & Self::ALL_OWN.0)
        } else {
            write!(f, "DirtyFlags({:#x})", self.0)
        }
    }
}

/// Atomic dirty mask, written by any producer thread.
#[derive(Debug, Default)]
pub(crate) struct DirtyCell(AtomicU32);

impl DirtyCell {
    pub(crate) fn load(&self) -> DirtyFlags {
        DirtyFlags(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn insert(&self, flags: DirtyFlags) {
        self.0.fetch_or(flags.0, Ordering::AcqRel);
    }

    /// Clears only `flags`, keeping bits set after they were read.
    pub(crate) fn remove(&self, flags: DirtyFlags) {
        self.0.fetch_and(!flags.0, Ordering::AcqRel);
    }

    pub(crate) fn clear(&self) {
        self.0.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSFORM: DirtyFlags = DirtyFlags::bit(0);
    const MATERIAL: DirtyFlags = DirtyFlags::bit(1);

    #[test]
    fn test_flag_ops() {
        let flags = TRANSFORM | MATERIAL;
        assert!(flags.contains(TRANSFORM));
        assert!(!flags.contains(DirtyFlags::DEPENDENCY));
        assert!(flags.intersects(MATERIAL | DirtyFlags::DEPENDENCY));
        assert_eq!(flags & !TRANSFORM, MATERIAL);
        assert!(DirtyFlags::NONE.is_empty());
        assert_eq!(DirtyFlags::ALL_OWN | DirtyFlags::DEPENDENCY, DirtyFlags::ALL);
    }

    #[test]
    fn test_dirty_cell_remove_keeps_new_bits() {
        let cell = DirtyCell::default();
        cell.insert(TRANSFORM);
        let synced = cell.load();

        // Marked again between serialise and clean.
        cell.insert(MATERIAL);
        cell.remove(synced);

        assert_eq!(cell.load(), MATERIAL);
        cell.clear();
        assert!(cell.load().is_empty());
    }
}
