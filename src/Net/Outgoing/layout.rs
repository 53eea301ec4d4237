use std::sync::atomic::Ordering::{AcqRel, Acquire, Release};
use std::sync::atomic::{AtomicU32, AtomicU64};

use crossbeam_utils::CachePadded;

/// Byte positions and slot indices are 31-bit and wrap at 2^31.
pub const POSITION_MASK: u32 = 0x7FFF_FFFF;

/// Slot value published while a commit or a large-message write is in progress.
/// Never a valid slot index, since those are masked to 31 bits.
pub const COMMITTING: u32 = u32::MAX;

/// Largest uncommitted-size table.
pub const MAX_UNCOMMITTED_SLOTS: usize = 1 << 20;

/// A front of the ring buffer: byte position plus serialization slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub slot: u32,
    pub bytes: u32,
}

impl Position {
    pub const ZERO: Position = Position { slot: 0, bytes: 0 };

    #[inline]
    pub const fn new(slot: u32, bytes: u32) -> Self {
        Self { slot, bytes }
    }

    /// The position after a message of `size` bytes reserved at `self`.
    #[inline]
    pub const fn advance(self, size: u32) -> Self {
        Self {
            slot: self.slot.wrapping_add(1) & POSITION_MASK,
            bytes: self.bytes.wrapping_add(size) & POSITION_MASK,
        }
    }

    /// Same bytes, slot replaced by the `COMMITTING` marker.
    #[inline]
    pub const fn committing(self) -> Self {
        Self {
            slot: COMMITTING,
            bytes: self.bytes,
        }
    }

    #[inline]
    pub const fn is_committing(self) -> bool {
        self.slot == COMMITTING
    }

    #[inline]
    const fn pack(self) -> u64 {
        ((self.slot as u64) << 32) | self.bytes as u64
    }

    #[inline]
    const fn unpack(raw: u64) -> Self {
        Self {
            slot: (raw >> 32) as u32,
            bytes: raw as u32,
        }
    }
}

/// Distance from `from` to `to` on the 31-bit position circle.
#[inline]
pub const fn distance(from: u32, to: u32) -> u32 {
    to.wrapping_sub(from) & POSITION_MASK
}

/// A [`Position`] updated as one value with a single 64-bit CAS.
#[repr(transparent)]
pub struct AtomicPosition(CachePadded<AtomicU64>);

impl AtomicPosition {
    pub fn new(position: Position) -> Self {
        Self(CachePadded::new(AtomicU64::new(position.pack())))
    }

    #[inline]
    pub fn load(&self) -> Position {
        Position::unpack(self.0.load(Acquire))
    }

    #[inline]
    pub fn store(&self, position: Position) {
        self.0.store(position.pack(), Release)
    }

    #[inline]
    pub fn compare_exchange(&self, current: Position, new: Position) -> Result<Position, Position> {
        self.0
            .compare_exchange(current.pack(), new.pack(), AcqRel, Acquire)
            .map(Position::unpack)
            .map_err(Position::unpack)
    }
}

/// Sizes recorded by producers that finished writing before every earlier
/// slot was committed, indexed by slot modulo the table length. Zero means
/// "not finished".
///
/// The length is a power of two so that it divides 2^31 and slots on both
/// sides of the wrap keep distinct entries.
pub struct UncommittedSizes {
    sizes: Box<[AtomicU32]>,
    mask: usize,
}

impl UncommittedSizes {
    /// A table of at least `len` entries, rounded up to a power of two.
    pub fn new(len: usize) -> Self {
        let len = len.max(2).next_power_of_two().min(MAX_UNCOMMITTED_SLOTS);
        Self {
            sizes: (0..len).map(|_| AtomicU32::new(0)).collect(),
            mask: len - 1,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    #[inline]
    fn entry(&self, slot: u32) -> &AtomicU32 {
        &self.sizes[slot as usize & self.mask]
    }

    #[inline]
    pub fn record(&self, slot: u32, size: u32) {
        debug_assert!(size > 0);
        self.entry(slot).store(size, Release);
    }

    #[inline]
    pub fn get(&self, slot: u32) -> u32 {
        self.entry(slot).load(Acquire)
    }

    #[inline]
    pub fn clear(&self, slot: u32) {
        self.entry(slot).store(0, Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_cas_treats_both_halves_as_one_value() {
        let front = AtomicPosition::new(Position::new(3, 100));
        assert!(front
            .compare_exchange(Position::new(4, 100), Position::new(5, 120))
            .is_err());
        assert!(front
            .compare_exchange(Position::new(3, 99), Position::new(5, 120))
            .is_err());
        assert_eq!(
            front.compare_exchange(Position::new(3, 100), Position::new(3, 100).advance(20)),
            Ok(Position::new(3, 100))
        );
        assert_eq!(front.load(), Position::new(4, 120));
    }

    #[test]
    fn uncommitted_table_keeps_slots_apart_across_the_wrap() {
        let table = UncommittedSizes::new(10);
        assert_eq!(table.len(), 16);

        // Eight slots apart, on both sides of the wrap.
        let before_wrap = POSITION_MASK - 1;
        let after_wrap = 6;
        assert_eq!(distance(before_wrap, after_wrap), 8);

        table.record(before_wrap, 10);
        table.record(after_wrap, 20);
        table.clear(before_wrap);
        assert_eq!(table.get(after_wrap), 20);
    }

    #[test]
    fn positions_wrap_at_31_bits() {
        let p = Position::new(POSITION_MASK, POSITION_MASK - 3).advance(10);
        assert_eq!(p, Position::new(0, 6));
        assert_eq!(distance(POSITION_MASK - 3, 6), 10);
        assert!(!p.is_committing());
        assert!(p.committing().is_committing());
    }
}
