//! The sparse index that maps hash buckets to positions in the entry log.
//!
//! Every slot holds one of three states, encoded in an unsigned integer:
//! [`FREE`], [`DELETED`] or `VALID_OFFSET + entry` for a live entry. The
//! integer type is the narrowest of `u8`, `u16`, `u32` and `u64` able to hold
//! the largest entry position the log can currently address, and is picked
//! again every time the index is rebuilt.
//!
//! The store is a closed enum of concrete arrays. Hot loops are written once
//! as generic functions over [`IndexWord`] and the [`with_index_store!`] macro
//! selects the concrete array a single time per operation, so no per-slot
//! branching on the width happens while probing.

use alloc::vec::Vec;

use crate::error::AllocError;

/// Slot has never been used since the index was (re)built. Ends a probe.
pub(crate) const FREE: usize = 0;
/// Slot used to hold an entry that has since been deleted. Probes continue
/// past it.
pub(crate) const DELETED: usize = 1;
/// Added to an entry position before it is stored in a slot.
pub(crate) const VALID_OFFSET: usize = 2;

const PERTURB_SHIFT: u32 = 5;

/// One slot of the index, stored in a fixed-width unsigned integer.
pub(crate) trait IndexWord: Copy + Default + 'static {
    /// Largest value this word can hold, saturated to `usize`.
    const MAX: usize;

    fn load(self) -> usize;

    fn store(value: usize) -> Self;
}

macro_rules! impl_index_word {
    ($($word:ty),*) => {
        $(
            impl IndexWord for $word {
                const MAX: usize = if size_of::<$word>() >= size_of::<usize>() {
                    usize::MAX
                } else {
                    <$word>::MAX as usize
                };

                #[inline(always)]
                fn load(self) -> usize {
                    self as usize
                }

                #[inline(always)]
                fn store(value: usize) -> Self {
                    debug_assert!(value <= <Self as IndexWord>::MAX);
                    value as $word
                }
            }
        )*
    };
}

impl_index_word!(u8, u16, u32, u64);

/// The integer width used by the slots of an index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexWidth {
    /// One byte per slot.
    U8,
    /// Two bytes per slot.
    U16,
    /// Four bytes per slot.
    U32,
    /// Eight bytes per slot.
    U64,
}

impl IndexWidth {
    /// Returns the narrowest width able to address an entry log of
    /// `entry_capacity` slots.
    pub(crate) fn for_entries(entry_capacity: usize) -> Self {
        let largest = entry_capacity.saturating_sub(1).saturating_add(VALID_OFFSET);
        if largest <= <u8 as IndexWord>::MAX {
            IndexWidth::U8
        } else if largest <= <u16 as IndexWord>::MAX {
            IndexWidth::U16
        } else if largest <= <u32 as IndexWord>::MAX {
            IndexWidth::U32
        } else {
            IndexWidth::U64
        }
    }

    /// Number of bytes used by one slot.
    pub fn bytes(self) -> usize {
        match self {
            IndexWidth::U8 => 1,
            IndexWidth::U16 => 2,
            IndexWidth::U32 => 4,
            IndexWidth::U64 => 8,
        }
    }

    /// Returns `true` if slots of this width can address `entry_capacity`
    /// entries.
    pub(crate) fn addresses(self, entry_capacity: usize) -> bool {
        self >= Self::for_entries(entry_capacity)
    }
}

/// The index array in one of its concrete widths.
#[derive(Clone, Debug, Default)]
pub(crate) enum Indices {
    /// No index has been allocated yet; the table is empty.
    #[default]
    Unallocated,
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
}

/// Runs `$body` against the concrete slot array of `$indices`, binding it to
/// `$slots`. Evaluates `$unallocated` when no index exists.
macro_rules! with_index_store {
    ($indices:expr, |$slots:ident| $body:expr, $unallocated:expr) => {
        match $indices {
            $crate::index::Indices::U8($slots) => $body,
            $crate::index::Indices::U16($slots) => $body,
            $crate::index::Indices::U32($slots) => $body,
            $crate::index::Indices::U64($slots) => $body,
            $crate::index::Indices::Unallocated => $unallocated,
        }
    };
}

pub(crate) use with_index_store;

fn try_zeroed<W: IndexWord>(len: usize) -> Result<Vec<W>, AllocError> {
    if len.checked_mul(size_of::<W>()).is_none_or(|bytes| bytes > isize::MAX as usize) {
        return Err(AllocError::CapacityOverflow);
    }
    let mut slots = Vec::new();
    slots
        .try_reserve_exact(len)
        .map_err(|_| AllocError::AllocFailed)?;
    slots.resize(len, W::default());
    Ok(slots)
}

impl Indices {
    /// Allocates an index of `len` slots, all [`FREE`]. `len` must be a power
    /// of two.
    pub(crate) fn try_new(width: IndexWidth, len: usize) -> Result<Self, AllocError> {
        debug_assert!(len.is_power_of_two());
        Ok(match width {
            IndexWidth::U8 => Indices::U8(try_zeroed(len)?),
            IndexWidth::U16 => Indices::U16(try_zeroed(len)?),
            IndexWidth::U32 => Indices::U32(try_zeroed(len)?),
            IndexWidth::U64 => Indices::U64(try_zeroed(len)?),
        })
    }

    pub(crate) fn len(&self) -> usize {
        with_index_store!(self, |slots| slots.len(), 0)
    }

    pub(crate) fn is_allocated(&self) -> bool {
        !matches!(self, Indices::Unallocated)
    }

    pub(crate) fn width(&self) -> Option<IndexWidth> {
        match self {
            Indices::Unallocated => None,
            Indices::U8(_) => Some(IndexWidth::U8),
            Indices::U16(_) => Some(IndexWidth::U16),
            Indices::U32(_) => Some(IndexWidth::U32),
            Indices::U64(_) => Some(IndexWidth::U64),
        }
    }

    pub(crate) fn heap_bytes(&self) -> usize {
        self.len() * self.width().map_or(0, IndexWidth::bytes)
    }

    /// Marks every slot [`FREE`] without touching the allocation.
    pub(crate) fn clear(&mut self) {
        with_index_store!(self, |slots| slots.fill(Default::default()), ())
    }

    #[cfg(test)]
    pub(crate) fn get(&self, slot: usize) -> usize {
        with_index_store!(self, |slots| slots[slot].load(), FREE)
    }

    #[inline]
    pub(crate) fn set(&mut self, slot: usize, value: usize) {
        with_index_store!(self, |slots| slots[slot] = IndexWord::store(value), {
            debug_assert!(false, "write to an unallocated index");
        })
    }

    /// Points `slot` at entry position `entry`.
    #[inline]
    pub(crate) fn set_entry(&mut self, slot: usize, entry: usize) {
        self.set(slot, VALID_OFFSET + entry);
    }

    /// Marks `slot` as a tombstone.
    #[inline]
    pub(crate) fn set_deleted(&mut self, slot: usize) {
        self.set(slot, DELETED);
    }

    /// Stores `entry` in the first free slot of `hash`'s probe sequence.
    pub(crate) fn insert_clean(&mut self, hash: u64, entry: usize) {
        with_index_store!(self, |slots| insert_clean(slots, hash, entry), {
            debug_assert!(false, "insert into an unallocated index");
        })
    }

    /// Finds the slot currently pointing at `entry`.
    pub(crate) fn slot_of_entry(&self, hash: u64, entry: usize) -> Option<usize> {
        with_index_store!(self, |slots| slot_of_entry(slots, hash, entry), None)
    }
}

/// Position in the perturbed probe sequence of one hash.
///
/// A probe can be suspended between steps and resumed later. `version`
/// records the table's structural version when the probe started; callers
/// that release the table between steps compare it before resuming.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Probe {
    pub(crate) hash: u64,
    pub(crate) version: u64,
    pos: usize,
    perturb: u64,
    first_deleted: Option<usize>,
    started: bool,
}

/// Result of advancing a [`Probe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ProbeStep {
    /// The probe reached a free slot. `slot` is where the key would be
    /// stored: the first tombstone on the path, or the free slot itself.
    Absent { slot: usize },
    /// `slot` points at entry position `entry`, which may hold the key.
    Occupied { slot: usize, entry: usize },
}

impl Probe {
    pub(crate) fn new(hash: u64, version: u64) -> Self {
        Self {
            hash,
            version,
            pos: 0,
            perturb: hash,
            first_deleted: None,
            started: false,
        }
    }

    #[inline(always)]
    fn advance(&mut self, mask: usize) {
        if self.started {
            self.pos = next_slot(self.pos, self.perturb, mask);
            self.perturb >>= PERTURB_SHIFT;
        } else {
            self.pos = self.hash as usize & mask;
            self.started = true;
        }
    }

    /// Moves to the next non-tombstone slot of the sequence.
    ///
    /// The index must hold at least one free slot.
    #[inline]
    pub(crate) fn next_in<W: IndexWord>(&mut self, slots: &[W]) -> ProbeStep {
        let mask = slots.len() - 1;
        loop {
            self.advance(mask);
            match slots[self.pos].load() {
                FREE => {
                    return ProbeStep::Absent {
                        slot: self.first_deleted.unwrap_or(self.pos),
                    };
                }
                DELETED => {
                    if self.first_deleted.is_none() {
                        self.first_deleted = Some(self.pos);
                    }
                }
                raw => {
                    return ProbeStep::Occupied {
                        slot: self.pos,
                        entry: raw - VALID_OFFSET,
                    };
                }
            }
        }
    }
}

#[inline(always)]
fn next_slot(pos: usize, perturb: u64, mask: usize) -> usize {
    pos.wrapping_mul(5)
        .wrapping_add(perturb as usize)
        .wrapping_add(1)
        & mask
}

pub(crate) fn insert_clean<W: IndexWord>(slots: &mut [W], hash: u64, entry: usize) {
    let mask = slots.len() - 1;
    let mut pos = hash as usize & mask;
    let mut perturb = hash;
    while slots[pos].load() != FREE {
        pos = next_slot(pos, perturb, mask);
        perturb >>= PERTURB_SHIFT;
    }
    slots[pos] = W::store(VALID_OFFSET + entry);
}

fn slot_of_entry<W: IndexWord>(slots: &[W], hash: u64, entry: usize) -> Option<usize> {
    let target = VALID_OFFSET + entry;
    let mask = slots.len() - 1;
    let mut pos = hash as usize & mask;
    let mut perturb = hash;
    loop {
        match slots[pos].load() {
            FREE => return None,
            raw if raw == target => return Some(pos),
            _ => {}
        }
        pos = next_slot(pos, perturb, mask);
        perturb >>= PERTURB_SHIFT;
    }
}
