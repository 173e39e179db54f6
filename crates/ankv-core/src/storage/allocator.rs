//! Free-space allocator for the inverted-list slab.
//!
//! An ordered, coalescing free-slot list with first-fit allocation. Pure
//! in-memory bookkeeping; the slab file itself is handled by [`super::store`].

use serde::{Deserialize, Serialize};

/// A free byte range `[offset, offset + size)` in the slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Byte offset from the slab base.
    pub offset: u64,
    /// Size of the free range in bytes.
    pub size: u64,
}

/// Ordered, non-overlapping, non-adjacent free-slot list (invariants I1/I2
/// of the slab: no two slots touch, their union plus every list footprint
/// covers `[0, total_size)` exactly).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FreeList {
    slots: Vec<Slot>,
}

impl FreeList {
    /// Creates an empty free list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slots in offset order.
    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// First-fit allocation: finds the first slot of size `>= size` in
    /// offset order, removes it if the sizes match exactly, or shrinks it
    /// from the left (advances its offset, decreases its size) otherwise.
    ///
    /// Returns the offset of the allocated range, or `None` if no slot is
    /// large enough.
    pub fn alloc(&mut self, size: u64) -> Option<u64> {
        let idx = self.slots.iter().position(|s| s.size >= size)?;
        let slot = self.slots[idx];
        if slot.size == size {
            self.slots.remove(idx);
        } else {
            self.slots[idx] = Slot {
                offset: slot.offset + size,
                size: slot.size - size,
            };
        }
        Some(slot.offset)
    }

    /// Inserts `slot` preserving offset order, merging with the
    /// immediately-left and/or immediately-right neighbor when their byte
    /// ranges touch.
    ///
    /// Takes `slot` by value: the caller must not hold onto a reference
    /// into this free list while constructing the slot to be freed, since
    /// freeing a list's footprint and looking it up in the same structure
    /// it's about to be inserted into would alias the slot being mutated.
    pub fn free(&mut self, slot: Slot) {
        let idx = self.slots.partition_point(|s| s.offset < slot.offset);
        self.slots.insert(idx, slot);

        if idx + 1 < self.slots.len() {
            let cur = self.slots[idx];
            let right = self.slots[idx + 1];
            if cur.offset + cur.size == right.offset {
                self.slots[idx].size += right.size;
                self.slots.remove(idx + 1);
            }
        }
        if idx > 0 {
            let left = self.slots[idx - 1];
            let cur = self.slots[idx];
            if left.offset + left.size == cur.offset {
                self.slots[idx - 1].size += cur.size;
                self.slots.remove(idx);
            }
        }
    }

    /// Extends the slot trailing at `at` by `extra` bytes, or creates a new
    /// trailing slot `[at, at + extra)` if none is already trailing there.
    ///
    /// Called after growing the slab region to fold the newly-available
    /// bytes into the free list.
    pub fn extend_tail(&mut self, at: u64, extra: u64) {
        if extra == 0 {
            return;
        }
        if let Some(last) = self.slots.last_mut() {
            if last.offset + last.size == at {
                last.size += extra;
                return;
            }
        }
        self.slots.push(Slot { offset: at, size: extra });
    }

    /// Sum of all free-slot sizes.
    #[must_use]
    pub fn total_free(&self) -> u64 {
        self.slots.iter().map(|s| s.size).sum()
    }

    /// Size of the single largest free slot, or 0 if none.
    #[must_use]
    pub fn largest_contiguous(&self) -> u64 {
        self.slots.iter().map(|s| s.size).max().unwrap_or(0)
    }

    /// True if the free list has a slot trailing at the end of `total_size`.
    #[must_use]
    pub fn has_trailing_slot_at(&self, total_size: u64) -> bool {
        self.slots
            .last()
            .is_some_and(|s| s.offset + s.size == total_size)
    }
}
