//! Zero-copy guards for list data borrowed from the slab's mmap region.

use parking_lot::RwLockReadGuard;

use super::store::StoreState;

/// Zero-copy view of a list's vector array.
///
/// Holds a read lock on the store's internal state for its entire
/// lifetime, so the slab cannot be grown or remapped — and no pointer
/// inside it invalidated — while the guard is alive. Callers must not
/// retain a guard across a call that can resize the region (any `create_*`,
/// `insert_*`, `resize_*`, `reserve_space` or `bulk_insert_entries`); doing
/// so would deadlock against the read lock rather than read stale memory.
pub struct ListVectorsGuard<'a> {
    pub(super) _guard: RwLockReadGuard<'a, StoreState>,
    pub(super) ptr: *const f32,
    pub(super) len: usize,
}

// SAFETY: the pointer is derived from mmap'd memory pinned for the guard's
// lifetime by the held read lock; the data is read-only.
unsafe impl Send for ListVectorsGuard<'_> {}
unsafe impl Sync for ListVectorsGuard<'_> {}

impl ListVectorsGuard<'_> {
    /// Returns the vector data (`used_entries * vector_dim` floats).
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        // SAFETY: ptr/len point at `used_entries * dim` floats inside the
        // mmap region pinned alive by `_guard`.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl AsRef<[f32]> for ListVectorsGuard<'_> {
    #[inline]
    fn as_ref(&self) -> &[f32] {
        self.as_slice()
    }
}

impl std::ops::Deref for ListVectorsGuard<'_> {
    type Target = [f32];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

/// Zero-copy view of a list's vector-id array.
pub struct ListIdsGuard<'a> {
    pub(super) _guard: RwLockReadGuard<'a, StoreState>,
    pub(super) ptr: *const i64,
    pub(super) len: usize,
}

// SAFETY: see `ListVectorsGuard`.
unsafe impl Send for ListIdsGuard<'_> {}
unsafe impl Sync for ListIdsGuard<'_> {}

impl ListIdsGuard<'_> {
    /// Returns the id data (`used_entries` ids).
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[i64] {
        // SAFETY: ptr/len point at `used_entries` ids inside the mmap
        // region pinned alive by `_guard`.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl AsRef<[i64]> for ListIdsGuard<'_> {
    #[inline]
    fn as_ref(&self) -> &[i64] {
        self.as_slice()
    }
}

impl std::ops::Deref for ListIdsGuard<'_> {
    type Target = [i64];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}
