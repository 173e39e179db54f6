//! The inverted-list store: a single-file, memory-mapped slab managed by
//! the [`super::allocator`] buddy-style slot allocator with coalescing.
//!
//! On disk each live list occupies `allocated_entries * (D*4 + 8)`
//! contiguous bytes: first `allocated_entries * D` floats (vectors), then
//! `allocated_entries` 64-bit ids. Only the first `used_entries` of each are
//! valid; the rest is allocated slack reserved for in-place growth.

use std::fs::{File, OpenOptions};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, StorageConfig};
use crate::error::{Error, Result};
use crate::ingest;

use super::allocator::{FreeList, Slot};
use super::guard::{ListIdsGuard, ListVectorsGuard};
use super::meta::MetaSnapshot;

const ID_BYTES: usize = std::mem::size_of::<i64>();

/// Metadata for one live inverted list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvertedList {
    /// Byte offset from the slab base.
    pub offset: u64,
    /// Capacity in entries; always a power of two `>= MIN_N_ENTRIES_PER_LIST`.
    pub allocated_entries: u64,
    /// Entries currently holding valid data, `<= allocated_entries`.
    pub used_entries: u64,
}

/// Mutable slab state, all guarded by one `RwLock`.
///
/// A single lock (rather than the teacher's per-concern locks) is
/// deliberate: queries and structural mutations are specified as mutually
/// exclusive phases, so there is nothing to be gained from finer-grained
/// locking, and a read lock held by an in-flight [`ListVectorsGuard`] or
/// [`ListIdsGuard`] is exactly the guarantee needed to keep a borrowed
/// pointer valid across the guard's lifetime.
pub(super) struct StoreState {
    pub(super) mmap: Option<MmapMut>,
    pub(super) free_slots: FreeList,
    pub(super) lists: FxHashMap<i64, InvertedList>,
    pub(super) total_size: u64,
}

/// Single-file, memory-mapped inverted-list store.
pub struct InvertedListStore {
    path: PathBuf,
    meta_path: PathBuf,
    vector_dim: usize,
    vector_bytes: usize,
    entry_bytes: usize,
    min_total_size_bytes: u64,
    min_n_entries_per_list: u64,
    max_buffer_size: usize,
    dynamic_insertion: bool,
    data_file: File,
    pub(super) state: RwLock<StoreState>,
}

/// Byte offset of `list`'s id array, given the store's per-vector byte size.
///
/// Exposed so other modules (the buffer pool) can locate a list's ids
/// without reaching into the store's private state.
#[must_use]
pub fn ids_offset_for(list: &InvertedList, vector_bytes: usize) -> u64 {
    list.offset + vector_bytes as u64 * list.allocated_entries
}

fn meta_path_for(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".meta");
    PathBuf::from(s)
}

fn vector_to_bytes(vector: &[f32]) -> &[u8] {
    // SAFETY: f32 has no invalid bit patterns and the slice is contiguous;
    // reading as bytes never requires alignment.
    unsafe {
        std::slice::from_raw_parts(vector.as_ptr().cast::<u8>(), std::mem::size_of_val(vector))
    }
}

fn ids_to_bytes(ids: &[i64]) -> &[u8] {
    // SAFETY: see `vector_to_bytes`.
    unsafe { std::slice::from_raw_parts(ids.as_ptr().cast::<u8>(), std::mem::size_of_val(ids)) }
}

impl InvertedListStore {
    /// Opens or creates an inverted-list store at `path`.
    ///
    /// If a `<path>.meta` snapshot exists from a prior [`Self::save_snapshot`]
    /// call, the store reopens with that structural state instead of
    /// starting empty.
    ///
    /// # Errors
    ///
    /// Returns an error if `vector_dim` is 0, `min_total_size_bytes` or
    /// `min_n_entries_per_list` is not a power of two, or file/mmap setup
    /// fails.
    pub fn new<P: AsRef<Path>>(
        path: P,
        vector_dim: usize,
        min_total_size_bytes: u64,
        min_n_entries_per_list: u64,
        max_buffer_size: usize,
        dynamic_insertion: bool,
    ) -> Result<Self> {
        if vector_dim == 0 {
            return Err(Error::OutOfRange("vector_dim must be non-zero".into()));
        }
        if !min_total_size_bytes.is_power_of_two() {
            return Err(Error::OutOfRange(
                "min_total_size_bytes must be a power of two".into(),
            ));
        }
        if min_n_entries_per_list == 0 || !min_n_entries_per_list.is_power_of_two() {
            return Err(Error::OutOfRange(
                "min_n_entries_per_list must be a non-zero power of two".into(),
            ));
        }

        let path = path.as_ref().to_path_buf();
        let meta_path = meta_path_for(&path);
        let vector_bytes = vector_dim * std::mem::size_of::<f32>();
        let entry_bytes = vector_bytes + ID_BYTES;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let data_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let state = if meta_path.exists() {
            let snapshot = MetaSnapshot::load(&meta_path)?;
            let mmap = if snapshot.total_size > 0 {
                data_file.set_len(snapshot.total_size)?;
                // SAFETY: data_file was just sized to snapshot.total_size.
                Some(unsafe { MmapMut::map_mut(&data_file)? })
            } else {
                None
            };
            StoreState {
                mmap,
                free_slots: snapshot.free_slots,
                lists: snapshot.id_to_list_map,
                total_size: snapshot.total_size,
            }
        } else {
            data_file.set_len(0)?;
            StoreState {
                mmap: None,
                free_slots: FreeList::new(),
                lists: FxHashMap::default(),
                total_size: 0,
            }
        };

        Ok(Self {
            path,
            meta_path,
            vector_dim,
            vector_bytes,
            entry_bytes,
            min_total_size_bytes,
            min_n_entries_per_list,
            max_buffer_size,
            dynamic_insertion,
            data_file,
            state: RwLock::new(state),
        })
    }

    /// Opens or creates a store using the index/storage sections of an
    /// [`EngineConfig`].
    ///
    /// # Errors
    ///
    /// See [`Self::new`].
    pub fn from_config(cfg: &EngineConfig) -> Result<Self> {
        let StorageConfig {
            slab_path,
            min_total_size_bytes,
            max_buffer_size,
            dynamic_insertion,
        } = &cfg.storage;
        Self::new(
            slab_path,
            cfg.index.vector_dim,
            *min_total_size_bytes,
            cfg.index.min_n_entries_per_list as u64,
            *max_buffer_size,
            *dynamic_insertion,
        )
    }

    /// Vector dimension `D`.
    #[must_use]
    pub const fn vector_dim(&self) -> usize {
        self.vector_dim
    }

    fn ids_offset(&self, list: &InvertedList) -> usize {
        ids_offset_for(list, self.vector_bytes) as usize
    }

    fn grow_until_enough_space(&self, state: &mut StoreState, mut size: u64) -> Result<()> {
        let mut new_size = if state.total_size == 0 {
            self.min_total_size_bytes
        } else {
            state.total_size
        };
        if let Some(tail) = state.free_slots.slots().last().copied() {
            if tail.offset + tail.size == state.total_size {
                size = size.saturating_sub(tail.size);
            }
        }
        while new_size.saturating_sub(state.total_size) < size {
            new_size = new_size.saturating_mul(2);
        }
        self.resize_region(state, new_size)
    }

    fn resize_region(&self, state: &mut StoreState, new_size: u64) -> Result<()> {
        if new_size == state.total_size {
            return Ok(());
        }
        if let Some(mmap) = state.mmap.as_mut() {
            mmap.flush()?;
        }
        self.data_file.set_len(new_size)?;
        let size_to_grow = new_size - state.total_size;
        state.free_slots.extend_tail(state.total_size, size_to_grow);
        state.total_size = new_size;
        // SAFETY: data_file was just resized to new_size via set_len above.
        state.mmap = Some(unsafe { MmapMut::map_mut(&self.data_file)? });
        tracing::info!(
            old_total_size = state.total_size - size_to_grow,
            new_total_size = new_size,
            "grew inverted-list slab"
        );
        Ok(())
    }

    fn alloc_slot(&self, state: &mut StoreState, size: u64) -> Result<u64> {
        if let Some(offset) = state.free_slots.alloc(size) {
            return Ok(offset);
        }
        self.grow_until_enough_space(state, size)?;
        state
            .free_slots
            .alloc(size)
            .ok_or_else(|| Error::CapacityExhausted(format!("no slot of size {size} after growth")))
    }

    fn alloc_list(&self, state: &mut StoreState, n_used: u64) -> Result<InvertedList> {
        let allocated_entries = n_used.max(self.min_n_entries_per_list).next_power_of_two();
        let size_bytes = allocated_entries * self.entry_bytes as u64;
        let offset = self.alloc_slot(state, size_bytes)?;
        Ok(InvertedList {
            offset,
            allocated_entries,
            used_entries: n_used,
        })
    }

    fn relocate_ids(&self, state: &mut StoreState, new_list: &InvertedList, old_list: &InvertedList) {
        let n = old_list.used_entries as usize;
        if n == 0 {
            return;
        }
        let old_off = self.ids_offset(old_list);
        let new_off = self.ids_offset(new_list);
        let len = n * ID_BYTES;
        let mmap = state.mmap.as_mut().expect("list exists implies slab mapped");
        mmap.copy_within(old_off..old_off + len, new_off);
    }

    fn copy_shared_data(&self, state: &mut StoreState, new_list: &InvertedList, old_list: &InvertedList) {
        let n = old_list.used_entries.min(new_list.used_entries) as usize;
        if n == 0 {
            return;
        }
        let old_vec_off = old_list.offset as usize;
        let new_vec_off = new_list.offset as usize;
        let old_ids_off = self.ids_offset(old_list);
        let new_ids_off = self.ids_offset(new_list);
        let vec_len = n * self.vector_bytes;
        let id_len = n * ID_BYTES;
        let mmap = state.mmap.as_mut().expect("list exists implies slab mapped");
        mmap.copy_within(old_vec_off..old_vec_off + vec_len, new_vec_off);
        mmap.copy_within(old_ids_off..old_ids_off + id_len, new_ids_off);
    }

    /// Creates a new list with `n_used` entries allocated (capacity rounded
    /// up to the next power of two, at least `MIN_N_ENTRIES_PER_LIST`).
    ///
    /// The entries' contents are unspecified until written by
    /// [`Self::update_entries`]; callers typically follow with a write at
    /// offset 0 (this is what [`Self::insert_entries`] does for a new
    /// list).
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if `n_used` is 0, [`Error::AlreadyExists`]
    /// if `id` is already live, or an I/O error if the slab must grow and
    /// the growth fails.
    pub fn create_list(&self, id: i64, n_used: u64) -> Result<()> {
        if n_used == 0 {
            return Err(Error::OutOfRange(format!("create_list({id}) with n=0")));
        }
        let mut state = self.state.write();
        if state.lists.contains_key(&id) {
            return Err(Error::AlreadyExists(id));
        }
        let list = self.alloc_list(&mut state, n_used)?;
        state.lists.insert(id, list);
        Ok(())
    }

    /// Resizes `id` to `new_used` entries.
    ///
    /// A no-op on capacity when `allocated/2 < new_used <= allocated`
    /// (only `used_entries` changes). Otherwise reallocates: if the new
    /// slot happens to reuse the old offset, the vectors stay in place but
    /// the ids array is relocated (its base offset depends on
    /// `allocated_entries`); otherwise the shared prefix of both arrays is
    /// copied to the new location.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if `new_used` is 0, [`Error::NotFound`]
    /// if `id` does not exist.
    pub fn resize_list(&self, id: i64, new_used: u64) -> Result<()> {
        if new_used == 0 {
            return Err(Error::OutOfRange(format!("resize_list({id}) to 0 entries")));
        }
        let mut state = self.state.write();
        let old_list = *state.lists.get(&id).ok_or(Error::NotFound(id))?;

        if new_used > old_list.allocated_entries / 2 && new_used <= old_list.allocated_entries {
            state.lists.get_mut(&id).expect("checked above").used_entries = new_used;
            return Ok(());
        }

        let old_footprint = Slot {
            offset: old_list.offset,
            size: old_list.allocated_entries * self.entry_bytes as u64,
        };
        state.free_slots.free(old_footprint);
        let new_list = self.alloc_list(&mut state, new_used)?;

        if new_list.offset == old_list.offset {
            self.relocate_ids(&mut state, &new_list, &old_list);
        } else {
            self.copy_shared_data(&mut state, &new_list, &old_list);
        }
        state.lists.insert(id, new_list);
        Ok(())
    }

    /// Overwrites `ids.len()` entries of `id` starting at entry
    /// `offset_entries`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `id` does not exist, or
    /// [`Error::OutOfRange`] if `vectors.len() != ids.len() * vector_dim`
    /// or the write would extend past `used_entries`.
    pub fn update_entries(
        &self,
        id: i64,
        vectors: &[f32],
        ids: &[i64],
        offset_entries: u64,
    ) -> Result<()> {
        let n = ids.len() as u64;
        if vectors.len() as u64 != n * self.vector_dim as u64 {
            return Err(Error::OutOfRange(format!(
                "update_entries({id}): {} vector floats does not match {n} entries of dim {}",
                vectors.len(),
                self.vector_dim
            )));
        }
        let mut state = self.state.write();
        let list = *state.lists.get(&id).ok_or(Error::NotFound(id))?;
        if offset_entries + n > list.used_entries {
            return Err(Error::OutOfRange(format!(
                "update_entries({id}): offset {offset_entries} + n {n} exceeds used_entries {}",
                list.used_entries
            )));
        }

        let vec_off = list.offset as usize + offset_entries as usize * self.vector_bytes;
        let ids_off = self.ids_offset(&list) + offset_entries as usize * ID_BYTES;
        let mmap = state.mmap.as_mut().expect("list exists implies slab mapped");

        let vbytes = vector_to_bytes(vectors);
        mmap[vec_off..vec_off + vbytes.len()].copy_from_slice(vbytes);
        let ibytes = ids_to_bytes(ids);
        mmap[ids_off..ids_off + ibytes.len()].copy_from_slice(ibytes);
        Ok(())
    }

    /// Appends `ids.len()` entries to `id`, creating the list first if it
    /// does not yet exist.
    ///
    /// # Errors
    ///
    /// See [`Self::create_list`], [`Self::resize_list`] and
    /// [`Self::update_entries`].
    pub fn insert_entries(&self, id: i64, vectors: &[f32], ids: &[i64]) -> Result<()> {
        let n = ids.len() as u64;
        if vectors.len() as u64 != n * self.vector_dim as u64 {
            return Err(Error::OutOfRange(format!(
                "insert_entries({id}): {} vector floats does not match {n} entries of dim {}",
                vectors.len(),
                self.vector_dim
            )));
        }
        let exists = self.state.read().lists.contains_key(&id);
        if !exists {
            self.create_list(id, n)?;
            return self.update_entries(id, vectors, ids, 0);
        }
        let old_used = self.get_list_length(id)?;
        self.resize_list(id, old_used + n)?;
        self.update_entries(id, vectors, ids, old_used)
    }

    /// Zero-copy view of `id`'s vector array (`used_entries * vector_dim`
    /// floats).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `id` does not exist.
    pub fn get_vectors(&self, id: i64) -> Result<ListVectorsGuard<'_>> {
        let guard = self.state.read();
        let list = *guard.lists.get(&id).ok_or(Error::NotFound(id))?;
        let len = list.used_entries as usize * self.vector_dim;
        let ptr = {
            let mmap = guard.mmap.as_ref().expect("list exists implies slab mapped");
            // SAFETY: offset/len are derived from this list's own metadata,
            // which always fits inside the currently-mapped region.
            unsafe { mmap.as_ptr().add(list.offset as usize).cast::<f32>() }
        };
        Ok(ListVectorsGuard {
            _guard: guard,
            ptr,
            len,
        })
    }

    /// Zero-copy view of `id`'s id array (`used_entries` ids).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `id` does not exist.
    pub fn get_ids(&self, id: i64) -> Result<ListIdsGuard<'_>> {
        let guard = self.state.read();
        let list = *guard.lists.get(&id).ok_or(Error::NotFound(id))?;
        let off = self.ids_offset(&list);
        let len = list.used_entries as usize;
        let ptr = {
            let mmap = guard.mmap.as_ref().expect("list exists implies slab mapped");
            // SAFETY: see `get_vectors`.
            unsafe { mmap.as_ptr().add(off).cast::<i64>() }
        };
        Ok(ListIdsGuard {
            _guard: guard,
            ptr,
            len,
        })
    }

    /// Number of valid entries in `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `id` does not exist.
    pub fn get_list_length(&self, id: i64) -> Result<u64> {
        self.state
            .read()
            .lists
            .get(&id)
            .map(|l| l.used_entries)
            .ok_or(Error::NotFound(id))
    }

    /// Number of live lists.
    #[must_use]
    pub fn list_count(&self) -> usize {
        self.state.read().lists.len()
    }

    /// A read-only snapshot of every live list's metadata, keyed by list id.
    ///
    /// This is the narrow view the buffer pool consumes instead of reaching
    /// into the store's internals directly.
    #[must_use]
    pub fn list_views(&self) -> FxHashMap<i64, InvertedList> {
        self.state.read().lists.clone()
    }

    /// Bytes per vector (`vector_dim * 4`).
    #[must_use]
    pub const fn vector_bytes(&self) -> usize {
        self.vector_bytes
    }

    /// Path to the slab file, for opening a separate read-only handle.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Grows the slab, if necessary, to hold at least `n` more entries
    /// without a subsequent allocation needing to grow it further.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if `n` is 0, or an I/O error if growth
    /// fails.
    pub fn reserve_space(&self, n: u64) -> Result<()> {
        if n == 0 {
            return Err(Error::OutOfRange("reserve_space with n=0".into()));
        }
        let size = n * self.entry_bytes as u64;
        let mut state = self.state.write();
        self.grow_until_enough_space(&mut state, size)
    }

    /// Sum of all free-slot sizes.
    #[must_use]
    pub fn get_free_space(&self) -> u64 {
        self.state.read().free_slots.total_free()
    }

    /// Size of the single largest contiguous free slot.
    #[must_use]
    pub fn get_largest_contiguous_free_space(&self) -> u64 {
        self.state.read().free_slots.largest_contiguous()
    }

    /// Total slab size in bytes (0, or a power of two `>= MIN_TOTAL_SIZE_BYTES`).
    #[must_use]
    pub fn get_total_size(&self) -> u64 {
        self.state.read().total_size
    }

    /// Fraction of the slab that is free (`free bytes / total bytes`).
    #[must_use]
    pub fn get_fragmentation_ratio(&self) -> f64 {
        let state = self.state.read();
        if state.total_size == 0 {
            return 0.0;
        }
        state.free_slots.total_free() as f64 / state.total_size as f64
    }

    /// Streams three aligned input files (vectors, vector ids, list ids)
    /// into newly created lists.
    ///
    /// Must be called on an empty store (no lists, `total_size == 0`).
    /// With the default (non-dynamic) policy, lists are pre-created at
    /// their exact final size in a first pass over the list-ids file, then
    /// filled by a second pass that streams all three files in lockstep
    /// chunks of at most the configured buffer size — no reallocation
    /// happens during the second pass. With the dynamic-insertion policy
    /// the first pass is skipped and each entry is appended via
    /// [`Self::insert_entries`], tolerating mid-stream reallocation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FormatError`] if the store is non-empty, or if the
    /// list-ids file's entry count does not match `n_entries`; propagates
    /// I/O errors from any of the three files.
    pub fn bulk_insert_entries(
        &self,
        vectors_path: &Path,
        ids_path: &Path,
        list_ids_path: &Path,
        n_entries: u64,
    ) -> Result<()> {
        {
            let state = self.state.read();
            if state.total_size != 0 || !state.lists.is_empty() {
                return Err(Error::FormatError(
                    "bulk_insert_entries can only be called on an empty store".into(),
                ));
            }
        }
        if n_entries == 0 {
            return Ok(());
        }

        let expected_list_ids_len = n_entries * 8;
        let actual_list_ids_len = std::fs::metadata(list_ids_path)?.len();
        if actual_list_ids_len != expected_list_ids_len {
            return Err(Error::FormatError(format!(
                "list-ids file is {actual_list_ids_len} bytes, expected {expected_list_ids_len} for {n_entries} entries"
            )));
        }

        let chunk_cap = (self.max_buffer_size as u64).min(n_entries) as usize;
        let mut entries_left: FxHashMap<i64, u64> = FxHashMap::default();

        if !self.dynamic_insertion {
            self.reserve_space(n_entries)?;

            let mut counts: FxHashMap<i64, u64> = FxHashMap::default();
            let mut list_ids_file = BufReader::new(File::open(list_ids_path)?);
            let mut n_read = 0u64;
            while n_read < n_entries {
                let take = chunk_cap.min((n_entries - n_read) as usize);
                let chunk = ingest::read_i64_chunk(&mut list_ids_file, take)?;
                for &list_id in &chunk {
                    *counts.entry(list_id).or_insert(0) += 1;
                }
                n_read += take as u64;
            }
            for (&list_id, &count) in &counts {
                self.create_list(list_id, count)?;
            }
            entries_left = counts;
        }

        let mut vectors_file = BufReader::new(File::open(vectors_path)?);
        let mut ids_file = BufReader::new(File::open(ids_path)?);
        let mut list_ids_file = BufReader::new(File::open(list_ids_path)?);

        let mut n_read = 0u64;
        while n_read < n_entries {
            let take = chunk_cap.min((n_entries - n_read) as usize);
            let vectors_chunk = ingest::read_f32_chunk(&mut vectors_file, take * self.vector_dim)?;
            let ids_chunk = ingest::read_i64_chunk(&mut ids_file, take)?;
            let list_ids_chunk = ingest::read_i64_chunk(&mut list_ids_file, take)?;

            for i in 0..take {
                let list_id = list_ids_chunk[i];
                let vector = &vectors_chunk[i * self.vector_dim..(i + 1) * self.vector_dim];
                let id = &ids_chunk[i..=i];

                if self.dynamic_insertion {
                    self.insert_entries(list_id, vector, id)?;
                } else {
                    let list_length = self.get_list_length(list_id)?;
                    let left = entries_left
                        .get_mut(&list_id)
                        .ok_or(Error::NotFound(list_id))?;
                    let cur_offset = list_length - *left;
                    self.update_entries(list_id, vector, id, cur_offset)?;
                    *left -= 1;
                }
            }
            n_read += take as u64;
        }

        Ok(())
    }

    /// Writes the current structural state (list metadata, free slots,
    /// total size) to `<path>.meta` via `bincode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the side file cannot be written.
    pub fn save_snapshot(&self) -> Result<()> {
        let state = self.state.read();
        let snapshot = MetaSnapshot {
            filename: self.path.to_string_lossy().into_owned(),
            vector_dim: self.vector_dim,
            vector_size: self.vector_bytes,
            total_size: state.total_size,
            id_to_list_map: state.lists.clone(),
            free_slots: state.free_slots.clone(),
        };
        drop(state);
        snapshot.save(&self.meta_path).map_err(Error::Io)
    }
}

impl Drop for InvertedListStore {
    fn drop(&mut self) {
        if let Some(mut state) = self.state.try_write() {
            if let Some(mmap) = state.mmap.as_mut() {
                if let Err(e) = mmap.flush() {
                    tracing::error!(?e, "failed to flush slab mmap on drop");
                }
            }
        }
        if let Err(e) = self.save_snapshot() {
            tracing::error!(?e, "failed to save metadata snapshot on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_store(dim: usize) -> InvertedListStore {
        let dir = tempdir().unwrap();
        let path = dir.path().join("slab.bin");
        let store = InvertedListStore::new(&path, dim, 1024, 4, 1024, false).unwrap();
        std::mem::forget(dir); // keep the tempdir alive for the store's lifetime in tests
        store
    }

    #[test]
    fn create_list_rounds_capacity_up_to_min_entries() {
        let store = new_store(2);
        store.create_list(0, 1).unwrap();
        assert_eq!(store.get_list_length(0).unwrap(), 1);
        assert_eq!(store.get_total_size(), 1024);
    }

    #[test]
    fn create_list_rejects_zero_entries() {
        let store = new_store(2);
        assert!(store.create_list(0, 0).is_err());
    }

    #[test]
    fn create_list_rejects_duplicate_id() {
        let store = new_store(2);
        store.create_list(0, 1).unwrap();
        assert!(matches!(store.create_list(0, 1), Err(Error::AlreadyExists(0))));
    }

    #[test]
    fn insert_then_get_round_trips_data() {
        let store = new_store(2);
        store
            .insert_entries(0, &[1.0, 2.0, 3.0, 4.0], &[10, 20])
            .unwrap();
        assert_eq!(store.get_list_length(0).unwrap(), 2);
        assert_eq!(store.get_vectors(0).unwrap().as_slice(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(store.get_ids(0).unwrap().as_slice(), &[10, 20]);
    }

    #[test]
    fn insert_entries_appends_to_existing_list() {
        let store = new_store(1);
        store.insert_entries(0, &[1.0], &[1]).unwrap();
        store.insert_entries(0, &[2.0], &[2]).unwrap();
        assert_eq!(store.get_list_length(0).unwrap(), 2);
        assert_eq!(store.get_vectors(0).unwrap().as_slice(), &[1.0, 2.0]);
        assert_eq!(store.get_ids(0).unwrap().as_slice(), &[1, 2]);
    }

    #[test]
    fn resize_without_reallocation_preserves_all_entries() {
        // create with 1, insert 15 more -> allocated=16, used=16, all
        // entries byte-equal in insertion order.
        let store = new_store(1);
        store.insert_entries(0, &[1.0], &[1]).unwrap();
        for i in 2..=16i64 {
            store.insert_entries(0, &[i as f32], &[i]).unwrap();
        }
        assert_eq!(store.get_list_length(0).unwrap(), 16);
        let expected: Vec<f32> = (1..=16).map(|i| i as f32).collect();
        assert_eq!(store.get_vectors(0).unwrap().as_slice(), expected.as_slice());
        let expected_ids: Vec<i64> = (1..=16).collect();
        assert_eq!(store.get_ids(0).unwrap().as_slice(), expected_ids.as_slice());
    }

    #[test]
    fn resize_list_twice_with_same_n_is_idempotent() {
        let store = new_store(1);
        store.create_list(0, 4).unwrap();
        store.resize_list(0, 3).unwrap();
        let vectors_after_first = store.get_vectors(0).unwrap().as_slice().to_vec();
        store.resize_list(0, 3).unwrap();
        assert_eq!(store.get_vectors(0).unwrap().as_slice(), vectors_after_first.as_slice());
        assert_eq!(store.get_list_length(0).unwrap(), 3);
    }

    #[test]
    fn shrinking_below_half_triggers_reallocation() {
        let store = new_store(1);
        store.create_list(0, 16).unwrap();
        store.resize_list(0, 7).unwrap(); // <= 50% of 16 -> reallocate to 8
        assert_eq!(store.get_vectors(0).unwrap().len(), 7);
    }

    #[test]
    fn get_vectors_on_unknown_list_is_not_found() {
        let store = new_store(2);
        assert!(matches!(store.get_vectors(99), Err(Error::NotFound(99))));
    }

    #[test]
    fn update_entries_rejects_write_past_used_entries() {
        let store = new_store(1);
        store.create_list(0, 2).unwrap();
        assert!(store.update_entries(0, &[1.0, 2.0, 3.0], &[1, 2, 3], 0).is_err());
    }

    #[test]
    fn fragmentation_ratio_is_zero_for_fully_used_slab() {
        let store = new_store(1);
        store.create_list(0, 16).unwrap(); // min_n_entries_per_list = 4, total = 1024
        assert!(store.get_fragmentation_ratio() > 0.0);
        assert!(store.get_fragmentation_ratio() < 1.0);
    }

    #[test]
    fn slot_coalescing_after_freeing_three_adjacent_lists() {
        // create A, B, C contiguous; free B, A, C; exactly one slot remains.
        let store = new_store(1);
        store.create_list(10, 4).unwrap();
        store.create_list(20, 4).unwrap();
        store.create_list(30, 4).unwrap();
        let total = store.get_total_size();

        // Simulate freeing by resizing each list's capacity away via
        // resize_list is not a direct "delete"; exercise free_slot/alloc_slot
        // directly through the allocator to assert the coalescing contract.
        let mut state = store.state.write();
        let b = state.lists.remove(&20).unwrap();
        state.free_slots.free(Slot {
            offset: b.offset,
            size: b.allocated_entries * store.entry_bytes as u64,
        });
        let a = state.lists.remove(&10).unwrap();
        state.free_slots.free(Slot {
            offset: a.offset,
            size: a.allocated_entries * store.entry_bytes as u64,
        });
        let c = state.lists.remove(&30).unwrap();
        state.free_slots.free(Slot {
            offset: c.offset,
            size: c.allocated_entries * store.entry_bytes as u64,
        });
        drop(state);

        assert_eq!(store.get_free_space(), total);
        assert_eq!(store.get_largest_contiguous_free_space(), total);
    }

    #[test]
    fn bulk_insert_distributes_entries_into_their_lists() {
        let dir = tempdir().unwrap();
        let vectors_path = dir.path().join("vectors.bin");
        let ids_path = dir.path().join("ids.bin");
        let list_ids_path = dir.path().join("list_ids.bin");

        let entries: &[(f32, i64, i64)] = &[
            (1.0, 10, 0),
            (2.0, 20, 1),
            (3.0, 30, 0),
            (4.0, 40, 1),
            (5.0, 50, 0),
        ];
        let mut vbuf = Vec::new();
        let mut ibuf = Vec::new();
        let mut lbuf = Vec::new();
        for &(v, id, list_id) in entries {
            vbuf.extend_from_slice(&v.to_le_bytes());
            ibuf.extend_from_slice(&id.to_le_bytes());
            lbuf.extend_from_slice(&list_id.to_le_bytes());
        }
        std::fs::write(&vectors_path, vbuf).unwrap();
        std::fs::write(&ids_path, ibuf).unwrap();
        std::fs::write(&list_ids_path, lbuf).unwrap();

        let store = new_store(1);
        store
            .bulk_insert_entries(&vectors_path, &ids_path, &list_ids_path, 5)
            .unwrap();

        assert_eq!(store.get_list_length(0).unwrap(), 3);
        assert_eq!(store.get_list_length(1).unwrap(), 2);
        assert_eq!(
            store.get_vectors(0).unwrap().as_slice(),
            &[1.0, 3.0, 5.0]
        );
        assert_eq!(store.get_ids(0).unwrap().as_slice(), &[10, 30, 50]);
        assert_eq!(store.get_vectors(1).unwrap().as_slice(), &[2.0, 4.0]);
        assert_eq!(store.get_ids(1).unwrap().as_slice(), &[20, 40]);
    }

    #[test]
    fn bulk_insert_rejects_list_ids_file_with_wrong_length() {
        let dir = tempdir().unwrap();
        let vectors_path = dir.path().join("vectors.bin");
        let ids_path = dir.path().join("ids.bin");
        let list_ids_path = dir.path().join("list_ids.bin");

        std::fs::write(&vectors_path, 1.0f32.to_le_bytes()).unwrap();
        std::fs::write(&ids_path, 10i64.to_le_bytes()).unwrap();
        // Declares 2 entries but only provides list ids for 1.
        std::fs::write(&list_ids_path, 0i64.to_le_bytes()).unwrap();

        let store = new_store(1);
        assert!(matches!(
            store.bulk_insert_entries(&vectors_path, &ids_path, &list_ids_path, 2),
            Err(Error::FormatError(_))
        ));
        assert_eq!(store.list_count(), 0);
    }

    #[test]
    fn bulk_insert_reads_multiple_chunks_when_over_buffer_size() {
        let dir = tempdir().unwrap();
        let vectors_path = dir.path().join("vectors.bin");
        let ids_path = dir.path().join("ids.bin");
        let list_ids_path = dir.path().join("list_ids.bin");

        let n: i64 = 5;
        let mut vbuf = Vec::new();
        let mut ibuf = Vec::new();
        let mut lbuf = Vec::new();
        for i in 0..n {
            vbuf.extend_from_slice(&(i as f32).to_le_bytes());
            ibuf.extend_from_slice(&i.to_le_bytes());
            lbuf.extend_from_slice(&0i64.to_le_bytes());
        }
        std::fs::write(&vectors_path, vbuf).unwrap();
        std::fs::write(&ids_path, ibuf).unwrap();
        std::fs::write(&list_ids_path, lbuf).unwrap();

        let dir2 = tempdir().unwrap();
        let path = dir2.path().join("slab.bin");
        // max_buffer_size = 2 forces three chunks for 5 entries.
        let store = InvertedListStore::new(&path, 1, 1024, 4, 2, false).unwrap();
        store
            .bulk_insert_entries(&vectors_path, &ids_path, &list_ids_path, n as u64)
            .unwrap();
        assert_eq!(store.get_list_length(0).unwrap(), n as u64);
    }

    #[test]
    fn snapshot_round_trip_preserves_queries_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("slab.bin");
        {
            let store = InvertedListStore::new(&path, 2, 1024, 4, 1024, false).unwrap();
            store.insert_entries(0, &[1.0, 2.0], &[7]).unwrap();
            store.save_snapshot().unwrap();
        }
        let reopened = InvertedListStore::new(&path, 2, 1024, 4, 1024, false).unwrap();
        assert_eq!(reopened.get_list_length(0).unwrap(), 1);
        assert_eq!(reopened.get_vectors(0).unwrap().as_slice(), &[1.0, 2.0]);
        assert_eq!(reopened.get_ids(0).unwrap().as_slice(), &[7]);
    }
}
