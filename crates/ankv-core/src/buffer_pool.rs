//! Fixed-frame paged cache over the slab file: clock eviction, pinning,
//! physically contiguous per-list placement.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::storage::{ids_offset_for, InvertedList};

/// One cached page: up to `frame_data_num` vectors and ids of a single list.
struct Frame {
    vectors: Vec<f32>,
    ids: Vec<i64>,
    valid_entries: usize,
    list_id: i64,
    used: bool,
    ref_bit: bool,
    pinned: u32,
    first_frame: bool,
}

impl Frame {
    fn empty(frame_data_num: usize, vector_dim: usize) -> Self {
        Self {
            vectors: vec![0.0; frame_data_num * vector_dim],
            ids: vec![0; frame_data_num],
            valid_entries: 0,
            list_id: -1,
            used: false,
            ref_bit: false,
            pinned: 0,
            first_frame: true,
        }
    }
}

/// Clock (second-chance) eviction policy over a fixed set of frame slots.
///
/// Only frames marked `first_frame` are eviction candidates: a list is
/// evicted as a whole, so the buffer pool manager explicitly walks the
/// `k-1` trailing frames of an evicted list via [`ClockReplacer::evict_non_first_frame`]
/// right after [`ClockReplacer::evict_frame`] picks its head.
struct ClockReplacer {
    clock_pointer: usize,
}

impl ClockReplacer {
    fn new() -> Self {
        Self { clock_pointer: 0 }
    }

    fn advance(&mut self, pool_size: usize) {
        self.clock_pointer = (self.clock_pointer + 1) % pool_size;
    }

    /// Finds and evicts the next first-frame victim, returning its index.
    ///
    /// Advances the hand at most `pool_size` steps; returns
    /// [`Error::CapacityExhausted`] if every candidate frame is pinned.
    fn evict_frame(&mut self, frames: &mut [Frame]) -> Result<usize> {
        let pool_size = frames.len();
        for _ in 0..pool_size {
            let idx = self.clock_pointer;
            let frame = &mut frames[idx];
            if frame.first_frame && frame.used && frame.pinned == 0 {
                if frame.ref_bit {
                    frame.ref_bit = false;
                    self.advance(pool_size);
                    continue;
                }
                frame.used = false;
                self.advance(pool_size);
                return Ok(idx);
            }
            self.advance(pool_size);
        }
        Err(Error::CapacityExhausted(
            "buffer pool eviction found no unpinned first frame".into(),
        ))
    }

    /// Clears the non-first frame the hand currently points at and resets
    /// its `first_frame` bit so it can become a fresh list head later.
    fn evict_non_first_frame(&mut self, frames: &mut [Frame]) -> usize {
        let pool_size = frames.len();
        let idx = self.clock_pointer;
        debug_assert_eq!(frames[idx].pinned, 0);
        debug_assert!(!frames[idx].first_frame);
        debug_assert!(frames[idx].used);
        frames[idx].used = false;
        frames[idx].ref_bit = false;
        frames[idx].first_frame = true;
        self.advance(pool_size);
        idx
    }
}

struct ListMeta {
    entries: u64,
    vectors_off: u64,
    ids_off: u64,
}

struct PoolState {
    file: File,
    frames: Vec<Frame>,
    free_list: Vec<bool>,
    free_num: usize,
    resident: FxHashMap<i64, usize>,
    replacer: ClockReplacer,
}

/// A fixed-size paged cache fronting the slab file, one list at a time per
/// checkout, with clock-based eviction.
///
/// All mutable state is guarded by a single coarse lock: the contract is
/// that buffer-pool operations are linearizable, and a list checkout (fetch
/// through unpin) is the unit callers should treat as atomic.
pub struct BufferPool {
    vector_dim: usize,
    frame_data_num: usize,
    pool_size: usize,
    list_meta: FxHashMap<i64, ListMeta>,
    state: Mutex<PoolState>,
}

impl BufferPool {
    /// Builds a buffer pool over `slab_path` sized for `pool_size` frames of
    /// `frame_data_num` vectors each, using the store's list metadata
    /// snapshot (see [`crate::storage::InvertedListStore::list_views`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the slab file cannot be opened read-only.
    pub fn new(
        slab_path: &Path,
        vector_dim: usize,
        pool_size: usize,
        frame_data_num: usize,
        lists: &FxHashMap<i64, InvertedList>,
    ) -> Result<Self> {
        let vector_bytes = vector_dim * std::mem::size_of::<f32>();
        let list_meta = lists
            .iter()
            .map(|(&id, list)| {
                (
                    id,
                    ListMeta {
                        entries: list.used_entries,
                        vectors_off: list.offset,
                        ids_off: ids_offset_for(list, vector_bytes),
                    },
                )
            })
            .collect();

        let file = File::open(slab_path)?;
        let frames = (0..pool_size)
            .map(|_| Frame::empty(frame_data_num, vector_dim))
            .collect();

        Ok(Self {
            vector_dim,
            frame_data_num,
            pool_size,
            list_meta,
            state: Mutex::new(PoolState {
                file,
                frames,
                free_list: vec![true; pool_size],
                free_num: pool_size,
                resident: FxHashMap::default(),
                replacer: ClockReplacer::new(),
            }),
        })
    }

    fn frames_for(&self, list_id: i64) -> Result<u64> {
        let meta = self
            .list_meta
            .get(&list_id)
            .ok_or(Error::NotFound(list_id))?;
        Ok(meta.entries.div_ceil(self.frame_data_num as u64).max(1))
    }

    /// First-fit search for a run of `k` consecutive free frames.
    ///
    /// Never wraps around the end of the frame array: a list is always
    /// placed in physically contiguous, non-wrapping frames.
    fn look_up_free_list(state: &PoolState, k: usize, pool_size: usize) -> Option<usize> {
        if state.free_num < k {
            return None;
        }
        let mut run_start = 0usize;
        let mut run_len = 0usize;
        for i in 0..pool_size {
            if state.free_list[i] {
                if run_len == 0 {
                    run_start = i;
                }
                run_len += 1;
                if run_len == k {
                    return Some(run_start);
                }
            } else {
                run_len = 0;
            }
        }
        None
    }

    fn load(&self, state: &mut PoolState, list_id: i64, first: usize, k: usize) -> Result<()> {
        let meta_entries = self.list_meta[&list_id].entries as usize;
        let vectors_off = self.list_meta[&list_id].vectors_off;
        let ids_off = self.list_meta[&list_id].ids_off;
        let f = self.frame_data_num;

        for i in 0..k {
            let frame_idx = first + i;
            let count = if i == k - 1 {
                let rem = meta_entries % f;
                if rem == 0 {
                    f.min(meta_entries - i * f)
                } else {
                    rem
                }
            } else {
                f
            };

            let vec_byte_off = vectors_off + (i * f * self.vector_dim * 4) as u64;
            let ids_byte_off = ids_off + (i * f * 8) as u64;

            let mut vec_buf = vec![0u8; count * self.vector_dim * 4];
            state.file.seek(SeekFrom::Start(vec_byte_off))?;
            state.file.read_exact(&mut vec_buf)?;

            let mut ids_buf = vec![0u8; count * 8];
            state.file.seek(SeekFrom::Start(ids_byte_off))?;
            state.file.read_exact(&mut ids_buf)?;

            let frame = &mut state.frames[frame_idx];
            for (j, chunk) in vec_buf.chunks_exact(4).enumerate() {
                frame.vectors[j] = f32::from_le_bytes(chunk.try_into().expect("chunks_exact(4)"));
            }
            for (j, chunk) in ids_buf.chunks_exact(8).enumerate() {
                frame.ids[j] = i64::from_le_bytes(chunk.try_into().expect("chunks_exact(8)"));
            }
            frame.valid_entries = count;
            frame.list_id = list_id;
            frame.used = true;
            frame.ref_bit = false;
            frame.pinned = 0;
            frame.first_frame = i == 0;

            state.free_list[frame_idx] = false;
        }
        state.free_num -= k;
        state.resident.insert(list_id, first);
        Ok(())
    }

    /// Pins `[first, first+k)`, marks them used in the replacer, and sets
    /// each frame's reference bit (clock second-chance).
    fn access_list(&self, state: &mut PoolState, first: usize, k: usize) {
        for i in 0..k {
            let frame = &mut state.frames[first + i];
            frame.pinned = frame.pinned.saturating_add(1);
            frame.used = true;
            frame.ref_bit = true;
        }
    }

    /// Fetches `list_id`'s pages, loading and possibly evicting to make
    /// room, then pins them for the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `list_id` is unknown, or
    /// [`Error::CapacityExhausted`] if the pool cannot free enough frames
    /// because everything resident is pinned.
    pub fn fetch_list_pages(&self, list_id: i64) -> Result<(usize, usize)> {
        let k = self.frames_for(list_id)? as usize;
        let mut state = self.state.lock();

        if let Some(&first) = state.resident.get(&list_id) {
            self.access_list(&mut state, first, k);
            return Ok((first, k));
        }

        loop {
            if let Some(first) = Self::look_up_free_list(&state, k, self.pool_size) {
                self.load(&mut state, list_id, first, k)?;
                self.access_list(&mut state, first, k);
                return Ok((first, k));
            }

            let victim_first = state.replacer.evict_frame(&mut state.frames)?;
            let victim_list = state.frames[victim_first].list_id;
            let victim_k = self.frames_for(victim_list)? as usize;
            for _ in 1..victim_k {
                state.replacer.evict_non_first_frame(&mut state.frames);
            }
            for i in 0..victim_k {
                state.free_list[victim_first + i] = true;
            }
            state.free_num += victim_k;
            state.resident.remove(&victim_list);
        }
    }

    /// Unpins `list_id`'s frames; the pool tracks this per-frame via a
    /// saturating pin counter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `list_id` is not currently resident.
    pub fn unpin_list_pages(&self, list_id: i64) -> Result<()> {
        let mut state = self.state.lock();
        let first = *state.resident.get(&list_id).ok_or(Error::NotFound(list_id))?;
        let k = self.frames_for(list_id)? as usize;
        for i in 0..k {
            let frame = &mut state.frames[first + i];
            frame.pinned = frame.pinned.saturating_sub(1);
        }
        Ok(())
    }

    /// Returns the `(vectors, ids)` slices for a frame already fetched via
    /// [`Self::fetch_list_pages`].
    #[must_use]
    pub fn frame_data(&self, frame_idx: usize) -> (Vec<f32>, Vec<i64>) {
        let state = self.state.lock();
        let frame = &state.frames[frame_idx];
        (
            frame.vectors[..frame.valid_entries * self.vector_dim].to_vec(),
            frame.ids[..frame.valid_entries].to_vec(),
        )
    }
}
