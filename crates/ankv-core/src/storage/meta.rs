//! Metadata snapshot: round-trips the store's in-memory bookkeeping to a
//! `<slab>.meta` side file so a restart doesn't need to rescan the slab.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::allocator::FreeList;
use super::store::InvertedList;

/// Serializable snapshot of a store's structural state.
///
/// Deliberately excludes `base_ptr`/the open file handle — those are
/// re-derived from `filename` on load, matching the teacher's convention of
/// never serializing a raw pointer or file descriptor.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetaSnapshot {
    /// Path to the slab file, relative to wherever the store is reopened.
    pub filename: String,
    /// Vector dimension `D`.
    pub vector_dim: usize,
    /// Bytes per vector (`D * 4`).
    pub vector_size: usize,
    /// Total slab size in bytes.
    pub total_size: u64,
    /// List id -> inverted-list metadata.
    pub id_to_list_map: FxHashMap<i64, InvertedList>,
    /// Free-slot bookkeeping.
    pub free_slots: FreeList,
}

impl MetaSnapshot {
    /// Writes the snapshot to `path` via `bincode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or serialization
    /// fails.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self).map_err(io::Error::other)
    }

    /// Reads a snapshot previously written by [`MetaSnapshot::save`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or deserialization
    /// fails.
    pub fn load(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        bincode::deserialize_from(reader).map_err(io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::allocator::Slot;

    #[test]
    fn snapshot_round_trips_through_bincode() {
        let dir = tempfile::tempdir().unwrap();
        let meta_path = dir.path().join("slab.bin.meta");

        let mut id_to_list_map = FxHashMap::default();
        id_to_list_map.insert(
            7,
            InvertedList {
                offset: 0,
                allocated_entries: 16,
                used_entries: 3,
            },
        );
        let mut free_slots = FreeList::new();
        free_slots.free(Slot { offset: 512, size: 512 });

        let snapshot = MetaSnapshot {
            filename: "slab.bin".to_string(),
            vector_dim: 4,
            vector_size: 16,
            total_size: 1024,
            id_to_list_map,
            free_slots,
        };
        snapshot.save(&meta_path).unwrap();

        let loaded = MetaSnapshot::load(&meta_path).unwrap();
        assert_eq!(loaded.vector_dim, 4);
        assert_eq!(loaded.total_size, 1024);
        assert_eq!(loaded.id_to_list_map, snapshot.id_to_list_map);
        assert_eq!(loaded.free_slots.slots(), snapshot.free_slots.slots());
    }
}
