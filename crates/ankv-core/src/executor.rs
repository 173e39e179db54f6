//! Query executor: drives queries through their preassigned probes, scores
//! every scanned entry, and keeps a bounded top-K max-heap.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::buffer_pool::BufferPool;
use crate::config::ParallelMode;
use crate::distance::DistanceKernel;
use crate::error::Result;
use crate::router::Query;
use crate::simd::{calculate_prefetch_distance, prefetch_vector};
use crate::storage::InvertedListStore;

/// One scored candidate on the executor's top-K max-heap.
///
/// Ordered so a `BinaryHeap` pops the *farthest* candidate first: smaller
/// distance is closer, and on equal distance the smaller vector id is
/// closer — the same total order the router uses over `(distance, list_id)`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    distance: f32,
    vector_id: i64,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.vector_id.cmp(&other.vector_id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Adds a scored candidate to a bounded top-K max-heap: push if under
/// capacity, swap-in if closer than the current farthest kept result,
/// otherwise drop.
fn add_candidate(heap: &mut BinaryHeap<Candidate>, k: usize, candidate: Candidate) {
    if heap.len() < k {
        heap.push(candidate);
    } else if let Some(top) = heap.peek() {
        if candidate < *top {
            heap.pop();
            heap.push(candidate);
        }
    }
}

fn drain_ascending(mut heap: BinaryHeap<Candidate>) -> Vec<(f32, i64)> {
    let mut out = vec![(0.0_f32, 0i64); heap.len()];
    for slot in out.iter_mut().rev() {
        let c = heap.pop().expect("heap drained in order");
        *slot = (c.distance, c.vector_id);
    }
    out
}

/// A query's result: `(distance, vector_id)` pairs in ascending order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Ascending `(distance, vector_id)` pairs, length `min(K, entries scanned)`.
    pub hits: Vec<(f32, i64)>,
}

/// Drives queries (already routed by [`crate::router::Router`]) through the
/// store and maintains each query's top-K heap.
///
/// Scans each probed list either directly off the mmap region, or — when
/// built with [`Self::with_buffer_pool`] — through a paged [`BufferPool`]
/// checkout (fetch, scan its frames, unpin).
pub struct QueryExecutor<'a> {
    store: &'a InvertedListStore,
    kernel: DistanceKernel,
    parallel_mode: ParallelMode,
    buffer_pool: Option<&'a BufferPool>,
}

impl<'a> QueryExecutor<'a> {
    /// Builds an executor that scans lists directly off the store's mmap
    /// region, using the given parallelization mode.
    #[must_use]
    pub fn new(store: &'a InvertedListStore, parallel_mode: ParallelMode) -> Self {
        Self {
            store,
            kernel: DistanceKernel::new(store.vector_dim()),
            parallel_mode,
            buffer_pool: None,
        }
    }

    /// Builds an executor that scans lists through `buffer_pool` instead of
    /// the mmap region (§4.5's paged path).
    #[must_use]
    pub fn with_buffer_pool(
        store: &'a InvertedListStore,
        parallel_mode: ParallelMode,
        buffer_pool: &'a BufferPool,
    ) -> Self {
        Self {
            store,
            kernel: DistanceKernel::new(store.vector_dim()),
            parallel_mode,
            buffer_pool: Some(buffer_pool),
        }
    }

    fn scan_list(&self, query_vector: &[f32], list_id: i64, heap: &mut BinaryHeap<Candidate>, k: usize) -> Result<()> {
        match self.buffer_pool {
            Some(pool) => self.scan_list_paged(pool, query_vector, list_id, heap, k),
            None => self.scan_list_mmap(query_vector, list_id, heap, k),
        }
    }

    fn scan_list_mmap(&self, query_vector: &[f32], list_id: i64, heap: &mut BinaryHeap<Candidate>, k: usize) -> Result<()> {
        let vectors = self.store.get_vectors(list_id)?;
        let ids = self.store.get_ids(list_id)?;
        let dim = self.kernel.dim();
        let n = ids.as_slice().len();
        let prefetch_distance = calculate_prefetch_distance(dim);
        for (i, &vector_id) in ids.as_slice().iter().enumerate() {
            if i + prefetch_distance < n {
                let ahead = &vectors.as_slice()
                    [(i + prefetch_distance) * dim..(i + prefetch_distance + 1) * dim];
                prefetch_vector(ahead);
            }
            let v = &vectors.as_slice()[i * dim..(i + 1) * dim];
            let distance = self.kernel.l2sqr(query_vector, v);
            add_candidate(heap, k, Candidate { distance, vector_id });
        }
        Ok(())
    }

    /// Scans `list_id` through the buffer pool: fetch its frames, score
    /// every entry across them, then unpin.
    fn scan_list_paged(
        &self,
        pool: &BufferPool,
        query_vector: &[f32],
        list_id: i64,
        heap: &mut BinaryHeap<Candidate>,
        k: usize,
    ) -> Result<()> {
        let (first_frame, n_frames) = pool.fetch_list_pages(list_id)?;
        let dim = self.kernel.dim();
        let prefetch_distance = calculate_prefetch_distance(dim);

        for frame_idx in first_frame..first_frame + n_frames {
            let (vectors, ids) = pool.frame_data(frame_idx);
            let n = ids.len();
            for (i, &vector_id) in ids.iter().enumerate() {
                if i + prefetch_distance < n {
                    let ahead =
                        &vectors[(i + prefetch_distance) * dim..(i + prefetch_distance + 1) * dim];
                    prefetch_vector(ahead);
                }
                let v = &vectors[i * dim..(i + 1) * dim];
                let distance = self.kernel.l2sqr(query_vector, v);
                add_candidate(heap, k, Candidate { distance, vector_id });
            }
        }

        pool.unpin_list_pages(list_id)?;
        Ok(())
    }

    /// Scans every probe of `query` sequentially and returns its top-K
    /// result.
    ///
    /// # Errors
    ///
    /// Returns an error if any probed list id is not found in the store.
    pub fn search(&self, query: &Query<'_>) -> Result<QueryResult> {
        let mut heap = BinaryHeap::with_capacity(query.k);
        for &list_id in &query.probes {
            self.scan_list(query.vector, list_id, &mut heap, query.k)?;
        }
        Ok(QueryResult {
            hits: drain_ascending(heap),
        })
    }

    fn batch_search_per_query(&self, queries: &[Query<'_>]) -> Result<Vec<QueryResult>> {
        queries.par_iter().map(|q| self.search(q)).collect()
    }

    fn batch_search_per_list_item(&self, queries: &[Query<'_>]) -> Result<Vec<QueryResult>> {
        let heaps: Vec<Mutex<BinaryHeap<Candidate>>> = queries
            .iter()
            .map(|q| Mutex::new(BinaryHeap::with_capacity(q.k)))
            .collect();

        let work_items: Vec<(usize, i64)> = queries
            .iter()
            .enumerate()
            .flat_map(|(qi, q)| q.probes.iter().map(move |&list_id| (qi, list_id)))
            .collect();

        work_items
            .into_par_iter()
            .try_for_each(|(qi, list_id)| -> Result<()> {
                let query = &queries[qi];
                let mut local = BinaryHeap::with_capacity(query.k);
                self.scan_list(query.vector, list_id, &mut local, query.k)?;

                let mut shared = heaps[qi].lock();
                for candidate in local {
                    add_candidate(&mut shared, query.k, candidate);
                }
                Ok(())
            })?;

        Ok(heaps
            .into_iter()
            .map(|m| QueryResult {
                hits: drain_ascending(m.into_inner()),
            })
            .collect())
    }

    /// Scans a batch of queries using the configured parallelization mode.
    ///
    /// Modes differ only in scheduling; the tie-breaker on vector id makes
    /// results identical across modes regardless of scan order.
    ///
    /// # Errors
    ///
    /// Returns an error if any probed list id is not found in the store.
    pub fn batch_search(&self, queries: &[Query<'_>]) -> Result<Vec<QueryResult>> {
        match self.parallel_mode {
            ParallelMode::Sequential => queries.iter().map(|q| self.search(q)).collect(),
            ParallelMode::PerQuery => self.batch_search_per_query(queries),
            ParallelMode::PerListItem => self.batch_search_per_list_item(queries),
        }
    }
}
