//! Coarse router: picks the `P` nearest lists to a query by centroid
//! distance.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::distance::DistanceKernel;
use crate::error::{Error, Result};
use crate::ingest;

/// One candidate `(distance, list_id)` on the router's max-heap.
///
/// Ordered so a `BinaryHeap` pops the *farthest* candidate first: larger
/// distance is greater, and on equal distance a larger list id is greater
/// (so the smaller id is treated as closer, matching the tie-break rule).
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    distance: f32,
    list_id: i64,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.list_id.cmp(&other.list_id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A query: a borrowed vector plus the result/probe counts the router and
/// executor need.
pub struct Query<'a> {
    /// Query vector, length `vector_dim`.
    pub vector: &'a [f32],
    /// Desired result count `K`.
    pub k: usize,
    /// Probe count `P`.
    pub p: usize,
    /// List ids selected by the router, nearest-first. Empty until routed.
    pub probes: Vec<i64>,
}

impl<'a> Query<'a> {
    /// Creates a query with an empty probe list.
    #[must_use]
    pub fn new(vector: &'a [f32], k: usize, p: usize) -> Self {
        Self {
            vector,
            k,
            p,
            probes: Vec::new(),
        }
    }
}

/// Owns a private copy of the `L x D` centroid matrix and assigns queries to
/// their `P` nearest lists.
pub struct Router {
    centroids: Vec<f32>,
    n_lists: usize,
    vector_dim: usize,
    kernel: DistanceKernel,
}

impl Router {
    /// Builds a router from an already-loaded, row-major centroid matrix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if `centroids.len() != n_lists * vector_dim`.
    pub fn new(centroids: Vec<f32>, n_lists: usize, vector_dim: usize) -> Result<Self> {
        if centroids.len() != n_lists * vector_dim {
            return Err(Error::OutOfRange(format!(
                "centroid matrix has {} floats, expected {n_lists} * {vector_dim}",
                centroids.len()
            )));
        }
        Ok(Self {
            centroids,
            n_lists,
            vector_dim,
            kernel: DistanceKernel::new(vector_dim),
        })
    }

    /// Loads the centroid matrix from a centroids file (see
    /// [`crate::ingest::read_centroids`]) and builds a router over it.
    ///
    /// # Errors
    ///
    /// See [`crate::ingest::read_centroids`] and [`Self::new`].
    pub fn from_file(
        path: &std::path::Path,
        n_lists: usize,
        vector_dim: usize,
    ) -> Result<Self> {
        let centroids = ingest::read_centroids(path, n_lists, vector_dim)?;
        Self::new(centroids, n_lists, vector_dim)
    }

    /// Number of lists `L`.
    #[must_use]
    pub const fn n_lists(&self) -> usize {
        self.n_lists
    }

    fn centroid(&self, list_id: i64) -> &[f32] {
        let start = list_id as usize * self.vector_dim;
        &self.centroids[start..start + self.vector_dim]
    }

    /// Fills `query.probes` with the `P` nearest list ids, nearest first.
    ///
    /// Scans every centroid, maintaining a size-P max-heap of
    /// `(distance, list_id)` (ties broken by smaller list id being
    /// closer), then drains it back-to-front so probes come out sorted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if `query.p` is 0 or exceeds `n_lists`.
    pub fn preassign_query(&self, query: &mut Query<'_>) -> Result<()> {
        if query.p == 0 || query.p > self.n_lists {
            return Err(Error::OutOfRange(format!(
                "probe count {} must be in [1, {}]",
                query.p, self.n_lists
            )));
        }

        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(query.p);
        for list_id in 0..self.n_lists as i64 {
            let distance = self.kernel.l2sqr(query.vector, self.centroid(list_id));
            let candidate = Candidate { distance, list_id };
            if heap.len() < query.p {
                heap.push(candidate);
            } else if candidate < *heap.peek().expect("heap non-empty when full") {
                heap.pop();
                heap.push(candidate);
            }
        }

        let mut probes = vec![0i64; heap.len()];
        for slot in probes.iter_mut().rev() {
            *slot = heap.pop().expect("heap drained in order").list_id;
        }
        query.probes = probes;
        Ok(())
    }

    /// Routes every query in `queries` independently.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered from [`Self::preassign_query`].
    pub fn batch_preassign_queries(&self, queries: &mut [Query<'_>]) -> Result<()> {
        for query in queries.iter_mut() {
            self.preassign_query(query)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_list_minimal_picks_nearer_centroid() {
        let router = Router::new(vec![1.0, 0.0, 0.0, 1.0], 2, 2).unwrap();
        let q = [0.9_f32, 0.1];
        let mut query = Query::new(&q, 1, 1);
        router.preassign_query(&mut query).unwrap();
        assert_eq!(query.probes, vec![0]);
    }

    #[test]
    fn probes_are_sorted_nearest_first() {
        let router = Router::new(vec![10.0, 0.0, 5.0, 0.0, 0.0, 0.0], 3, 2).unwrap();
        let q = [0.0_f32, 0.0];
        let mut query = Query::new(&q, 1, 3);
        router.preassign_query(&mut query).unwrap();
        assert_eq!(query.probes, vec![2, 1, 0]);
    }

    #[test]
    fn ties_break_on_smaller_list_id() {
        let router = Router::new(vec![1.0, 1.0, 1.0], 3, 1).unwrap();
        let q = [0.0_f32];
        let mut query = Query::new(&q, 1, 2);
        router.preassign_query(&mut query).unwrap();
        assert_eq!(query.probes, vec![0, 1]);
    }

    #[test]
    fn rejects_zero_probes() {
        let router = Router::new(vec![0.0, 0.0], 1, 2).unwrap();
        let q = [0.0_f32, 0.0];
        let mut query = Query::new(&q, 1, 0);
        assert!(router.preassign_query(&mut query).is_err());
    }

    #[test]
    fn rejects_probes_above_list_count() {
        let router = Router::new(vec![0.0, 0.0], 1, 2).unwrap();
        let q = [0.0_f32, 0.0];
        let mut query = Query::new(&q, 1, 2);
        assert!(router.preassign_query(&mut query).is_err());
    }

    #[test]
    fn batch_routes_every_query() {
        let router = Router::new(vec![1.0, 0.0, 0.0, 1.0], 2, 2).unwrap();
        let qa = [1.0_f32, 0.0];
        let qb = [0.0_f32, 1.0];
        let mut queries = vec![Query::new(&qa, 1, 1), Query::new(&qb, 1, 1)];
        router.batch_preassign_queries(&mut queries).unwrap();
        assert_eq!(queries[0].probes, vec![0]);
        assert_eq!(queries[1].probes, vec![1]);
    }
}
