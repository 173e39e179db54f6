//! # ankv-core
//!
//! Storage and query core of an IVF (inverted-file) approximate-nearest-
//! neighbor engine for dense floating-point vectors.
//!
//! Given a corpus partitioned into lists by an external coarse quantizer,
//! this crate persists per-list data on a single mmap'd slab, routes each
//! query to its nearest lists by centroid distance, scans those lists for
//! the top-K nearest vectors by squared-L2 distance, and optionally fronts
//! the slab with a paged buffer pool under clock eviction.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use ankv_core::{AnnStore, config::EngineConfig};
//!
//! let cfg = EngineConfig::load()?;
//! let store = AnnStore::open(cfg)?;
//! store.insert_entries(0, &vectors, &ids)?;
//! let results = store.search(&query_vector, 10, 8)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer_pool;
pub mod config;
pub mod distance;
pub mod error;
pub mod executor;
pub mod ingest;
pub mod router;
pub mod simd;
pub mod simd_explicit;
pub mod storage;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use executor::{QueryExecutor, QueryResult};
pub use router::{Query, Router};
pub use storage::InvertedListStore;

use buffer_pool::BufferPool;

/// Top-level facade bundling a store, router, executor, and optional
/// buffer pool behind one constructor.
pub struct AnnStore {
    store: InvertedListStore,
    router: Option<Router>,
    buffer_pool: Option<BufferPool>,
    config: EngineConfig,
}

impl AnnStore {
    /// Opens (or creates) a store from a fully-populated [`EngineConfig`].
    ///
    /// The router is left unset until [`Self::load_centroids`] is called;
    /// searches performed before that will fail with
    /// [`Error::OutOfRange`]-shaped router errors surfaced by the caller's
    /// own routing step.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation, the slab
    /// cannot be opened, or (when enabled) the buffer pool cannot open a
    /// read-only handle to the slab.
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = InvertedListStore::from_config(&config)?;
        let buffer_pool = if config.buffer_pool.enabled {
            let lists = store.list_views();
            Some(BufferPool::new(
                store.path(),
                config.index.vector_dim,
                config.buffer_pool.pool_size,
                config.buffer_pool.frame_data_num,
                &lists,
            )?)
        } else {
            None
        };
        Ok(Self {
            store,
            router: None,
            buffer_pool,
            config,
        })
    }

    /// Loads the centroid table from `path` and enables routing.
    ///
    /// # Errors
    ///
    /// See [`Router::from_file`].
    pub fn load_centroids(&mut self, path: &std::path::Path) -> Result<()> {
        self.router = Some(Router::from_file(
            path,
            self.config.index.n_lists,
            self.config.index.vector_dim,
        )?);
        Ok(())
    }

    /// The underlying inverted-list store.
    #[must_use]
    pub fn store(&self) -> &InvertedListStore {
        &self.store
    }

    /// The paged buffer pool, if enabled.
    #[must_use]
    pub fn buffer_pool(&self) -> Option<&BufferPool> {
        self.buffer_pool.as_ref()
    }

    /// Routes and executes a single query, using `k`/`p` in place of the
    /// configured defaults.
    ///
    /// Scans lists through the buffer pool when one is enabled, otherwise
    /// directly off the store's mmap region.
    ///
    /// # Errors
    ///
    /// Returns an error if the router has not been loaded via
    /// [`Self::load_centroids`], or if routing/execution fails.
    pub fn search(&self, query_vector: &[f32], k: usize, p: usize) -> Result<QueryResult> {
        let router = self.router.as_ref().ok_or_else(|| {
            Error::OutOfRange("search called before load_centroids".to_string())
        })?;
        let mut query = Query::new(query_vector, k, p);
        router.preassign_query(&mut query)?;
        let executor = match &self.buffer_pool {
            Some(pool) => {
                QueryExecutor::with_buffer_pool(&self.store, self.config.search.parallel_mode, pool)
            }
            None => QueryExecutor::new(&self.store, self.config.search.parallel_mode),
        };
        executor.search(&query)
    }
}
