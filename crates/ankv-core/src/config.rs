//! Engine configuration.
//!
//! Provides configuration file support via `ankv.toml`, environment
//! variables, and runtime overrides.
//!
//! # Priority (highest to lowest)
//!
//! 1. Runtime overrides (constructed directly)
//! 2. Environment variables (`ANNKV_*`)
//! 3. Configuration file (`ankv.toml`)
//! 4. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration file.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },

    /// IO error.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Build-time selector for the query executor's parallelization strategy
/// (PMODE in the original design).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelMode {
    /// Single-threaded, one query and one list at a time.
    #[default]
    Sequential,
    /// One worker per query, independent per-query heaps.
    PerQuery,
    /// Work items are `(query_id, list_id)` pairs; per-worker local heaps
    /// are merged into per-query heaps under a mutex.
    PerListItem,
}

/// Index-shape configuration: dimensionality and list count, fixed at
/// construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Vector dimension `D`.
    pub vector_dim: usize,
    /// Number of inverted lists `L`.
    pub n_lists: usize,
    /// Minimum allocated capacity for any list, in entries.
    pub min_n_entries_per_list: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            vector_dim: 128,
            n_lists: 16384,
            min_n_entries_per_list: 16,
        }
    }
}

/// Query-time search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default result count `K`.
    pub n_results: usize,
    /// Default probe count `P`.
    pub n_probes: usize,
    /// Parallelization strategy for the query executor.
    pub parallel_mode: ParallelMode,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_results: 10,
            n_probes: 8,
            parallel_mode: ParallelMode::Sequential,
        }
    }
}

/// Slab storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the slab file.
    pub slab_path: String,
    /// Minimum total slab size in bytes; always rounded up to a power of two.
    pub min_total_size_bytes: u64,
    /// Maximum number of entries read per chunk during bulk insert.
    pub max_buffer_size: usize,
    /// When true, `bulk_insert_entries` may reallocate mid-stream instead
    /// of pre-creating lists from a first pass over the list-ids file.
    pub dynamic_insertion: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            slab_path: "./ankv_data/slab.bin".to_string(),
            min_total_size_bytes: 1 << 20,
            max_buffer_size: 65536,
            dynamic_insertion: false,
        }
    }
}

/// Paged buffer pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    /// Whether queries are served through the buffer pool rather than
    /// directly from the mmap region.
    pub enabled: bool,
    /// Number of frames in the pool.
    pub pool_size: usize,
    /// Vectors held per frame (`F`).
    pub frame_data_num: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pool_size: 64,
            frame_data_num: 3000,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace.
    pub level: String,
    /// Log format: text or json.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Index shape.
    pub index: IndexConfig,
    /// Search defaults.
    pub search: SearchConfig,
    /// Slab storage.
    pub storage: StorageConfig,
    /// Buffer pool.
    pub buffer_pool: BufferPoolConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Loads configuration from default sources (`ankv.toml` plus
    /// `ANNKV_*` environment variables).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("ankv.toml")
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ANNKV_").split("_").lowercase(false));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Creates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index.vector_dim == 0 {
            return Err(ConfigError::InvalidValue {
                key: "index.vector_dim".to_string(),
                message: "must be non-zero".to_string(),
            });
        }

        if self.index.n_lists == 0 {
            return Err(ConfigError::InvalidValue {
                key: "index.n_lists".to_string(),
                message: "must be non-zero".to_string(),
            });
        }

        if !self.index.min_n_entries_per_list.is_power_of_two() {
            return Err(ConfigError::InvalidValue {
                key: "index.min_n_entries_per_list".to_string(),
                message: "must be a power of two".to_string(),
            });
        }

        if !self.storage.min_total_size_bytes.is_power_of_two() {
            return Err(ConfigError::InvalidValue {
                key: "storage.min_total_size_bytes".to_string(),
                message: "must be a power of two".to_string(),
            });
        }

        if self.search.n_probes == 0 || self.search.n_probes > self.index.n_lists {
            return Err(ConfigError::InvalidValue {
                key: "search.n_probes".to_string(),
                message: format!(
                    "value {} must be in [1, {}]",
                    self.search.n_probes, self.index.n_lists
                ),
            });
        }

        if self.buffer_pool.enabled && self.buffer_pool.pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "buffer_pool.pool_size".to_string(),
                message: "must be non-zero when the buffer pool is enabled".to_string(),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                message: format!(
                    "value '{}' is invalid, expected one of: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        Ok(())
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let cfg = EngineConfig::default();
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_non_power_of_two_slab_floor() {
        let mut cfg = EngineConfig::default();
        cfg.storage.min_total_size_bytes = 3;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_probe_count_above_list_count() {
        let mut cfg = EngineConfig::default();
        cfg.index.n_lists = 4;
        cfg.search.n_probes = 5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = EngineConfig::default();
        let toml_str = cfg.to_toml().unwrap();
        let parsed = EngineConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.index.vector_dim, cfg.index.vector_dim);
        assert_eq!(parsed.search.n_probes, cfg.search.n_probes);
    }

    #[test]
    fn env_overrides_file_defaults() {
        std::env::set_var("ANNKV_SEARCH_N_PROBES", "32");
        let cfg = EngineConfig::from_toml("").unwrap();
        let figment = Figment::new()
            .merge(Serialized::defaults(EngineConfig::default()))
            .merge(Env::prefixed("ANNKV_").split("_").lowercase(false));
        let merged: EngineConfig = figment.extract().unwrap();
        std::env::remove_var("ANNKV_SEARCH_N_PROBES");
        assert_eq!(merged.search.n_probes, 32);
        let _ = cfg;
    }
}
