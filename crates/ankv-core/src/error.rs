//! Error types for the IVF storage and query core.
//!
//! This module provides a unified error type for every operation exposed by
//! the store, router, executor and buffer pool.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core operations.
///
/// Error codes follow the pattern `ANNKV-XXX` for easy debugging.
#[derive(Error, Debug)]
pub enum Error {
    /// A value was outside its valid range (ANNKV-001).
    ///
    /// Triggered by create/resize with zero entries, a zero vector
    /// dimension, or `update_entries` writing past `used_entries`.
    #[error("[ANNKV-001] value out of range: {0}")]
    OutOfRange(String),

    /// Lookup by an unknown list id (ANNKV-002).
    #[error("[ANNKV-002] list {0} not found")]
    NotFound(i64),

    /// `create_list` called on an id that already exists (ANNKV-003).
    #[error("[ANNKV-003] list {0} already exists")]
    AlreadyExists(i64),

    /// File open/read/truncate/mmap failure (ANNKV-004).
    ///
    /// A failure during region growth is fatal: the slab may be left
    /// partially truncated and the store must not be used further.
    #[error("[ANNKV-004] io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed bulk-insert input (ANNKV-005).
    ///
    /// E.g. the list-ids file length does not match the declared entry
    /// count. No lists are created when this error is raised.
    #[error("[ANNKV-005] format error: {0}")]
    FormatError(String),

    /// The buffer pool could not satisfy a fetch because every frame is
    /// pinned (ANNKV-006).
    ///
    /// Fatal: indicates the pool is undersized for the probe width times
    /// concurrency of the workload.
    #[error("[ANNKV-006] capacity exhausted: {0}")]
    CapacityExhausted(String),

    /// Configuration could not be loaded or failed validation (ANNKV-007).
    #[error("[ANNKV-007] configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl Error {
    /// Returns the stable error code (e.g. `"ANNKV-001"`).
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::OutOfRange(_) => "ANNKV-001",
            Self::NotFound(_) => "ANNKV-002",
            Self::AlreadyExists(_) => "ANNKV-003",
            Self::Io(_) => "ANNKV-004",
            Self::FormatError(_) => "ANNKV-005",
            Self::CapacityExhausted(_) => "ANNKV-006",
            Self::Config(_) => "ANNKV-007",
        }
    }

    /// Returns true if this error is recoverable without restarting the
    /// process.
    ///
    /// `CapacityExhausted` and an `Io` failure during region growth are
    /// fatal assertions per the store's growth protocol; callers reaching
    /// this layer have no way to distinguish the latter from an ordinary
    /// read failure, so only `CapacityExhausted` is unconditionally fatal.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::CapacityExhausted(_))
    }
}
