//! CPU cache prefetch utilities for the distance kernel's hot scan loop.

/// L2 cache line size in bytes (standard for modern `x86_64` CPUs).
pub const L2_CACHE_LINE_BYTES: usize = 64;

/// Calculates optimal prefetch distance (in vectors) based on vector
/// dimension.
///
/// `distance = (vector_bytes / L2_CACHE_LINE).clamp(4, 16)`: enough
/// lookahead for out-of-order execution without polluting the cache by
/// prefetching too far ahead.
#[inline]
#[must_use]
pub const fn calculate_prefetch_distance(dimension: usize) -> usize {
    let vector_bytes = dimension * std::mem::size_of::<f32>();
    let raw_distance = vector_bytes / L2_CACHE_LINE_BYTES;
    if raw_distance < 4 {
        4
    } else if raw_distance > 16 {
        16
    } else {
        raw_distance
    }
}

/// Prefetches a vector into L1 cache (T0 hint) ahead of a scan over it.
///
/// No-op on targets other than `x86_64`; prefetch instructions are hints
/// and cannot fault even on an address the CPU decides not to act on.
#[inline]
pub fn prefetch_vector(vector: &[f32]) {
    #[cfg(target_arch = "x86_64")]
    {
        // SAFETY: _mm_prefetch is a hint instruction that cannot fault.
        unsafe {
            use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
            _mm_prefetch(vector.as_ptr().cast::<i8>(), _MM_HINT_T0);
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = vector;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefetch_distance_is_clamped() {
        assert_eq!(calculate_prefetch_distance(1), 4);
        assert_eq!(calculate_prefetch_distance(128), 8);
        assert_eq!(calculate_prefetch_distance(100_000), 16);
    }

    #[test]
    fn prefetch_does_not_panic_on_empty_vector() {
        let v: Vec<f32> = Vec::new();
        prefetch_vector(&v);
    }
}
