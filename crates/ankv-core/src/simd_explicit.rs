//! Raw AVX2 squared-L2 kernels.
//!
//! These mirror the two-block-of-eight-lanes structure of the reference
//! kernel exactly (rather than delegating to a portable SIMD abstraction)
//! so the accumulation order — and therefore the exact FP rounding — stays
//! reproducible across builds.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

/// AVX2 squared-L2 distance for `dim % 16 == 0`.
///
/// Processes 16 lanes per loop iteration as two 8-wide fused
/// subtract-square-accumulate blocks, then horizontally sums the 8
/// accumulator lanes once at the end.
///
/// # Safety
///
/// Caller must ensure AVX2 is available (checked once at kernel
/// construction via `is_x86_feature_detected!`), and that `a.len() ==
/// b.len()` and is a non-zero multiple of 16.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
#[inline]
pub unsafe fn l2sqr_avx2_16(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len() % 16, 0);

    let qty16 = a.len() >> 4;
    let mut p1 = a.as_ptr();
    let mut p2 = b.as_ptr();
    // SAFETY: qty16 * 16 <= a.len(), so this stays within bounds.
    let end1 = p1.add(qty16 << 4);

    let mut sum = _mm256_set1_ps(0.0);

    while p1 < end1 {
        // SAFETY: each block reads 8 lanes; p1/p2 advance in lockstep and
        // remain within [a.as_ptr(), end1) across both blocks.
        let v1 = _mm256_loadu_ps(p1);
        p1 = p1.add(8);
        let v2 = _mm256_loadu_ps(p2);
        p2 = p2.add(8);
        let diff = _mm256_sub_ps(v1, v2);
        sum = _mm256_add_ps(sum, _mm256_mul_ps(diff, diff));

        let v1 = _mm256_loadu_ps(p1);
        p1 = p1.add(8);
        let v2 = _mm256_loadu_ps(p2);
        p2 = p2.add(8);
        let diff = _mm256_sub_ps(v1, v2);
        sum = _mm256_add_ps(sum, _mm256_mul_ps(diff, diff));
    }

    let mut tmp = [0.0f32; 8];
    _mm256_storeu_ps(tmp.as_mut_ptr(), sum);
    tmp.iter().sum()
}

/// AVX2 squared-L2 distance for `dim > 16` that is not a multiple of 16:
/// AVX2 on the `dim - dim % 16` prefix, scalar on the remainder.
///
/// # Safety
///
/// Caller must ensure AVX2 is available and `a.len() == b.len() > 16`.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
#[inline]
pub unsafe fn l2sqr_avx2_residual(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let qty16 = (a.len() >> 4) << 4;
    // SAFETY: qty16 <= a.len() and is a multiple of 16.
    let head = l2sqr_avx2_16(&a[..qty16], &b[..qty16]);
    let tail = crate::distance::l2sqr_scalar(&a[qty16..], &b[qty16..]);
    head + tail
}

#[cfg(all(test, target_arch = "x86_64"))]
mod tests {
    use super::*;
    use crate::distance::l2sqr_scalar;

    fn avx2_available() -> bool {
        std::is_x86_feature_detected!("avx2")
    }

    #[test]
    fn avx2_16_matches_scalar() {
        if !avx2_available() {
            return;
        }
        let a: Vec<f32> = (0..32).map(|i| i as f32 * 0.25).collect();
        let b: Vec<f32> = (0..32).map(|i| i as f32 * 0.1 - 3.0).collect();
        let expected = l2sqr_scalar(&a, &b);
        let actual = unsafe { l2sqr_avx2_16(&a, &b) };
        assert!((actual - expected).abs() < 1e-2, "{actual} vs {expected}");
    }

    #[test]
    fn avx2_residual_matches_scalar() {
        if !avx2_available() {
            return;
        }
        let a: Vec<f32> = (0..37).map(|i| i as f32 * 0.25).collect();
        let b: Vec<f32> = (0..37).map(|i| i as f32 * 0.1 - 3.0).collect();
        let expected = l2sqr_scalar(&a, &b);
        let actual = unsafe { l2sqr_avx2_residual(&a, &b) };
        assert!((actual - expected).abs() < 1e-2, "{actual} vs {expected}");
    }

    #[test]
    fn avx2_16_zero_for_identical_vectors() {
        if !avx2_available() {
            return;
        }
        let v: Vec<f32> = (0..16).map(|i| i as f32).collect();
        let actual = unsafe { l2sqr_avx2_16(&v, &v) };
        assert_eq!(actual, 0.0);
    }
}
