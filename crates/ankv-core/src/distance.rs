//! Squared-L2 distance kernel.
//!
//! `l2sqr(a, b) = Σ(a_i − b_i)²`. Three implementations are available; the
//! fastest one available for a given dimension is selected once, at
//! [`DistanceKernel::new`], and reused for every call in the hot query loop.

/// Which concrete implementation a [`DistanceKernel`] dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KernelKind {
    /// Plain scalar loop. Always available.
    Scalar,
    /// AVX2, 16 lanes per iteration. Only used when `dim % 16 == 0`.
    Avx2Full16,
    /// AVX2 on the `dim - dim % 16` prefix, scalar on the remainder.
    Avx2Residual,
}

/// Computes squared Euclidean distance for vectors of a fixed dimension.
///
/// The implementation is selected once by dimension (and, on non-x86_64
/// targets or when AVX2 is unavailable at runtime, falls back to scalar),
/// matching the cost model of a function chosen once and then called in a
/// tight per-entry loop rather than dispatched dynamically.
#[derive(Debug, Clone, Copy)]
pub struct DistanceKernel {
    dim: usize,
    kind: KernelKind,
}

impl DistanceKernel {
    /// Builds a kernel for vectors of dimension `dim`.
    #[must_use]
    pub fn new(dim: usize) -> Self {
        let kind = Self::select_kind(dim);
        Self { dim, kind }
    }

    #[cfg(target_arch = "x86_64")]
    fn select_kind(dim: usize) -> KernelKind {
        if !std::is_x86_feature_detected!("avx2") {
            return KernelKind::Scalar;
        }
        if dim % 16 == 0 && dim > 0 {
            KernelKind::Avx2Full16
        } else if dim > 16 {
            KernelKind::Avx2Residual
        } else {
            KernelKind::Scalar
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn select_kind(_dim: usize) -> KernelKind {
        KernelKind::Scalar
    }

    /// Returns the dimension this kernel was built for.
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    /// Computes `Σ(a_i - b_i)²` for two length-`dim` vectors.
    ///
    /// # Panics
    ///
    /// Panics if `a.len() != self.dim()` or `b.len() != self.dim()`.
    #[must_use]
    pub fn l2sqr(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), self.dim);
        debug_assert_eq!(b.len(), self.dim);

        match self.kind {
            KernelKind::Scalar => l2sqr_scalar(a, b),
            #[cfg(target_arch = "x86_64")]
            KernelKind::Avx2Full16 => unsafe { crate::simd_explicit::l2sqr_avx2_16(a, b) },
            #[cfg(target_arch = "x86_64")]
            KernelKind::Avx2Residual => unsafe { crate::simd_explicit::l2sqr_avx2_residual(a, b) },
            #[cfg(not(target_arch = "x86_64"))]
            KernelKind::Avx2Full16 | KernelKind::Avx2Residual => unreachable!(
                "AVX2 kernel kinds are only selected on x86_64"
            ),
        }
    }
}

/// Scalar squared-L2 distance. Always correct, used as the fallback and as
/// the residual tail of [`KernelKind::Avx2Residual`].
#[must_use]
pub fn l2sqr_scalar(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_matches_hand_computation() {
        let a = [1.0_f32, 0.0];
        let b = [0.9_f32, 0.1];
        let d = l2sqr_scalar(&a, &b);
        assert!((d - 0.02).abs() < 1e-6);
    }

    #[test]
    fn kernel_selects_scalar_for_small_dims() {
        let kernel = DistanceKernel::new(3);
        let a = [1.0_f32, 2.0, 3.0];
        let b = [4.0_f32, 5.0, 6.0];
        let d = kernel.l2sqr(&a, &b);
        assert!((d - 27.0).abs() < 1e-5);
    }

    #[test]
    fn kernel_dim_16_matches_scalar() {
        let a: Vec<f32> = (0..16).map(|i| i as f32).collect();
        let b: Vec<f32> = (0..16).map(|i| (i as f32) * 0.5).collect();
        let kernel = DistanceKernel::new(16);
        let expected = l2sqr_scalar(&a, &b);
        let actual = kernel.l2sqr(&a, &b);
        assert!((actual - expected).abs() < 1e-3);
    }

    #[test]
    fn kernel_residual_dim_matches_scalar() {
        let dim = 37;
        let a: Vec<f32> = (0..dim).map(|i| (i as f32) * 0.3).collect();
        let b: Vec<f32> = (0..dim).map(|i| (i as f32) * 0.1 + 2.0).collect();
        let kernel = DistanceKernel::new(dim);
        let expected = l2sqr_scalar(&a, &b);
        let actual = kernel.l2sqr(&a, &b);
        assert!((actual - expected).abs() < 1e-2);
    }

    #[test]
    fn zero_distance_for_identical_vectors() {
        let v = [1.0_f32, 2.0, 3.0, 4.0];
        let kernel = DistanceKernel::new(4);
        assert_eq!(kernel.l2sqr(&v, &v), 0.0);
    }
}
