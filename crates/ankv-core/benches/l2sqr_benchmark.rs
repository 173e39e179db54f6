//! Benchmarks for the squared-L2 distance kernel: scalar vs. AVX2 dispatch.
//!
//! Run with: `cargo bench --bench l2sqr_benchmark`

use ankv_core::distance::{l2sqr_scalar, DistanceKernel};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn generate_vector(dim: usize, seed: f32) -> Vec<f32> {
    (0..dim).map(|i| (i as f32 * 0.1 + seed).sin()).collect()
}

fn bench_l2sqr(c: &mut Criterion) {
    for &dim in &[16usize, 128, 768] {
        let a = generate_vector(dim, 0.0);
        let b = generate_vector(dim, 1.0);
        let kernel = DistanceKernel::new(dim);

        c.bench_function(&format!("l2sqr_scalar_{dim}d"), |bench| {
            bench.iter(|| black_box(l2sqr_scalar(black_box(&a), black_box(&b))));
        });

        c.bench_function(&format!("l2sqr_kernel_{dim}d"), |bench| {
            bench.iter(|| black_box(kernel.l2sqr(black_box(&a), black_box(&b))));
        });
    }
}

criterion_group!(benches, bench_l2sqr);
criterion_main!(benches);
