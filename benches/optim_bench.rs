use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array1;
use rtrain_lib::optim::InverseHessianMethod;
use rtrain_lib::tensor::ops;
use rtrain_lib::utils::ExecutionContext;

fn ramp(n: usize, scale: f64) -> Array1<f64> {
    Array1::from_shape_fn(n, |i| scale * ((i % 97) as f64 - 48.0) / 48.0)
}

fn bench_l2_norm(c: &mut Criterion) {
    let mut group = c.benchmark_group("l2_norm");
    for &n in &[1_000usize, 100_000] {
        let v = ramp(n, 1.0);
        let sequential = ExecutionContext::sequential();
        let global = ExecutionContext::global();
        group.bench_with_input(BenchmarkId::new("sequential", n), &v, |b, v| {
            b.iter(|| ops::l2_norm(&sequential, black_box(v)))
        });
        group.bench_with_input(BenchmarkId::new("global", n), &v, |b, v| {
            b.iter(|| ops::l2_norm(&global, black_box(v)))
        });
    }
    group.finish();
}

fn bench_inverse_hessian_update(c: &mut Criterion) {
    let ctx = ExecutionContext::global();
    let mut group = c.benchmark_group("inverse_hessian_update");
    for &n in &[50usize, 200] {
        let s = ramp(n, 0.01);
        let y = ramp(n, 0.02);
        for method in [InverseHessianMethod::Dfp, InverseHessianMethod::Bfgs] {
            group.bench_function(BenchmarkId::new(method.name(), n), |b| {
                b.iter(|| {
                    let mut h = ops::identity(n);
                    method.update(&ctx, &mut h, black_box(&s), black_box(&y))
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_l2_norm, bench_inverse_hessian_update);
criterion_main!(benches);
