use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::any::type_name;
use std::time::Duration;

use tilr_dev::{random_vec, seeded_rng, Bound};
use tilr_gemm::{gemm_with, GemmOptions, GemmScalar, KernelChoice, KernelKind, MatMut, MatRef, Parallelism, StorageOrder};

const DIMS: [usize; 4] = [64, 256, 512, 1024];

fn bench_kernels<T: GemmScalar + Bound>(c: &mut Criterion, parallelism: Parallelism, tag: &str) {
    let mut group = c.benchmark_group(format!("{}-{tag}", type_name::<T>()));
    let mut rng = seeded_rng(0);
    for dim in DIMS {
        let a: Vec<T> = random_vec(&mut rng, dim * dim);
        let b: Vec<T> = random_vec(&mut rng, dim * dim);
        let mut c_vec: Vec<T> = random_vec(&mut rng, dim * dim);
        group.throughput(Throughput::Elements((2 * dim * dim * dim) as u64));
        for kind in KernelKind::available() {
            let opts = GemmOptions { kernel: KernelChoice::Force(kind), parallelism, ..Default::default() };
            group.bench_with_input(BenchmarkId::new(kind.name(), dim), &dim, |bench_b, &dim| {
                bench_b.iter(|| {
                    gemm_with(
                        T::ONE,
                        MatRef::from_slice(&a, dim, dim, StorageOrder::ColMajor),
                        MatRef::from_slice(&b, dim, dim, StorageOrder::RowMajor),
                        MatMut::from_slice(&mut c_vec, dim, dim, StorageOrder::ColMajor),
                        &opts,
                    )
                })
            });
        }
    }
    group.finish();
}

fn bench_serial(c: &mut Criterion) {
    bench_kernels::<f32>(c, Parallelism::None, "serial");
    bench_kernels::<f64>(c, Parallelism::None, "serial");
}

fn bench_parallel(c: &mut Criterion) {
    bench_kernels::<f32>(c, Parallelism::Auto, "auto");
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(10).warm_up_time(Duration::from_millis(500));
    targets = bench_serial, bench_parallel
);
criterion_main!(benches);
