//! Build + query throughput across quantizer levels.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::prelude::*;

use nearfield::distance::Metric;
use nearfield::hnsw::HnswConfig;
use nearfield::index::{AnySearcher, Index, QuantLevel};

const N: usize = 2000;
const DIM: usize = 64;

fn corpus() -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..N * DIM).map(|_| rng.random::<f32>()).collect()
}

fn bench_build(c: &mut Criterion) {
    let data = corpus();
    c.bench_function("build_2k_x_64", |b| {
        let index = Index::with_config(
            DIM,
            Metric::L2,
            HnswConfig {
                m: 16,
                ef_construction: 100,
                ..Default::default()
            },
        )
        .unwrap();
        b.iter(|| index.build(black_box(&data), N, DIM).unwrap());
    });
}

fn bench_search_levels(c: &mut Criterion) {
    let data = corpus();
    let index = Index::with_config(
        DIM,
        Metric::L2,
        HnswConfig {
            m: 16,
            ef_construction: 100,
            ..Default::default()
        },
    )
    .unwrap();
    let graph = index.build(&data, N, DIM).unwrap();

    let mut group = c.benchmark_group("search_k10");
    for (name, level) in [
        ("fp32", QuantLevel::Fp32),
        ("sq8", QuantLevel::Sq8),
        ("sq4", QuantLevel::Sq4),
    ] {
        let mut searcher =
            AnySearcher::new(graph.clone(), &data, Metric::L2, level).unwrap();
        searcher.set_ef(64);
        let mut qi = 0usize;
        group.bench_with_input(BenchmarkId::from_parameter(name), &(), |b, ()| {
            b.iter(|| {
                let q = &data[qi % N * DIM..(qi % N + 1) * DIM];
                qi += 1;
                searcher.search(black_box(q), 10).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_search_levels);
criterion_main!(benches);
