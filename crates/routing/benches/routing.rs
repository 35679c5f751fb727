//! Benchmarks for network construction, order planning and routing sweeps

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rivroute_core::{LandMask, Raster};
use rivroute_routing::{
    build_network, plan_routing_order, KinematicWave, NetworkParams, ReachParameters, Section,
    SolverParams,
};

/// Keypad LDD of a square basin: every cell drains toward the centre
/// column, which drains south to a pit on the bottom edge
fn create_basin_ldd(size: usize) -> Raster<u8> {
    let centre = size / 2;
    let mut ldd = Raster::filled(size, size, 2_u8);
    for row in 0..size {
        for col in 0..size {
            let code = if row == size - 1 && col == centre {
                5
            } else if col < centre {
                6
            } else if col > centre {
                4
            } else {
                2
            };
            ldd.set(row, col, code).unwrap();
        }
    }
    ldd
}

fn bench_build_network(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing/build_network");
    for size in [256, 512, 1024] {
        let ldd = create_basin_ldd(size);
        let mask = LandMask::full(size, size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| build_network(black_box(&ldd), &mask, &NetworkParams::default()).unwrap())
        });
    }
    group.finish();
}

fn bench_plan_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing/plan_order");
    for size in [256, 512, 1024] {
        let ldd = create_basin_ldd(size);
        let network =
            build_network(&ldd, &LandMask::full(size, size), &NetworkParams::default()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| plan_routing_order(black_box(&network)).unwrap())
        });
    }
    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing/sweep");
    for size in [256, 512] {
        let ldd = create_basin_ldd(size);
        let network =
            build_network(&ldd, &LandMask::full(size, size), &NetworkParams::default()).unwrap();
        let n = network.len();
        let reach = ReachParameters::new(vec![2.0; n], 0.6, vec![1000.0; n]).unwrap();
        let solver = KinematicWave::new(network, reach, None, SolverParams::default()).unwrap();
        let sideflow = vec![1e-4; n];
        let mut discharge = vec![1.0; n];

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                solver
                    .route(black_box(&mut discharge), &sideflow, Section::MainChannel)
                    .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build_network, bench_plan_order, bench_sweep);
criterion_main!(benches);
