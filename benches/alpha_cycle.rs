//! Criterion benchmarks for one alpha cycle.
//!
//! Run with:
//!   cargo bench
//!   cargo bench --features parallel
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use hipsleep::prelude::*;

fn make_context(network: NetworkConfig, seed: u64) -> (SimulationContext, PatternTable) {
    let cfg = SimConfig::default()
        .with_network(network)
        .with_seed(seed)
        .with_cycles_per_quarter(25);
    let ctx = SimulationContext::new(cfg).unwrap();
    let spec = PairedAssociates::for_pool_size(ctx.config().network.ec_pool_units);
    let (mut train, _) = spec.generate(&mut Prng::new(seed));
    train.select(0);
    (ctx, train)
}

/// One training alpha cycle per mode on the reference network.
fn bench_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("alpha_cycle_mode");
    group.sample_size(20);

    for mode in Mode::ALL {
        group.bench_with_input(BenchmarkId::new("train", mode.name()), &mode, |b, &mode| {
            let (mut ctx, train) = make_context(NetworkConfig::default(), 42);
            b.iter(|| {
                let stats = ctx.run_trial(mode, true, &train).unwrap();
                black_box(stats.sse)
            });
        });
    }

    group.finish();
}

/// Testing alpha cycles at growing EC pool sizes.
fn bench_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("alpha_cycle_size");
    group.sample_size(20);

    for pool in [8usize, 16, 32, 49] {
        let network = NetworkConfig {
            ec_pool_units: pool,
            ..NetworkConfig::default()
        };
        group.throughput(Throughput::Elements((4 * network.ec_units()) as u64));
        group.bench_with_input(BenchmarkId::new("full_test", pool), &network, |b, network| {
            let (mut ctx, train) = make_context(network.clone(), 7);
            b.iter(|| {
                let stats = ctx.run_trial(Mode::FullTest, false, &train).unwrap();
                black_box(stats.cos_sim)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_modes, bench_sizes);
criterion_main!(benches);
