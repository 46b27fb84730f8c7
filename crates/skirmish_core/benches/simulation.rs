//! Simulation benchmarks for skirmish_core.
//!
//! Run with: `cargo bench -p skirmish_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use skirmish_core::protocol::{encode_frame, ServerMessage};
use skirmish_test_utils::fixtures::{skirmish, tick_dt};

/// Tick and replication costs for a populated match.
pub fn simulation_benchmark(c: &mut Criterion) {
    for per_side in [8, 32] {
        c.bench_function(&format!("tick_{per_side}v{per_side}"), |b| {
            b.iter_batched(
                || skirmish(per_side),
                |mut sim| {
                    for _ in 0..20 {
                        black_box(sim.tick(tick_dt()));
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }

    c.bench_function("snapshot_encode_32v32", |b| {
        let mut sim = skirmish(32);
        for _ in 0..20 {
            sim.tick(tick_dt());
        }
        b.iter(|| {
            let snapshot = sim.collect_snapshot();
            black_box(encode_frame(&ServerMessage::Snapshot(snapshot)))
        });
    });
}

criterion_group!(benches, simulation_benchmark);
criterion_main!(benches);
