//! Hot-path benchmark: tick batch application + full strategy walk

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use garuda_core::core::types::{Direction, Tick};
use garuda_core::testing::helpers::{add_straddle_legs, points_monitor, CE_TOKEN, PE_TOKEN};

fn bench_update_prices(c: &mut Criterion) {
    // Thresholds far away so the monitor stays active for the whole run
    let monitor = points_monitor(Direction::Short, 1_000_000.0, 1_000_000.0);
    add_straddle_legs(&monitor, 150.0, 145.0);

    let ticks = [Tick::new(CE_TOKEN, 150.5), Tick::new(PE_TOKEN, 144.5)];
    c.bench_function("update_prices_two_legs", |b| {
        b.iter(|| monitor.update_prices(black_box(&ticks)))
    });

    // Batch with misses: unknown tokens must be dropped cheaply
    let mixed: Vec<Tick> = (0..16)
        .map(|i| {
            if i % 8 == 0 {
                Tick::new(CE_TOKEN, 150.0 + i as f64 * 0.05)
            } else {
                Tick::new(9_000 + i, 100.0)
            }
        })
        .collect();
    c.bench_function("update_prices_mixed_batch", |b| {
        b.iter(|| monitor.update_prices(black_box(&mixed)))
    });
}

criterion_group!(benches, bench_update_prices);
criterion_main!(benches);
