//! Benchmark for the feedback loop: channel fan-out and cycle throughput.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use cyclens::prelude::*;
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Channel Benchmarks
// =============================================================================

fn benchmark_channel_fanout(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("channel_fanout");

    for subscribers in [1, 4, 16, 64] {
        group.bench_with_input(
            BenchmarkId::new("publish", subscribers),
            &subscribers,
            |bencher, &subscribers| {
                let channel = LatestChannel::new();
                let sum = Arc::new(AtomicU64::new(0));
                let _subscriptions: Vec<_> = (0..subscribers)
                    .map(|_| {
                        let sum = sum.clone();
                        channel
                            .observable()
                            .subscribe(move |value: u64| {
                                sum.fetch_add(value, Ordering::Relaxed);
                            })
                    })
                    .collect();

                let mut value = 0;
                bencher.iter(|| {
                    value += 1;
                    channel.publish(black_box(value));
                });
                black_box(sum.load(Ordering::Relaxed));
            },
        );
    }

    group.finish();
}

// =============================================================================
// Cycle Benchmarks
// =============================================================================

struct Ticker {
    ticks: PublishSubject<u64>,
}

impl Router for Ticker {
    type State = u64;
    type Drivers = PublishSubject<u64>;

    fn seed(&self) -> u64 {
        0
    }

    fn drivers_from(&self, _seed: &u64) -> Result<Self::Drivers, DriverError> {
        Ok(self.ticks.clone())
    }

    fn effects(&self, incoming: Observable<u64>, ticks: &Self::Drivers) -> Observable<u64> {
        reduce(&ticks.observable(), &incoming, |tick, total| total.wrapping_add(tick))
    }
}

fn benchmark_cycle_throughput(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("cycle_throughput");

    group.bench_function("driver_event_to_state", |bencher| {
        let ticks = PublishSubject::new();
        let cycle = Cycle::new(Ticker {
            ticks: ticks.clone(),
        })
        .expect("drivers build");
        bencher.iter(|| ticks.on_next(black_box(1)));
        black_box(cycle.latest());
    });

    for depth in [100_u32, 1_000, 10_000] {
        group.bench_with_input(
            BenchmarkId::new("cycled_lens_to_fixed_point", depth),
            &depth,
            |bencher, &depth| {
                bencher.iter(|| {
                    let cycled = CycledLens::new(TrampolineScheduler, move |states: Observable<u32>| {
                        states
                            .lens(
                                |_| (),
                                move |_, states| vec![states.filter(move |state| *state < depth).map(|state| state + 1)],
                            )
                            .prefixed_with(0)
                    });
                    black_box(cycled.latest())
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_channel_fanout, benchmark_cycle_throughput);
criterion_main!(benches);
