use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::thread;

use fasttrack_shadow::{Detector, SyncOp, VectorClock};

// Benchmark 1: Each thread touches its own cells (no contention on a cell)
fn bench_private_cells(c: &mut Criterion) {
    let mut group = c.benchmark_group("private_cells");
    group.sample_size(10);

    for num_threads in [1u16, 2, 4, 8].iter() {
        group.bench_with_input(
            BenchmarkId::new("threads", num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let detector = Arc::new(Detector::new());

                    let handles: Vec<_> = (0..num_threads)
                        .map(|tid| {
                            let detector = Arc::clone(&detector);
                            thread::spawn(move || {
                                let mut clock = VectorClock::new();
                                clock.increment(tid);
                                let base = (tid as usize + 1) << 20;
                                for i in 0..1_000 {
                                    let addr = base + i * 8;
                                    black_box(detector.write(addr, tid as u32, &clock, 0));
                                    black_box(detector.read(addr, tid as u32, &clock, 0));
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        let _ = handle.join();
                    }
                });
            },
        );
    }

    group.finish();
}

// Benchmark 2: All threads hammer one lock-protected cell
fn bench_contended_cell(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_cell");
    group.sample_size(10);

    for num_threads in [2u16, 4, 8].iter() {
        group.bench_with_input(
            BenchmarkId::new("threads", num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let detector = Arc::new(Detector::new());
                    let lock = Arc::new(std::sync::Mutex::new(()));

                    let handles: Vec<_> = (0..num_threads)
                        .map(|tid| {
                            let detector = Arc::clone(&detector);
                            let lock = Arc::clone(&lock);
                            thread::spawn(move || {
                                let mut clock = VectorClock::new();
                                clock.increment(tid);
                                for _ in 0..200 {
                                    let _guard = lock.lock().unwrap();
                                    detector.sync(0x100, SyncOp::Acquire, &mut clock);
                                    black_box(detector.read(0x200, tid as u32, &clock, 0));
                                    black_box(detector.write(0x200, tid as u32, &clock, 0));
                                    detector.sync(0x100, SyncOp::Release, &mut clock);
                                    clock.increment(tid);
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        let _ = handle.join();
                    }
                });
            },
        );
    }

    group.finish();
}

// Benchmark 3: Creation storm with a table small enough to spill into the overflow map
fn bench_overflow_spill(c: &mut Criterion) {
    let mut group = c.benchmark_group("overflow_spill");
    group.sample_size(10);

    for capacity in [1usize << 8, 1 << 12, 1 << 16].iter() {
        group.bench_with_input(
            BenchmarkId::new("capacity", capacity),
            capacity,
            |b, &capacity| {
                b.iter(|| {
                    let detector = Arc::new(
                        Detector::builder()
                            .shadow_capacity(capacity)
                            .build()
                            .unwrap(),
                    );

                    let handles: Vec<_> = (0..4u16)
                        .map(|tid| {
                            let detector = Arc::clone(&detector);
                            thread::spawn(move || {
                                let clock = VectorClock::from_iter([(tid, 1)]);
                                for i in 0..2_000usize {
                                    let addr = (i * 4 + tid as usize + 1) * 8;
                                    black_box(detector.read(addr, tid as u32, &clock, 0));
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        let _ = handle.join();
                    }
                    black_box(detector.stats());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_private_cells,
    bench_contended_cell,
    bench_overflow_spill
);
criterion_main!(benches);
