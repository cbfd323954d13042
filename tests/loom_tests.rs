//! Loom-based concurrency tests
//!
//! These tests use the `loom` library to exhaustively check the thread
//! interleavings of the create-once tables and of the per-cell transitions.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`

#![cfg(feature = "loom")]

use fasttrack_shadow::{Detector, RaceKind, VectorClock};
use loom::sync::Arc;
use loom::thread;

fn small_detector() -> Arc<Detector> {
    Arc::new(
        Detector::builder()
            .shadow_capacity(2)
            .sync_capacity(2)
            .probe_bound(1)
            .overflow_shards(1)
            .pool_limit(1)
            .build()
            .unwrap(),
    )
}

/// Test: concurrent creators of one address agree on a single cell
#[test]
fn loom_get_or_create_single_winner() {
    loom::model(|| {
        let detector = small_detector();

        let other = Arc::clone(&detector);
        let handle = thread::spawn(move || other.shadow().get_or_create(0x40) as *const _ as usize);

        let mine = detector.shadow().get_or_create(0x40) as *const _ as usize;
        let theirs = handle.join().unwrap();

        assert_eq!(mine, theirs);
        assert_eq!(detector.stats().shadow.entries(), 1);
    });
}

/// Test: same as above once the address has to go to the overflow map
#[test]
fn loom_overflow_single_winner() {
    loom::model(|| {
        let detector = small_detector();
        // 探测上限为 1，三个地址里至少有一个落入溢出映射
        let first = detector.shadow().get_or_create(0x10) as *const _ as usize;

        let other = Arc::clone(&detector);
        let handle = thread::spawn(move || {
            let a = other.shadow().get_or_create(0x20) as *const _ as usize;
            let b = other.shadow().get_or_create(0x30) as *const _ as usize;
            (a, b)
        });

        let a = detector.shadow().get_or_create(0x20) as *const _ as usize;
        let b = detector.shadow().get_or_create(0x30) as *const _ as usize;
        assert_eq!(handle.join().unwrap(), (a, b));
        assert_ne!(first, a);
        assert_ne!(a, b);
        assert_eq!(detector.stats().shadow.entries(), 3);
    });
}

/// Test: two unordered writes to one cell report exactly one race
#[test]
fn loom_unordered_writes_race_once() {
    loom::model(|| {
        let detector = small_detector();

        let other = Arc::clone(&detector);
        let handle = thread::spawn(move || {
            let clock = VectorClock::from_iter([(1, 1)]);
            other.write(0x80, 1, &clock, 0)
        });

        let clock = VectorClock::from_iter([(0, 1)]);
        let mine = detector.write(0x80, 0, &clock, 0);
        let theirs = handle.join().unwrap();

        let races: Vec<_> = [mine, theirs].into_iter().flatten().collect();
        assert_eq!(races.len(), 1);
        assert_eq!(races[0].kind, RaceKind::WriteWrite);
        assert_eq!(detector.cell(0x80).unwrap().write_count(), 2);
    });
}

/// Test: an unordered read and write race exactly once in either order
#[test]
fn loom_read_write_race_once() {
    loom::model(|| {
        let detector = small_detector();

        let other = Arc::clone(&detector);
        let handle = thread::spawn(move || {
            let clock = VectorClock::from_iter([(1, 1)]);
            other.read(0x80, 1, &clock, 0)
        });

        let clock = VectorClock::from_iter([(0, 1)]);
        let write = detector.write(0x80, 0, &clock, 0);
        let read = handle.join().unwrap();

        match (write, read) {
            (Some(race), None) => assert_eq!(race.kind, RaceKind::ReadWrite),
            (None, Some(race)) => assert_eq!(race.kind, RaceKind::WriteRead),
            other => panic!("expected exactly one race, got {other:?}"),
        }
    });
}

/// Test: only the first of two concurrent closes is recorded
#[test]
fn loom_first_close_wins() {
    loom::model(|| {
        let detector = small_detector();

        let other = Arc::clone(&detector);
        let handle = thread::spawn(move || {
            let clock = VectorClock::from_iter([(1, 7)]);
            other.sync_shadow().get_or_create(0x10).set_close_clock(&clock)
        });

        let clock = VectorClock::from_iter([(0, 3)]);
        let mine = detector.sync_shadow().get_or_create(0x10).set_close_clock(&clock);
        let theirs = handle.join().unwrap();

        assert!(mine ^ theirs);
        let stored = detector.sync_var(0x10).unwrap().close_clock().unwrap();
        if mine {
            assert_eq!(stored, clock);
        } else {
            assert_eq!(stored, VectorClock::from_iter([(1, 7)]));
        }
    });
}
