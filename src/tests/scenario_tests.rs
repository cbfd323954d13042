/// 端到端场景测试模块
/// 通过 Detector 驱动访问与同步事件，验证先于关系是否正确建立
use crate::{Detector, Epoch, OverflowFlags, Ownership, RaceKind, SyncOp, VectorClock};
use std::sync::Arc;

const X: usize = 0x1000;
const Y: usize = 0x1008;
const LOCK: usize = 0x9000;
const CHAN: usize = 0xA000;
const WG: usize = 0xB000;

fn vc(entries: &[(u16, u32)]) -> VectorClock {
    entries.iter().copied().collect()
}

/// 测试1: 读者没有看到写 -> 写-读竞争；看到了则无竞争
#[test]
fn test_write_read_scenario() {
    let detector = Detector::new();
    let a = vc(&[(1, 5)]);
    assert!(detector.write(X, 1, &a, 0).is_none());

    let b = vc(&[(1, 3), (2, 1)]);
    let race = detector.read(X, 2, &b, 0).unwrap();
    assert_eq!(race.kind, RaceKind::WriteRead);
    assert_eq!(race.prior, Epoch::new(1, 5));

    let detector = Detector::new();
    detector.write(X, 1, &a, 0);
    let b = vc(&[(1, 5), (2, 1)]);
    assert!(detector.read(X, 2, &b, 0).is_none());
}

/// 测试2: 通过锁传递的先于关系
#[test]
fn test_lock_scenario() {
    let detector = Detector::new();

    let mut a = vc(&[(0, 4)]);
    assert!(detector.write(X, 0, &a, 0).is_none());
    detector.sync(LOCK, SyncOp::Release, &mut a);

    let mut b = vc(&[(1, 1)]);
    assert!(detector.sync(LOCK, SyncOp::Acquire, &mut b));
    assert_eq!(b.get(0), 4);
    assert!(detector.read(X, 1, &b, 0).is_none());
    assert!(detector.write(X, 1, &b, 0).is_none());
}

/// 测试3: 未曾释放的锁获取不合并任何东西
#[test]
fn test_acquire_unreleased_lock() {
    let detector = Detector::new();
    let mut a = vc(&[(0, 1)]);
    assert!(!detector.sync(LOCK, SyncOp::Acquire, &mut a));
    assert_eq!(a, vc(&[(0, 1)]));
    assert_eq!(detector.stats().sync.entries(), 1);
}

/// 测试4: 读写锁，写者获取后看到所有读者的释放
#[test]
fn test_rwlock_scenario() {
    let detector = Detector::new();

    let mut readers: Vec<VectorClock> = (0..3u16).map(|tid| vc(&[(tid, 2)])).collect();
    for (tid, clock) in readers.iter_mut().enumerate() {
        assert!(detector.read(X, tid as u32, clock, 0).is_none());
        detector.sync(LOCK, SyncOp::ReleaseShared, clock);
    }

    let mut writer = vc(&[(3, 1)]);
    detector.sync(LOCK, SyncOp::Acquire, &mut writer);
    assert!(detector.write(X, 3, &writer, 0).is_none());

    // 不经过锁的写与所有读都并发
    let rogue = vc(&[(4, 1)]);
    let detector = Detector::new();
    detector.read(Y, 0, &readers[0], 0);
    let race = detector.write(Y, 4, &rogue, 0).unwrap();
    assert_eq!(race.kind, RaceKind::ReadWrite);
}

/// 测试5: 通道发送/接收建立先于关系
#[test]
fn test_channel_scenario() {
    let detector = Detector::new();

    let mut producer = vc(&[(0, 3)]);
    detector.write(X, 0, &producer, 0);
    detector.sync(CHAN, SyncOp::Send, &mut producer);

    let mut consumer = vc(&[(1, 1)]);
    assert!(detector.sync(CHAN, SyncOp::Receive, &mut consumer));
    assert!(detector.read(X, 1, &consumer, 0).is_none());

    let var = detector.sync_var(CHAN).unwrap();
    assert_eq!(var.recv_clock(), Some(vc(&[(0, 3), (1, 1)])));
}

/// 测试6: 关闭只记录第一次，观察到关闭的接收者合并关闭时钟
#[test]
fn test_close_scenario() {
    let detector = Detector::new();

    let mut closer = vc(&[(0, 6)]);
    detector.write(X, 0, &closer, 0);
    detector.sync(CHAN, SyncOp::Close, &mut closer);

    let mut late = vc(&[(2, 9)]);
    detector.sync(CHAN, SyncOp::Close, &mut late);
    assert_eq!(detector.sync_var(CHAN).unwrap().close_clock(), Some(vc(&[(0, 6)])));

    let mut reader = vc(&[(1, 1)]);
    assert!(detector.sync(CHAN, SyncOp::ReceiveClosed, &mut reader));
    assert!(detector.read(X, 1, &reader, 0).is_none());
}

/// 测试7: 倒计数屏障，等待者看到所有完成者
#[test]
fn test_barrier_scenario() {
    let detector = Detector::new();
    let mut main = vc(&[(0, 1)]);
    detector.sync(WG, SyncOp::Add(2), &mut main);

    for tid in 1..=2u16 {
        let mut worker = vc(&[(tid, 4)]);
        detector.write(X + tid as usize * 8, tid as u32, &worker, 0);
        detector.sync(WG, SyncOp::Done, &mut worker);
    }
    assert_eq!(detector.sync_var(WG).unwrap().barrier_counter(), 0);

    assert!(detector.sync(WG, SyncOp::Wait, &mut main));
    for tid in 1..=2usize {
        assert!(detector.read(X + tid * 8, 0, &main, 0).is_none());
    }
}

/// 测试8: 释放内存后重新使用，不与旧历史竞争
#[test]
fn test_free_then_reuse() {
    let detector = Detector::new();
    let a = vc(&[(0, 2)]);
    detector.write(X, 0, &a, 0);
    assert!(detector.free(X));
    assert!(!detector.free(Y));

    let b = vc(&[(1, 1)]);
    assert!(detector.write(X, 1, &b, 0).is_none());
    assert_eq!(detector.cell(X).unwrap().ownership(), Ownership::Exclusive(1));
}

/// 测试9: 竞争报告后检测继续
#[test]
fn test_detection_continues_after_race() {
    let detector = Detector::new();
    let a = vc(&[(0, 1)]);
    let b = vc(&[(1, 1)]);

    detector.write(X, 0, &a, 0);
    assert!(detector.write(X, 1, &b, 0).is_some());
    // 线程 0 看到的仍是旧状态：与线程 1 的写竞争
    let race = detector.read(X, 0, &a, 0).unwrap();
    assert_eq!(race.prior, Epoch::new(1, 1));
}

/// 测试10: 超范围线程 id 被截断并记录在共享的溢出标志里
#[test]
fn test_overflow_flags_are_shared() {
    let flags = Arc::new(OverflowFlags::new());
    let detector = Detector::builder()
        .overflow_flags(Arc::clone(&flags))
        .build()
        .unwrap();

    let clock = vc(&[(u16::MAX, 1)]);
    detector.write(X, 70_000, &clock, 0);
    assert!(flags.tid_overflowed());
    assert_eq!(detector.cell(X).unwrap().last_write(), Epoch::new(u16::MAX, 1));
    assert!(detector.overflow_flags().report().clamped());
}

/// 测试11: reset 清空影子状态，但不影响溢出标志
#[test]
fn test_detector_reset() {
    let mut detector = Detector::new();
    let mut clock = vc(&[(0, 1)]);
    detector.write(X, 100_000, &clock, 0);
    detector.sync(LOCK, SyncOp::Release, &mut clock);
    for tid in 0..6u32 {
        detector.read(Y, tid, &vc(&[(tid as u16, 1)]), 0);
    }
    detector.write(Y, 9, &vc(&[(9, 1)]), 0);
    assert_eq!(detector.stats().spare_clocks, 1);

    detector.reset();
    let stats = detector.stats();
    assert_eq!(stats.shadow.entries(), 0);
    assert_eq!(stats.sync.entries(), 0);
    assert_eq!(stats.spare_clocks, 0);
    assert!(detector.cell(X).is_none());
    assert!(detector.sync_var(LOCK).is_none());
    assert!(detector.overflow_flags().tid_overflowed());
}

/// 测试12: 两个超范围线程写同一地址 -> 写-写竞争
#[test]
fn test_clamped_threads_write_write() {
    let detector = Detector::new();

    assert!(detector.write(X, 70_000, &vc(&[(u16::MAX, 1)]), 0).is_none());
    assert_eq!(detector.cell(X).unwrap().ownership(), Ownership::Shared);

    let race = detector.write(X, 80_000, &vc(&[(1, 1)]), 0).unwrap();
    assert_eq!(race.kind, RaceKind::WriteWrite);
    assert_eq!(race.prior, Epoch::new(u16::MAX, 1));
    assert!(detector.overflow_flags().tid_overflowed());
}

/// 测试13: 无缓冲通道：发送返回时能看到接收者在接收前的写
#[test]
fn test_rendezvous_send_complete() {
    let detector = Detector::new();

    let mut producer = vc(&[(0, 1)]);
    let mut consumer = vc(&[(1, 1)]);
    detector.write(Y, 1, &consumer, 0);

    detector.sync(CHAN, SyncOp::Send, &mut producer);
    assert!(detector.sync(CHAN, SyncOp::Receive, &mut consumer));
    assert!(detector.sync(CHAN, SyncOp::SendComplete, &mut producer));
    assert_eq!(producer.get(1), 1);
    assert!(detector.write(Y, 0, &producer, 0).is_none());

    // 没有 SendComplete 时同样的写构成竞争
    let detector = Detector::new();
    let mut producer = vc(&[(0, 1)]);
    let mut consumer = vc(&[(1, 1)]);
    detector.write(Y, 1, &consumer, 0);
    detector.sync(CHAN, SyncOp::Send, &mut producer);
    detector.sync(CHAN, SyncOp::Receive, &mut consumer);
    let race = detector.write(Y, 0, &producer, 0).unwrap();
    assert_eq!(race.kind, RaceKind::WriteWrite);
}

/// 测试14: 尚无接收时 SendComplete 不合并任何内容
#[test]
fn test_send_complete_without_receive() {
    let detector = Detector::new();
    let mut producer = vc(&[(0, 2)]);
    detector.sync(CHAN, SyncOp::Send, &mut producer);
    assert!(!detector.sync(CHAN, SyncOp::SendComplete, &mut producer));
    assert_eq!(producer, vc(&[(0, 2)]));
}
