//! Per-location access history (FastTrack `VarState`).
//!
//! The last-write epoch, the last-read epoch, the ownership hint, the write
//! count and the write stack hint are single atomic words that reporters can
//! read without locking. The read history sits behind a per-cell lock, and
//! every transition that changes it runs entirely under that lock so that no
//! thread observes a half-promoted or half-demoted cell. Different cells never
//! share a lock.
//!
//! Two accesses finish on atomics alone, because they cannot change the
//! outcome of any later check:
//!
//! - a read whose epoch equals the last recorded read (same thread, same
//!   epoch, no write in between);
//! - a write whose epoch equals the last write when no read has been recorded
//!   since.
//!
//! Accesses with a clamped thread id never take these shortcuts.
//!
//! 每个内存位置的访问历史（FastTrack 的 `VarState`）。
//!
//! 最后写 epoch、最后读 epoch、所有权提示、写计数与写栈提示是单字原子量，
//! 报告器无需加锁即可读取。读历史由单元级锁保护，所有改变它的状态转换
//! 都在该锁内完成，因此任何线程都不会看到提升或降级到一半的单元。
//! 不同单元之间从不共享锁。
//!
//! 同 epoch 的重复读，以及自上次写后没有读的同 epoch 重复写，只用原子操作完成。
//! 线程 id 被截断的访问从不走这两条捷径。

use crate::clock::VectorClock;
use crate::epoch::{Epoch, MAX_TID};
use crate::overflow::OverflowFlags;
use crate::pool::ClockPool;
use crate::state::INLINE_READER_SLOTS;
use crate::sync::{AtomicI32, AtomicU64, Mutex, Ordering};
use std::mem;
use std::vec::Vec;
use tracing::trace;

const OWNER_UNINIT: i32 = -1;
const OWNER_SHARED: i32 = -2;

/// `last_read` when no read was recorded since the last write. No unclamped
/// access can produce this epoch (its clock exceeds `u32::MAX`).
const NO_READ: u64 = u64::MAX;

/// Which threads have written a location.
///
/// `Shared` is terminal: once two different threads have written, the cell
/// never goes back to an exclusive owner (only `reset` clears it).
///
/// 哪些线程写过某个位置。`Shared` 是终态：一旦两个不同线程写过，
/// 单元不会再回到独占状态（只有 `reset` 会清除它）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Uninitialized,
    Exclusive(u16),
    Shared,
}

impl Ownership {
    #[inline]
    fn from_raw(raw: i32) -> Self {
        match raw {
            OWNER_UNINIT => Ownership::Uninitialized,
            OWNER_SHARED => Ownership::Shared,
            tid => Ownership::Exclusive(tid as u16),
        }
    }
}

/// Kind of conflict, named prior access first.
/// 冲突类型，先写前一次访问。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceKind {
    /// An unordered earlier write, detected on a write.
    WriteWrite,
    /// An unordered earlier write, detected on a read.
    WriteRead,
    /// An unordered earlier read, detected on a write.
    ReadWrite,
}

/// A detected race: the unordered prior access and the current one.
///
/// Stack hints are opaque values supplied by the dispatcher; the reporting
/// side resolves them.
///
/// 检测到的竞争：无序的前一次访问与当前访问。栈提示是调度器提供的不透明值，
/// 由报告端解析。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Race {
    pub kind: RaceKind,
    pub prior: Epoch,
    pub prior_stack: u64,
    pub current: Epoch,
    pub current_stack: u64,
}

/// One monitored access as seen by a cell.
#[derive(Debug, Clone, Copy)]
pub struct Access<'a> {
    pub tid: u16,
    pub epoch: Epoch,
    pub clock: &'a VectorClock,
    pub stack: u64,
    /// The raw thread id did not fit 16 bits. Distinct threads may then share
    /// `tid`, so thread identity is not trusted for this access.
    pub clamped: bool,
}

impl<'a> Access<'a> {
    /// Access by `tid` at its current time `clock[tid]`.
    #[inline]
    pub fn new(tid: u16, clock: &'a VectorClock, stack: u64) -> Self {
        Self {
            tid,
            epoch: Epoch::new(tid, clock.get(tid)),
            clock,
            stack,
            clamped: false,
        }
    }

    /// Like `new`, for a raw thread id that may not fit 16 bits.
    ///
    /// The id is clamped through `Epoch::make`, which raises the overflow
    /// flags.
    pub fn clamped(tid: u32, clock: &'a VectorClock, stack: u64, flags: &OverflowFlags) -> Self {
        let narrow = u16::try_from(tid).unwrap_or(u16::MAX);
        let epoch = Epoch::make(tid as u64, clock.get(narrow) as u64, flags);
        Self {
            tid: epoch.tid(),
            epoch,
            clock,
            stack,
            clamped: tid as u64 > MAX_TID,
        }
    }
}

/// Read history of a cell. Exactly one representation is live at a time.
#[derive(Debug, Default)]
pub(crate) enum ReadHistory {
    #[default]
    NoReaders,
    Inline {
        slots: [Epoch; INLINE_READER_SLOTS],
        len: u8,
    },
    Promoted(VectorClock),
}

#[derive(Debug, Default)]
struct CellInner {
    reads: ReadHistory,
    read_stack: u64,
}

impl CellInner {
    fn record_read(&mut self, access: &Access<'_>, pool: &ClockPool) {
        let next = match &mut self.reads {
            ReadHistory::Promoted(clock) => {
                clock.join(access.clock);
                None
            }
            ReadHistory::NoReaders => {
                let mut slots = [Epoch::ZERO; INLINE_READER_SLOTS];
                slots[0] = access.epoch;
                Some(ReadHistory::Inline { slots, len: 1 })
            }
            ReadHistory::Inline { slots, len } => {
                let used = *len as usize;
                if let Some(slot) = slots[..used].iter_mut().find(|e| e.tid() == access.tid) {
                    *slot = access.epoch;
                    None
                } else if used < INLINE_READER_SLOTS {
                    slots[used] = access.epoch;
                    *len += 1;
                    None
                } else {
                    let mut clock = pool.checkout();
                    for reader in slots.iter() {
                        let (tid, at) = reader.decode();
                        clock.set(tid, u32::try_from(at).unwrap_or(u32::MAX));
                    }
                    clock.join(access.clock);
                    trace!(tid = access.tid, "read history promoted to vector clock");
                    Some(ReadHistory::Promoted(clock))
                }
            }
        };

        if let Some(next) = next {
            self.reads = next;
        }
    }

    /// First recorded read not ordered before `access`.
    fn unordered_read(&self, access: &Access<'_>) -> Option<Epoch> {
        match &self.reads {
            ReadHistory::NoReaders => None,
            ReadHistory::Inline { slots, len } => slots[..*len as usize]
                .iter()
                .copied()
                .find(|reader| !reader.happens_before(access.clock)),
            ReadHistory::Promoted(clock) => {
                if clock.less_or_equal(access.clock) {
                    None
                } else {
                    clock
                        .first_unordered(access.clock)
                        .map(|(tid, at)| Epoch::new(tid, at))
                }
            }
        }
    }

    fn demote(&mut self, pool: &ClockPool) {
        if let ReadHistory::Promoted(clock) = mem::take(&mut self.reads) {
            pool.give_back(clock);
        }
    }
}

/// Shadow state of one monitored memory location.
///
/// Created zero-valued by the shadow store on first access; `reset` returns
/// it to that state when the underlying memory is reused.
///
/// 一个被监控内存位置的影子状态。由影子存储在首次访问时以零值创建；
/// 底层内存被复用时，`reset` 将其恢复为该状态。
#[derive(Debug)]
pub struct VarState {
    last_write: AtomicU64,
    last_read: AtomicU64,
    owner: AtomicI32,
    write_count: AtomicU64,
    write_stack: AtomicU64,
    inner: Mutex<CellInner>,
}

impl Default for VarState {
    fn default() -> Self {
        Self::new()
    }
}

impl VarState {
    pub fn new() -> Self {
        Self {
            last_write: AtomicU64::new(Epoch::ZERO.as_raw()),
            last_read: AtomicU64::new(NO_READ),
            owner: AtomicI32::new(OWNER_UNINIT),
            write_count: AtomicU64::new(0),
            write_stack: AtomicU64::new(0),
            inner: Mutex::new(CellInner::default()),
        }
    }

    /// Epoch of the last write, read without taking the cell lock.
    #[inline]
    pub fn last_write(&self) -> Epoch {
        Epoch::from_raw(self.last_write.load(Ordering::Acquire))
    }

    #[inline]
    pub fn ownership(&self) -> Ownership {
        Ownership::from_raw(self.owner.load(Ordering::Acquire))
    }

    /// Process a read.
    ///
    /// Reports a `WriteRead` race when the last write is not ordered before
    /// the reader, then records the reader. Read-read pairs never race.
    /// Only the promotion of the read history (on the fifth distinct
    /// concurrent reader) allocates, and it draws from `pool`.
    ///
    /// A repeated read at the last recorded read epoch returns at once: the
    /// earlier read already ran the same check, and any write since then
    /// either cleared `last_read` or is still in progress and will see that
    /// read.
    ///
    /// 处理一次读。若最后一次写不先于读者发生，报告 `WriteRead` 竞争，然后记录读者。
    /// 读-读永不构成竞争。只有读历史的提升（第五个不同的并发读者）会分配，且从 `pool` 取。
    /// 与最后记录的读 epoch 相同的重复读直接返回。
    pub fn read(&self, access: &Access<'_>, pool: &ClockPool) -> Option<Race> {
        if !access.clamped && self.last_read.load(Ordering::Acquire) == access.epoch.as_raw() {
            return None;
        }

        let mut inner = self.inner.lock();

        let last_write = self.last_write();
        let repeat = !access.clamped && last_write.same(access.epoch);
        let race = if repeat || last_write.happens_before(access.clock) {
            None
        } else {
            Some(Race {
                kind: RaceKind::WriteRead,
                prior: last_write,
                prior_stack: self.write_stack.load(Ordering::Relaxed),
                current: access.epoch,
                current_stack: access.stack,
            })
        };

        inner.record_read(access, pool);
        inner.read_stack = access.stack;
        let seen = if access.clamped { NO_READ } else { access.epoch.as_raw() };
        self.last_read.store(seen, Ordering::Release);
        race
    }

    /// Process a write.
    ///
    /// Reports `WriteWrite` when the last write is unordered (skipped while
    /// the writer is the exclusive owner, since one thread's writes are
    /// ordered), otherwise `ReadWrite` when any recorded read is unordered.
    /// Then the write is recorded, the read history is cleared (a promoted
    /// clock goes back to `pool`) and ownership is updated.
    ///
    /// A clamped thread id may stand for several threads, so such a write
    /// never takes the owner shortcut and turns the cell `Shared`.
    ///
    /// 处理一次写。最后一次写无序时报告 `WriteWrite`（写者为独占所有者时跳过，
    /// 因为同一线程的写天然有序），否则若任一已记录的读无序则报告 `ReadWrite`。
    /// 之后记录本次写，清空读历史（提升的时钟归还到 `pool`），并更新所有权。
    /// 线程 id 被截断的写可能代表多个线程，因此从不跳过检查，并将单元置为 `Shared`。
    pub fn write(&self, access: &Access<'_>, pool: &ClockPool) -> Option<Race> {
        if !access.clamped
            && self.last_write.load(Ordering::Acquire) == access.epoch.as_raw()
            && self.last_read.load(Ordering::Acquire) == NO_READ
            && self.ownership() != Ownership::Uninitialized
        {
            self.write_stack.store(access.stack, Ordering::Relaxed);
            self.write_count.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let mut inner = self.inner.lock();

        let owner = self.ownership();
        let last_write = self.last_write();

        let owned = !access.clamped && owner == Ownership::Exclusive(access.tid);
        let repeat = !access.clamped && last_write.same(access.epoch);
        let write_race = !owned && !repeat && !last_write.happens_before(access.clock);

        let race = if write_race {
            Some(Race {
                kind: RaceKind::WriteWrite,
                prior: last_write,
                prior_stack: self.write_stack.load(Ordering::Relaxed),
                current: access.epoch,
                current_stack: access.stack,
            })
        } else {
            inner.unordered_read(access).map(|reader| Race {
                kind: RaceKind::ReadWrite,
                prior: reader,
                prior_stack: inner.read_stack,
                current: access.epoch,
                current_stack: access.stack,
            })
        };

        self.last_write.store(access.epoch.as_raw(), Ordering::Release);
        inner.demote(pool);
        self.last_read.store(NO_READ, Ordering::Release);
        self.write_stack.store(access.stack, Ordering::Relaxed);
        self.write_count.fetch_add(1, Ordering::Relaxed);

        match owner {
            _ if access.clamped => self.owner.store(OWNER_SHARED, Ordering::Release),
            Ownership::Uninitialized => self.owner.store(access.tid as i32, Ordering::Release),
            Ownership::Exclusive(tid) if tid != access.tid => {
                self.owner.store(OWNER_SHARED, Ordering::Release)
            }
            Ownership::Exclusive(_) | Ownership::Shared => {}
        }

        race
    }

    /// Return to the never-accessed state. Idempotent; does not allocate.
    /// 恢复到从未访问过的状态。幂等，不分配。
    pub fn reset(&self, pool: &ClockPool) {
        let mut inner = self.inner.lock();
        inner.demote(pool);
        inner.read_stack = 0;
        self.last_read.store(NO_READ, Ordering::Release);
        self.write_count.store(0, Ordering::Relaxed);
        self.write_stack.store(0, Ordering::Relaxed);
        self.last_write.store(Epoch::ZERO.as_raw(), Ordering::Release);
        self.owner.store(OWNER_UNINIT, Ordering::Release);
    }

    /// Number of readers currently tracked (distinct threads with a non-zero
    /// entry once promoted).
    pub fn reader_count(&self) -> usize {
        match &self.inner.lock().reads {
            ReadHistory::NoReaders => 0,
            ReadHistory::Inline { len, .. } => *len as usize,
            ReadHistory::Promoted(clock) => clock.iter().count(),
        }
    }

    pub fn is_promoted(&self) -> bool {
        matches!(self.inner.lock().reads, ReadHistory::Promoted(_))
    }

    #[inline]
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    /// Copy of the cell for race reporting. The read history is consistent
    /// with itself; the atomic words are sampled while holding the cell lock.
    ///
    /// 用于竞争报告的单元副本。读历史自身一致；原子字在持有单元锁时采样。
    pub fn snapshot(&self) -> CellSnapshot {
        let inner = self.inner.lock();
        let (readers, promoted) = match &inner.reads {
            ReadHistory::NoReaders => (Vec::new(), false),
            ReadHistory::Inline { slots, len } => (slots[..*len as usize].to_vec(), false),
            ReadHistory::Promoted(clock) => (
                clock.iter().map(|(tid, at)| Epoch::new(tid, at)).collect(),
                true,
            ),
        };

        CellSnapshot {
            last_write: self.last_write(),
            ownership: self.ownership(),
            write_count: self.write_count(),
            readers,
            promoted,
            write_stack: self.write_stack.load(Ordering::Relaxed),
            read_stack: inner.read_stack,
        }
    }
}

/// Read-only view of a cell handed to the reporting side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSnapshot {
    pub last_write: Epoch,
    pub ownership: Ownership,
    pub write_count: u64,
    /// Reader epochs: the inline slots, or the non-zero entries of the
    /// promoted clock.
    pub readers: Vec<Epoch>,
    pub promoted: bool,
    pub write_stack: u64,
    pub read_stack: u64,
}
