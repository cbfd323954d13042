use crate::cell::{Access, Race, VarState};
use crate::clock::VectorClock;
use crate::error::ConfigError;
use crate::overflow::OverflowFlags;
use crate::pool::ClockPool;
use crate::state::{
    DEFAULT_OVERFLOW_SHARDS, DEFAULT_POOL_LIMIT, DEFAULT_PROBE_BOUND, DEFAULT_SHADOW_CAPACITY,
    DEFAULT_SYNC_CAPACITY,
};
use crate::store::{ShadowStore, SyncShadow};
use crate::sync::Arc;
use crate::syncvar::SyncVar;
use crate::table::TableStats;
use tracing::debug;

/// A synchronization event reported by the dispatcher.
///
/// 调度器报告的同步事件。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOp {
    /// Lock acquired (exclusive or shared): join the release clock.
    Acquire,
    /// Exclusive unlock: the release clock becomes a copy of the caller's.
    Release,
    /// Shared (reader) unlock: join the caller's clock into the release clock.
    ReleaseShared,
    /// Channel send: the send clock becomes a copy of the caller's.
    Send,
    /// Channel receive: join the send clock, then record the receive clock.
    Receive,
    /// A send returned after its value was taken (rendezvous): join the
    /// receive clock.
    SendComplete,
    /// Channel close. Only the first close is recorded.
    Close,
    /// A receive that observed the close: join the close clock.
    ReceiveClosed,
    /// Countdown barrier counter adjustment.
    Add(i64),
    /// Countdown barrier completion: merge into the done clock, count down by one.
    Done,
    /// Countdown barrier wait returned: join the done clock.
    Wait,
}

/// Builder for configuring a `Detector`.
///
/// - `shadow_capacity` / `sync_capacity`: slot count of each address table
/// - `probe_bound`: linear probes before an address falls back to the overflow map
/// - `overflow_shards`: shard count of each overflow map
/// - `pool_limit`: spare vector clocks kept for promotions
/// - `overflow_flags`: share epoch overflow flags with the surrounding runtime
///
/// # Example
/// ```
/// use fasttrack_shadow::Detector;
///
/// let detector = Detector::builder()
///     .shadow_capacity(1 << 12)
///     .probe_bound(4)
///     .build()
///     .unwrap();
/// assert_eq!(detector.stats().shadow.entries(), 0);
/// ```
///
/// 用于配置 `Detector` 的构建器。
pub struct DetectorBuilder {
    shadow_capacity: usize,
    sync_capacity: usize,
    probe_bound: usize,
    overflow_shards: usize,
    pool_limit: usize,
    flags: Option<Arc<OverflowFlags>>,
}

impl DetectorBuilder {
    /// Create a new builder with default settings.
    /// 创建一个带有默认设置的新构建器。
    #[inline]
    pub fn new() -> Self {
        Self {
            shadow_capacity: DEFAULT_SHADOW_CAPACITY,
            sync_capacity: DEFAULT_SYNC_CAPACITY,
            probe_bound: DEFAULT_PROBE_BOUND,
            overflow_shards: DEFAULT_OVERFLOW_SHARDS,
            pool_limit: DEFAULT_POOL_LIMIT,
            flags: None,
        }
    }

    /// Slot count of the memory-address table. Must be a power of two.
    ///
    /// Default: `65536`
    ///
    /// 内存地址表的槽数量，必须是 2 的幂。
    #[inline]
    pub fn shadow_capacity(mut self, capacity: usize) -> Self {
        self.shadow_capacity = capacity;
        self
    }

    /// Slot count of the synchronization-object table. Must be a power of two.
    ///
    /// Default: `1024`
    #[inline]
    pub fn sync_capacity(mut self, capacity: usize) -> Self {
        self.sync_capacity = capacity;
        self
    }

    /// Linear probes before an address is kept in the overflow map instead.
    ///
    /// Default: `8`
    ///
    /// 地址改存到溢出映射之前的线性探测次数。
    #[inline]
    pub fn probe_bound(mut self, probe_bound: usize) -> Self {
        self.probe_bound = probe_bound;
        self
    }

    /// Shard count of each overflow map. Must be a power of two.
    ///
    /// Default: `16`
    #[inline]
    pub fn overflow_shards(mut self, shards: usize) -> Self {
        self.overflow_shards = shards;
        self
    }

    /// Spare vector clocks retained between demotion and the next promotion.
    ///
    /// Default: `64`
    #[inline]
    pub fn pool_limit(mut self, limit: usize) -> Self {
        self.pool_limit = limit;
        self
    }

    /// Use an existing set of overflow flags instead of a private one.
    ///
    /// 使用已有的溢出标志，而不是私有的一组。
    #[inline]
    pub fn overflow_flags(mut self, flags: Arc<OverflowFlags>) -> Self {
        self.flags = Some(flags);
        self
    }

    /// Validate the settings and build the `Detector`.
    /// 校验配置并构建 `Detector`。
    pub fn build(self) -> Result<Detector, ConfigError> {
        for (table, value) in [("shadow", self.shadow_capacity), ("sync", self.sync_capacity)] {
            if !value.is_power_of_two() {
                return Err(ConfigError::Capacity { table, value });
            }
        }
        if self.probe_bound == 0 {
            return Err(ConfigError::ZeroProbeBound);
        }
        if !self.overflow_shards.is_power_of_two() {
            return Err(ConfigError::Shards(self.overflow_shards));
        }

        Ok(self.assemble())
    }

    fn assemble(self) -> Detector {
        Detector {
            shadow: ShadowStore::new(self.shadow_capacity, self.probe_bound, self.overflow_shards),
            sync: SyncShadow::new(self.sync_capacity, self.probe_bound, self.overflow_shards),
            pool: ClockPool::new(self.pool_limit),
            flags: self.flags.unwrap_or_else(|| Arc::new(OverflowFlags::new())),
        }
    }
}

impl Default for DetectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry statistics of both stores and the clock pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorStats {
    pub shadow: TableStats,
    pub sync: TableStats,
    pub spare_clocks: usize,
}

/// The FastTrack core as seen by an event dispatcher.
///
/// `Detector` owns the shadow store, the synchronization shadow, the clock
/// pool and the overflow flags. It is `Sync`: share it by reference or `Arc`
/// with every monitored thread. Each thread keeps its own `VectorClock`, ticks
/// it as it sees fit, and passes it to every call.
///
/// **Typical Usage**:
/// ```
/// use fasttrack_shadow::{Detector, RaceKind, SyncOp, VectorClock};
///
/// let detector = Detector::new();
/// let (mut a, mut b) = (VectorClock::new(), VectorClock::new());
/// a.increment(0);
/// b.increment(1);
///
/// // Thread 0 writes, then unlocks.
/// assert!(detector.write(0x1000, 0, &a, 0).is_none());
/// detector.sync(0x2000, SyncOp::Release, &mut a);
///
/// // Thread 1 locks before reading: ordered.
/// detector.sync(0x2000, SyncOp::Acquire, &mut b);
/// assert!(detector.read(0x1000, 1, &b, 0).is_none());
///
/// // Without the lock the read races.
/// let c = VectorClock::from_iter([(2, 1)]);
/// let race = detector.read(0x1000, 2, &c, 0).unwrap();
/// assert_eq!(race.kind, RaceKind::WriteRead);
/// ```
///
/// 事件调度器视角下的 FastTrack 核心。
/// `Detector` 持有影子存储、同步影子、时钟池与溢出标志。它是 `Sync` 的：
/// 通过引用或 `Arc` 与所有被监控线程共享。每个线程维护自己的 `VectorClock`，
/// 自行推进，并在每次调用时传入。
#[derive(Debug)]
pub struct Detector {
    shadow: ShadowStore,
    sync: SyncShadow,
    pool: ClockPool,
    flags: Arc<OverflowFlags>,
}

impl Detector {
    /// Create a detector with default settings.
    /// 使用默认设置创建检测器。
    #[inline]
    pub fn new() -> Self {
        DetectorBuilder::new().assemble()
    }

    /// Create a builder for configuring the detector.
    /// 创建一个用于配置检测器的构建器。
    #[inline]
    pub fn builder() -> DetectorBuilder {
        DetectorBuilder::new()
    }

    /// Check a read of `addr` by thread `tid` whose current clock is `clock`.
    ///
    /// `stack` is an opaque hint kept for reporting. Returns the race, if any;
    /// detection goes on either way.
    ///
    /// 检查线程 `tid`（当前时钟为 `clock`）对 `addr` 的一次读。
    /// `stack` 是保留给报告用的不透明提示。返回检测到的竞争（如有）；无论如何检测都会继续。
    pub fn read(&self, addr: usize, tid: u32, clock: &VectorClock, stack: u64) -> Option<Race> {
        let access = Access::clamped(tid, clock, stack, &self.flags);
        let race = self.shadow.get_or_create(addr).read(&access, &self.pool);
        if let Some(race) = &race {
            log_race(addr, race);
        }
        race
    }

    /// Check a write of `addr`. See `read`.
    /// 检查对 `addr` 的一次写。参见 `read`。
    pub fn write(&self, addr: usize, tid: u32, clock: &VectorClock, stack: u64) -> Option<Race> {
        let access = Access::clamped(tid, clock, stack, &self.flags);
        let race = self.shadow.get_or_create(addr).write(&access, &self.pool);
        if let Some(race) = &race {
            log_race(addr, race);
        }
        race
    }

    /// Memory at `addr` was freed: forget its history so a reuse starts clean.
    /// Returns false when the address was never accessed.
    ///
    /// `addr` 处的内存已释放：清除其历史，使复用时从干净状态开始。
    pub fn free(&self, addr: usize) -> bool {
        self.shadow.reset_cell(addr, &self.pool)
    }

    /// Apply a synchronization event on the object at `addr`.
    ///
    /// For acquiring operations the relevant stored clock is joined into
    /// `clock`; the return value tells whether anything was joined. Releasing
    /// operations only read `clock` and return false.
    ///
    /// 对 `addr` 处的同步对象应用一个同步事件。
    /// 对获取类操作，相应的已存储时钟会被合并进 `clock`，返回值表示是否合并了内容。
    /// 释放类操作只读取 `clock` 并返回 false。
    pub fn sync(&self, addr: usize, op: SyncOp, clock: &mut VectorClock) -> bool {
        let var = self.sync.get_or_create(addr);
        match op {
            SyncOp::Acquire => var.acquire_into(clock),
            SyncOp::Release => {
                var.set_release_clock(clock);
                false
            }
            SyncOp::ReleaseShared => {
                var.merge_release_clock(clock);
                false
            }
            SyncOp::Send => {
                var.set_send_clock(clock);
                false
            }
            SyncOp::Receive => {
                let joined = var.join_send_into(clock);
                var.set_recv_clock(clock);
                joined
            }
            SyncOp::SendComplete => var.join_recv_into(clock),
            SyncOp::Close => {
                if !var.set_close_clock(clock) {
                    debug!(addr = format_args!("{addr:#x}"), "channel closed again, ignored");
                }
                false
            }
            SyncOp::ReceiveClosed => var.join_close_into(clock),
            SyncOp::Add(delta) => {
                var.add(delta);
                false
            }
            SyncOp::Done => {
                var.done(clock);
                false
            }
            SyncOp::Wait => var.join_done_into(clock),
        }
    }

    /// Shadow cell of `addr`, for the reporting side.
    #[inline]
    pub fn cell(&self, addr: usize) -> Option<&VarState> {
        self.shadow.get(addr)
    }

    /// Synchronization record of `addr`, for the reporting side.
    #[inline]
    pub fn sync_var(&self, addr: usize) -> Option<&SyncVar> {
        self.sync.get(addr)
    }

    #[inline]
    pub fn shadow(&self) -> &ShadowStore {
        &self.shadow
    }

    #[inline]
    pub fn sync_shadow(&self) -> &SyncShadow {
        &self.sync
    }

    #[inline]
    pub fn pool(&self) -> &ClockPool {
        &self.pool
    }

    #[inline]
    pub fn overflow_flags(&self) -> &Arc<OverflowFlags> {
        &self.flags
    }

    pub fn stats(&self) -> DetectorStats {
        DetectorStats {
            shadow: self.shadow.stats(),
            sync: self.sync.stats(),
            spare_clocks: self.pool.spare(),
        }
    }

    /// Discard all shadow state. The overflow flags keep their own lifecycle
    /// and are not touched.
    ///
    /// 丢弃所有影子状态。溢出标志有独立的生命周期，不受影响。
    pub fn reset(&mut self) {
        self.shadow.reset();
        self.sync.reset();
        self.pool.drain();
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}

fn log_race(addr: usize, race: &Race) {
    debug!(
        addr = format_args!("{addr:#x}"),
        kind = ?race.kind,
        prior = %race.prior,
        current = %race.current,
        "race detected"
    );
}
