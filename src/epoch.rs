use crate::clock::VectorClock;
use crate::overflow::OverflowFlags;
use std::fmt;

/// Bits used by the clock component of an epoch.
pub const CLOCK_BITS: u32 = 48;

/// Largest thread id an epoch can carry.
pub const MAX_TID: u64 = (1 << (64 - CLOCK_BITS)) - 1;

/// Largest clock an epoch can carry.
pub const MAX_CLOCK: u64 = (1 << CLOCK_BITS) - 1;

const CLOCK_MASK: u64 = MAX_CLOCK;

// "Near" thresholds sit at 90% of each field's range.
const TID_NEAR: u64 = MAX_TID / 10 * 9;
const CLOCK_NEAR: u64 = MAX_CLOCK / 10 * 9;

/// A packed `(thread id, clock)` timestamp: `c@t` in FastTrack notation.
///
/// The thread id lives in the top 16 bits and the clock in the low 48 bits.
/// The zero epoch (`0@0`) happens-before every vector clock, which is what a
/// never-written location needs.
///
/// 打包的 `(线程 id, 时钟)` 时间戳，即 FastTrack 记法中的 `c@t`。
///
/// 线程 id 占高 16 位，时钟占低 48 位。零 epoch (`0@0`) 先于任何向量时钟发生，
/// 正好对应从未被写过的位置。
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Epoch(u64);

impl Epoch {
    /// The epoch of "no access yet".
    pub const ZERO: Epoch = Epoch(0);

    /// Build an epoch from in-range parts.
    ///
    /// Every `u16` thread id and every `u32` clock fits, so this never clamps.
    ///
    /// 从范围内的分量构造 epoch。任何 `u16` 线程 id 与 `u32` 时钟都能放下，因此从不截断。
    #[inline]
    pub const fn new(tid: u16, clock: u32) -> Self {
        Epoch(((tid as u64) << CLOCK_BITS) | clock as u64)
    }

    /// Build an epoch from raw, possibly out-of-range parts.
    ///
    /// Values beyond the field widths are clamped to the field maximum (never
    /// wrapped) and the matching flag in `flags` is raised. Values within 10%
    /// of the limit raise the "near" flag.
    ///
    /// 从原始的、可能越界的分量构造 epoch。
    /// 超出字段宽度的值被截断到最大值（从不回绕），并设置 `flags` 中对应的标志；
    /// 距上限 10% 以内的值会设置 "near" 标志。
    pub fn make(tid: u64, clock: u64, flags: &OverflowFlags) -> Self {
        let tid = if tid > MAX_TID {
            flags.note_tid_overflow(tid);
            MAX_TID
        } else {
            if tid >= TID_NEAR {
                flags.note_tid_near(tid);
            }
            tid
        };

        let clock = if clock > MAX_CLOCK {
            flags.note_clock_overflow(clock);
            MAX_CLOCK
        } else {
            if clock >= CLOCK_NEAR {
                flags.note_clock_near(clock);
            }
            clock
        };

        Epoch((tid << CLOCK_BITS) | clock)
    }

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Epoch(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn tid(self) -> u16 {
        (self.0 >> CLOCK_BITS) as u16
    }

    #[inline]
    pub const fn clock(self) -> u64 {
        self.0 & CLOCK_MASK
    }

    /// Split into `(thread id, clock)`.
    /// 拆分为 `(线程 id, 时钟)`。
    #[inline]
    pub const fn decode(self) -> (u16, u64) {
        (self.tid(), self.clock())
    }

    /// `clock <= vc[tid]`: the access this epoch stands for is ordered before
    /// the holder of `vc`.
    ///
    /// This is the single hottest comparison of the detector.
    ///
    /// `clock <= vc[tid]`：此 epoch 代表的访问先于 `vc` 的持有者发生。
    /// 这是检测器中最热的比较。
    #[inline(always)]
    pub fn happens_before(self, vc: &VectorClock) -> bool {
        self.clock() <= vc.get(self.tid()) as u64
    }

    /// Raw equality, used to skip `happens_before` when an access repeats.
    #[inline(always)]
    pub const fn same(self, other: Epoch) -> bool {
        self.0 == other.0
    }
}

impl fmt::Debug for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Epoch({}@{})", self.clock(), self.tid())
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.clock(), self.tid())
    }
}
