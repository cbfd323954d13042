use crate::sync::{AtomicBool, Ordering};
use tracing::warn;

/// Sticky flags recording that an epoch field had to be clamped.
///
/// Clamping never wraps, so a clamped clock under-advances and the detector
/// leans toward reporting races rather than missing them. These flags make
/// that loss of precision observable to the surrounding runtime, which is
/// expected to poll `report()` periodically and `reset()` after handling it.
///
/// One instance is normally shared by a whole `Detector` through an `Arc`;
/// several detectors may share the same instance.
///
/// 记录 epoch 字段被截断（clamp）的粘性标志。
///
/// 截断从不回绕，因此被截断的时钟只会少推进，检测器倾向于多报而不是漏报竞争。
/// 这些标志让外部运行时能够观察到这种精度损失，运行时应定期调用 `report()`，
/// 处理后调用 `reset()`。
#[derive(Debug)]
pub struct OverflowFlags {
    tid_overflow: AtomicBool,
    tid_near: AtomicBool,
    clock_overflow: AtomicBool,
    clock_near: AtomicBool,
}

/// Point-in-time copy of the overflow flags.
/// 溢出标志的瞬时副本。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverflowReport {
    /// A thread id above 16 bits was clamped.
    pub tid_overflow: bool,
    /// A thread id reached 90% of the 16-bit range.
    pub tid_near: bool,
    /// A clock above 48 bits was clamped.
    pub clock_overflow: bool,
    /// A clock reached 90% of the 48-bit range.
    pub clock_near: bool,
}

impl OverflowReport {
    /// Whether any flag is set.
    #[inline]
    pub fn any(&self) -> bool {
        self.tid_overflow || self.tid_near || self.clock_overflow || self.clock_near
    }

    /// Whether a value was actually clamped (as opposed to only approaching the limit).
    #[inline]
    pub fn clamped(&self) -> bool {
        self.tid_overflow || self.clock_overflow
    }
}

/// Set `flag` once; returns true for the call that flipped it.
#[inline]
fn raise(flag: &AtomicBool) -> bool {
    // Plain load first so the common already-set case stays read-only.
    !flag.load(Ordering::Relaxed) && !flag.swap(true, Ordering::AcqRel)
}

impl OverflowFlags {
    /// Create a set of cleared flags.
    /// 创建一组已清除的标志。
    pub fn new() -> Self {
        Self {
            tid_overflow: AtomicBool::new(false),
            tid_near: AtomicBool::new(false),
            clock_overflow: AtomicBool::new(false),
            clock_near: AtomicBool::new(false),
        }
    }

    pub(crate) fn note_tid_overflow(&self, tid: u64) {
        if raise(&self.tid_overflow) {
            warn!(tid, "thread id exceeds 16 bits; clamping, race detection precision reduced");
        }
    }

    pub(crate) fn note_tid_near(&self, tid: u64) {
        if raise(&self.tid_near) {
            warn!(tid, "thread id is above 90% of the 16-bit range");
        }
    }

    pub(crate) fn note_clock_overflow(&self, clock: u64) {
        if raise(&self.clock_overflow) {
            warn!(
                clock,
                "logical clock exceeds 48 bits; clamping, race detection precision reduced"
            );
        }
    }

    pub(crate) fn note_clock_near(&self, clock: u64) {
        if raise(&self.clock_near) {
            warn!(clock, "logical clock is above 90% of the 48-bit range");
        }
    }

    #[inline]
    pub fn tid_overflowed(&self) -> bool {
        self.tid_overflow.load(Ordering::Acquire)
    }

    #[inline]
    pub fn tid_near_overflow(&self) -> bool {
        self.tid_near.load(Ordering::Acquire)
    }

    #[inline]
    pub fn clock_overflowed(&self) -> bool {
        self.clock_overflow.load(Ordering::Acquire)
    }

    #[inline]
    pub fn clock_near_overflow(&self) -> bool {
        self.clock_near.load(Ordering::Acquire)
    }

    /// Read all flags.
    /// 读取所有标志。
    pub fn report(&self) -> OverflowReport {
        OverflowReport {
            tid_overflow: self.tid_overflowed(),
            tid_near: self.tid_near_overflow(),
            clock_overflow: self.clock_overflowed(),
            clock_near: self.clock_near_overflow(),
        }
    }

    /// Clear all flags.
    /// 清除所有标志。
    pub fn reset(&self) {
        self.tid_overflow.store(false, Ordering::Release);
        self.tid_near.store(false, Ordering::Release);
        self.clock_overflow.store(false, Ordering::Release);
        self.clock_near.store(false, Ordering::Release);
    }
}

impl Default for OverflowFlags {
    fn default() -> Self {
        Self::new()
    }
}
