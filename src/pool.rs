use crate::clock::VectorClock;
use crate::sync::Mutex;
use std::vec::Vec;

/// Free list of vector clock buffers.
///
/// Promotion checks a clock out, demotion and reset give it back. Returned
/// clocks are zeroed but keep their capacity, so a cell that keeps flipping
/// between inline and promoted read tracking stops allocating after warm-up.
/// The free list itself is allocated up front with room for `limit` clocks:
/// giving a clock back never allocates.
///
/// 向量时钟缓冲区的空闲链表。
///
/// 提升时取出时钟，降级和重置时归还。归还的时钟被清零但保留容量，
/// 因此在内联与提升之间反复切换的单元在预热后不再分配。
/// 空闲链表本身预先分配 `limit` 个位置：归还时钟从不分配。
#[derive(Debug)]
pub struct ClockPool {
    spare: Mutex<Vec<VectorClock>>,
    limit: usize,
}

impl ClockPool {
    pub fn new(limit: usize) -> Self {
        Self {
            spare: Mutex::new(Vec::with_capacity(limit)),
            limit,
        }
    }

    /// Take a zeroed clock, reusing a spare buffer when one is available.
    /// 取出一个全零时钟，尽可能复用空闲缓冲区。
    #[inline]
    pub fn checkout(&self) -> VectorClock {
        self.spare.lock().pop().unwrap_or_default()
    }

    /// Return a clock. It is dropped instead when the pool is full.
    /// 归还一个时钟；池满时直接丢弃。
    #[inline]
    pub fn give_back(&self, mut clock: VectorClock) {
        clock.clear();
        let mut spare = self.spare.lock();
        if spare.len() < self.limit {
            spare.push(clock);
        }
    }

    /// Number of spare clocks currently held.
    pub fn spare(&self) -> usize {
        self.spare.lock().len()
    }

    /// Drop every spare clock.
    pub(crate) fn drain(&self) {
        self.spare.lock().clear();
    }
}
