//! Vector clocks.
//!
//! A `VectorClock` is stored densely up to its high-water mark and nothing
//! beyond it: the backing buffer always ends with a non-zero entry (or is
//! empty). The buffer length therefore *is* the cached `max_tid + 1`, clones
//! copy only the populated prefix, and two clocks are equal exactly when
//! their buffers are equal.
//!
//! 向量时钟只稠密存储到高水位线为止：底层缓冲区总是以非零项结尾（或为空）。
//! 因此缓冲区长度就是缓存的 `max_tid + 1`，克隆只复制有效前缀，
//! 两个时钟相等当且仅当缓冲区相等。

use std::fmt;

/// Per-thread logical clocks indexed by 16-bit thread id.
/// 按 16 位线程 id 索引的逐线程逻辑时钟。
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct VectorClock {
    clocks: Vec<u32>,
}

impl VectorClock {
    /// All-zero clock. Does not allocate.
    /// 全零时钟，不分配内存。
    #[inline]
    pub const fn new() -> Self {
        Self { clocks: Vec::new() }
    }

    #[inline(always)]
    pub fn get(&self, tid: u16) -> u32 {
        self.clocks.get(tid as usize).copied().unwrap_or(0)
    }

    /// Set the entry for `tid`, moving the high-water mark as needed.
    /// 设置 `tid` 对应的项，并按需移动高水位线。
    pub fn set(&mut self, tid: u16, value: u32) {
        let idx = tid as usize;
        if idx < self.clocks.len() {
            self.clocks[idx] = value;
            if value == 0 && idx + 1 == self.clocks.len() {
                self.trim();
            }
        } else if value != 0 {
            self.clocks.resize(idx + 1, 0);
            self.clocks[idx] = value;
        }
    }

    /// Advance `tid` by one and return the new value. Saturates at `u32::MAX`.
    /// 将 `tid` 加一并返回新值，在 `u32::MAX` 处饱和。
    pub fn increment(&mut self, tid: u16) -> u32 {
        let next = self.get(tid).saturating_add(1);
        self.set(tid, next);
        next
    }

    /// Highest thread id with a non-zero entry.
    #[inline]
    pub fn max_tid(&self) -> Option<u16> {
        self.clocks.len().checked_sub(1).map(|idx| idx as u16)
    }

    /// True when every entry is zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.clocks.is_empty()
    }

    /// Pointwise maximum with `other`, in place.
    ///
    /// 与 `other` 逐项取最大值（原地）。
    pub fn join(&mut self, other: &VectorClock) {
        if other.clocks.len() > self.clocks.len() {
            self.clocks.resize(other.clocks.len(), 0);
        }
        for (mine, theirs) in self.clocks.iter_mut().zip(other.clocks.iter()) {
            if *theirs > *mine {
                *mine = *theirs;
            }
        }
    }

    /// Happens-before partial order: every entry of `self` is `<=` the
    /// matching entry of `other`.
    ///
    /// Only `0..=self.max_tid` is visited; if `self` reaches further than
    /// `other` its last (non-zero) entry already exceeds `other`'s zero.
    ///
    /// 先于偏序：`self` 的每一项都 `<=` `other` 的对应项。
    pub fn less_or_equal(&self, other: &VectorClock) -> bool {
        if self.clocks.len() > other.clocks.len() {
            return false;
        }
        self.clocks
            .iter()
            .zip(other.clocks.iter())
            .all(|(mine, theirs)| mine <= theirs)
    }

    /// First thread whose entry in `self` is not ordered before `other`,
    /// with `self`'s clock for it.
    pub fn first_unordered(&self, other: &VectorClock) -> Option<(u16, u32)> {
        self.clocks
            .iter()
            .enumerate()
            .find(|&(tid, &clock)| clock > other.get(tid as u16))
            .map(|(tid, &clock)| (tid as u16, clock))
    }

    /// Become a copy of `other`, reusing this clock's buffer.
    #[inline]
    pub fn copy_from(&mut self, other: &VectorClock) {
        self.clocks.clone_from(&other.clocks);
    }

    /// Zero every entry, keeping the buffer's capacity.
    #[inline]
    pub fn clear(&mut self) {
        self.clocks.clear();
    }

    /// Non-zero entries as `(tid, clock)` pairs, in thread-id order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, u32)> + '_ {
        self.clocks
            .iter()
            .enumerate()
            .filter(|&(_, &clock)| clock != 0)
            .map(|(tid, &clock)| (tid as u16, clock))
    }

    fn trim(&mut self) {
        while self.clocks.last() == Some(&0) {
            self.clocks.pop();
        }
    }
}

impl FromIterator<(u16, u32)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (u16, u32)>>(iter: I) -> Self {
        let mut clock = VectorClock::new();
        for (tid, value) in iter {
            clock.set(tid, value);
        }
        clock
    }
}

impl fmt::Debug for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VC")?;
        f.debug_map().entries(self.iter()).finish()
    }
}
