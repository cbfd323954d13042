use crate::cell::VarState;
use crate::pool::ClockPool;
use crate::syncvar::SyncVar;
use crate::table::{AddressTable, TableStats};

/// Handle to a shadow cell, valid while the store is borrowed.
pub type CellHandle<'a> = &'a VarState;

/// Handle to a synchronization record, valid while the store is borrowed.
pub type SyncVarHandle<'a> = &'a SyncVar;

/// Memory address → shadow cell.
///
/// This is hit once per monitored access. A hit costs one multiplicative
/// hash and a few atomic loads; it never allocates and never locks.
///
/// 内存地址 → 影子单元。每次被监控的访问都会命中一次。
/// 命中只需一次乘法哈希和几次原子加载；从不分配，也从不加锁。
#[derive(Debug)]
pub struct ShadowStore {
    table: AddressTable<VarState>,
}

impl ShadowStore {
    pub(crate) fn new(capacity: usize, probe_bound: usize, shards: usize) -> Self {
        Self {
            table: AddressTable::new("shadow", capacity, probe_bound, shards),
        }
    }

    /// The cell for `addr`, created zero-valued on first use.
    ///
    /// Concurrent callers for the same address all receive the same cell.
    ///
    /// `addr` 对应的单元，首次使用时以零值创建。同一地址的并发调用者都得到同一个单元。
    #[inline]
    pub fn get_or_create(&self, addr: usize) -> CellHandle<'_> {
        self.table.get_or_create(addr)
    }

    /// The cell for `addr` if it was ever created. Never allocates.
    /// 若 `addr` 的单元已创建则返回它。从不分配。
    #[inline]
    pub fn get(&self, addr: usize) -> Option<CellHandle<'_>> {
        self.table.get(addr)
    }

    /// Reset the cell of reclaimed memory so a later reuse starts clean.
    /// Returns false when the address was never accessed.
    pub fn reset_cell(&self, addr: usize, pool: &ClockPool) -> bool {
        match self.get(addr) {
            Some(cell) => {
                cell.reset(pool);
                true
            }
            None => false,
        }
    }

    /// Drop every cell.
    /// 丢弃所有单元。
    pub fn reset(&mut self) {
        self.table.reset();
    }

    pub fn stats(&self) -> TableStats {
        self.table.stats()
    }

    pub fn len(&self) -> usize {
        self.stats().entries()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Synchronization-object address → synchronization record.
/// 同步对象地址 → 同步记录。
#[derive(Debug)]
pub struct SyncShadow {
    table: AddressTable<SyncVar>,
}

impl SyncShadow {
    pub(crate) fn new(capacity: usize, probe_bound: usize, shards: usize) -> Self {
        Self {
            table: AddressTable::new("sync", capacity, probe_bound, shards),
        }
    }

    #[inline]
    pub fn get_or_create(&self, addr: usize) -> SyncVarHandle<'_> {
        self.table.get_or_create(addr)
    }

    #[inline]
    pub fn get(&self, addr: usize) -> Option<SyncVarHandle<'_>> {
        self.table.get(addr)
    }

    pub fn reset(&mut self) {
        self.table.reset();
    }

    pub fn stats(&self) -> TableStats {
        self.table.stats()
    }

    pub fn len(&self) -> usize {
        self.stats().entries()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
