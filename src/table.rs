//! Address-keyed table with create-once entries.
//!
//! The primary index is a fixed-capacity open-addressed array. A slot is
//! claimed by CAS on its key word, then the winner allocates the value and
//! publishes the pointer; losers that raced for the same address spin until
//! the pointer appears. Linear probing stops after `probe_bound` slots, and
//! an address whose probe run is full goes to a sharded overflow map whose
//! shards are cache-line padded and locked independently.
//!
//! Slots are never vacated while the table is shared (only `reset` and
//! `Drop`, which need exclusive access, clear them). Two consequences:
//! a lookup that meets an empty slot can stop, and every caller for a given
//! address follows the same probe run to the same place, so each address has
//! exactly one value.
//!
//! 以地址为键、条目只创建一次的表。
//!
//! 主索引是固定容量的开放寻址数组。通过对键字做 CAS 来占据槽位，
//! 胜者随后分配值并发布指针；为同一地址竞争失败的线程自旋等待指针出现。
//! 线性探测在 `probe_bound` 个槽后停止，探测序列已满的地址进入分片溢出映射，
//! 各分片按缓存行填充并独立加锁。
//!
//! 表被共享期间槽位从不腾空（只有需要独占访问的 `reset` 与 `Drop` 会清空）。
//! 因此：查找遇到空槽即可停止；同一地址的所有调用者走相同的探测序列到达同一位置，
//! 每个地址恰好只有一个值。

use crate::sync::{AtomicBool, AtomicPtr, AtomicUsize, Ordering, RwLock, spin_loop};
use crossbeam_utils::CachePadded;
use foldhash::fast::FixedState;
use std::boxed::Box;
use std::collections::HashMap;
use std::ptr;
use std::vec::Vec;
use tracing::{debug, trace};

/// Key of a slot nobody has claimed. Address 0 is routed to the overflow map.
const EMPTY: usize = 0;

/// 2^64 / golden ratio.
const FIBONACCI: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug)]
struct Slot<V> {
    key: AtomicUsize,
    value: AtomicPtr<V>,
}

impl<V> Slot<V> {
    fn empty() -> Self {
        Self {
            key: AtomicUsize::new(EMPTY),
            value: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

type Shard<V> = CachePadded<RwLock<HashMap<usize, Box<V>, FixedState>>>;

/// Counters describing where entries landed.
/// 描述条目落点的计数器。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Entries living in the open-addressed index.
    pub indexed: usize,
    /// Entries that exhausted their probe run and live in the overflow map.
    pub overflowed: usize,
}

impl TableStats {
    #[inline]
    pub fn entries(&self) -> usize {
        self.indexed + self.overflowed
    }

    /// Fraction of entries that missed the index, in `[0, 1]`.
    pub fn overflow_ratio(&self) -> f64 {
        match self.entries() {
            0 => 0.0,
            n => self.overflowed as f64 / n as f64,
        }
    }
}

pub(crate) struct AddressTable<V> {
    name: &'static str,
    slots: Box<[Slot<V>]>,
    mask: usize,
    shift: u32,
    probe_bound: usize,
    overflow: Box<[Shard<V>]>,
    shard_mask: usize,
    indexed: AtomicUsize,
    overflowed: AtomicUsize,
    overflow_logged: AtomicBool,
}

impl<V: Default> AddressTable<V> {
    /// `capacity` and `shards` must be non-zero powers of two; the builder
    /// validates them.
    pub(crate) fn new(
        name: &'static str,
        capacity: usize,
        probe_bound: usize,
        shards: usize,
    ) -> Self {
        debug_assert!(capacity.is_power_of_two());
        debug_assert!(shards.is_power_of_two());
        debug_assert!(probe_bound > 0);

        let slots: Vec<Slot<V>> = (0..capacity).map(|_| Slot::empty()).collect();
        let overflow: Vec<Shard<V>> = (0..shards)
            .map(|_| CachePadded::new(RwLock::new(HashMap::with_hasher(FixedState::default()))))
            .collect();

        Self {
            name,
            slots: slots.into_boxed_slice(),
            mask: capacity - 1,
            shift: 64 - capacity.trailing_zeros(),
            probe_bound: probe_bound.min(capacity),
            overflow: overflow.into_boxed_slice(),
            shard_mask: shards - 1,
            indexed: AtomicUsize::new(0),
            overflowed: AtomicUsize::new(0),
            overflow_logged: AtomicBool::new(false),
        }
    }

    #[inline(always)]
    fn home(&self, addr: usize) -> usize {
        // Top bits of the product; a 1-slot table has shift 64 and always home 0.
        (addr as u64)
            .wrapping_mul(FIBONACCI)
            .checked_shr(self.shift)
            .unwrap_or(0) as usize
    }

    #[inline]
    fn shard(&self, addr: usize) -> &Shard<V> {
        let hash = (addr as u64).wrapping_mul(FIBONACCI) >> 32;
        &self.overflow[hash as usize & self.shard_mask]
    }

    /// Value for `addr`, installing a default one if there is none.
    ///
    /// Concurrent calls for the same address allocate once and all return
    /// the same value.
    pub(crate) fn get_or_create(&self, addr: usize) -> &V {
        if addr != EMPTY {
            let home = self.home(addr);
            for probe in 0..self.probe_bound {
                let slot = &self.slots[(home + probe) & self.mask];
                let mut key = slot.key.load(Ordering::Acquire);

                if key == EMPTY {
                    match slot
                        .key
                        .compare_exchange(EMPTY, addr, Ordering::AcqRel, Ordering::Acquire)
                    {
                        Ok(_) => {
                            let value = Box::into_raw(Box::<V>::default());
                            slot.value.store(value, Ordering::Release);
                            self.indexed.fetch_add(1, Ordering::Relaxed);
                            // SAFETY: `value` came from `Box::into_raw` and is only
                            // freed by `clear`, which needs `&mut self`.
                            return unsafe { &*value };
                        }
                        Err(winner) => key = winner,
                    }
                }

                if key == addr {
                    return Self::published(slot);
                }
            }
        }

        self.overflow_get_or_create(addr)
    }

    /// Value for `addr` if one exists. Never allocates or inserts.
    pub(crate) fn get(&self, addr: usize) -> Option<&V> {
        if addr != EMPTY {
            let home = self.home(addr);
            for probe in 0..self.probe_bound {
                let slot = &self.slots[(home + probe) & self.mask];
                let key = slot.key.load(Ordering::Acquire);
                if key == EMPTY {
                    return None;
                }
                if key == addr {
                    let value = slot.value.load(Ordering::Acquire);
                    // A claimed slot whose value is still being published is
                    // treated as not yet created.
                    // SAFETY: see `get_or_create`.
                    return unsafe { value.as_ref() };
                }
            }
        }

        let value = self.shard(addr).read().get(&addr).map(|boxed| &**boxed as *const V);
        // SAFETY: boxed overflow values keep their address and are only
        // dropped by `clear`, which needs `&mut self`.
        value.map(|value| unsafe { &*value })
    }

    /// Wait for the slot's winner to publish its value.
    #[inline]
    fn published(slot: &Slot<V>) -> &V {
        loop {
            let value = slot.value.load(Ordering::Acquire);
            if !value.is_null() {
                // SAFETY: see `get_or_create`.
                return unsafe { &*value };
            }
            spin_loop();
        }
    }

    #[cold]
    fn overflow_get_or_create(&self, addr: usize) -> &V {
        let shard = self.shard(addr);

        let existing = shard.read().get(&addr).map(|boxed| &**boxed as *const V);
        if let Some(value) = existing {
            // SAFETY: see `get`.
            return unsafe { &*value };
        }

        let mut map = shard.write();
        let value: *const V = &**map.entry(addr).or_insert_with(|| {
            self.overflowed.fetch_add(1, Ordering::Relaxed);
            Box::default()
        });
        drop(map);

        if !self.overflow_logged.swap(true, Ordering::Relaxed) {
            debug!(
                table = self.name,
                addr = format_args!("{addr:#x}"),
                probe_bound = self.probe_bound,
                "probe run exhausted, falling back to overflow map"
            );
        } else {
            trace!(table = self.name, addr = format_args!("{addr:#x}"), "overflow lookup");
        }

        // SAFETY: see `get`.
        unsafe { &*value }
    }

    pub(crate) fn stats(&self) -> TableStats {
        TableStats {
            indexed: self.indexed.load(Ordering::Relaxed),
            overflowed: self.overflowed.load(Ordering::Relaxed),
        }
    }

    /// Drop every entry. Exclusive access makes this safe to run.
    pub(crate) fn reset(&mut self) {
        self.clear();
        self.indexed.store(0, Ordering::Relaxed);
        self.overflowed.store(0, Ordering::Relaxed);
        self.overflow_logged.store(false, Ordering::Relaxed);
    }
}

impl<V> AddressTable<V> {
    fn clear(&mut self) {
        for slot in self.slots.iter() {
            let value = slot.value.swap(ptr::null_mut(), Ordering::Relaxed);
            slot.key.store(EMPTY, Ordering::Relaxed);
            if !value.is_null() {
                // SAFETY: published by `get_or_create` via `Box::into_raw`;
                // `&mut self` guarantees no outstanding references.
                unsafe { drop(Box::from_raw(value)) };
            }
        }
        for shard in self.overflow.iter() {
            shard.write().clear();
        }
    }
}

impl<V> Drop for AddressTable<V> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<V> std::fmt::Debug for AddressTable<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressTable")
            .field("name", &self.name)
            .field("capacity", &self.slots.len())
            .field("probe_bound", &self.probe_bound)
            .field("shards", &self.overflow.len())
            .finish()
    }
}
