//! Tuned constants and configuration defaults.
//! 调优常量与配置默认值。

/// Number of thread ids addressable by an epoch and a vector clock (16-bit ids).
/// epoch 与向量时钟可寻址的线程 id 数量（16 位）。
pub const MAX_THREADS: usize = 1 << 16;

/// Number of reader epochs a shadow cell tracks inline before promoting its
/// read history to a vector clock.
///
/// This is a measured trade-off between cell size and promotion frequency.
///
/// 影子单元在将读历史提升为向量时钟之前内联跟踪的读者 epoch 数量。
pub const INLINE_READER_SLOTS: usize = 4;

/// Default number of linear probes before an address falls back to the
/// overflow map.
/// 地址回退到溢出映射之前的默认线性探测次数。
pub const DEFAULT_PROBE_BOUND: usize = 8;

/// Default slot count of the memory-address table (power of two).
/// 内存地址表的默认槽数量（2 的幂）。
pub const DEFAULT_SHADOW_CAPACITY: usize = 1 << 16;

/// Default slot count of the synchronization-object table (power of two).
/// 同步对象表的默认槽数量（2 的幂）。
pub const DEFAULT_SYNC_CAPACITY: usize = 1 << 10;

/// Default shard count of a table's overflow map (power of two).
/// 溢出映射的默认分片数量（2 的幂）。
pub const DEFAULT_OVERFLOW_SHARDS: usize = 16;

/// Default number of spare vector clocks kept by the clock pool.
/// 时钟池保留的空闲向量时钟的默认数量。
pub const DEFAULT_POOL_LIMIT: usize = 64;
