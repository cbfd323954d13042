//! Happens-before core of a FastTrack dynamic data-race detector.
//!
//! - [`Epoch`]: packed `(tid, clock)` timestamp with an O(1) happens-before test.
//! - [`VectorClock`]: per-thread clocks with join and partial-order comparison.
//! - [`VarState`]: adaptive per-location history (inline readers, promoted to a
//!   vector clock when read-sharing grows).
//! - [`ShadowStore`] / [`SyncShadow`]: concurrent address → state maps.
//! - [`Detector`]: routes dispatcher events through all of the above.
//!
//! FastTrack 动态数据竞争检测器的先于关系核心。

mod cell;
mod clock;
mod domain;
mod epoch;
mod error;
mod overflow;
mod pool;
mod state;
mod store;
mod sync;
mod syncvar;
mod table;

pub use cell::{Access, CellSnapshot, Ownership, Race, RaceKind, VarState};
pub use clock::VectorClock;
pub use domain::{Detector, DetectorBuilder, DetectorStats, SyncOp};
pub use epoch::{CLOCK_BITS, Epoch, MAX_CLOCK, MAX_TID};
pub use error::ConfigError;
pub use overflow::{OverflowFlags, OverflowReport};
pub use pool::ClockPool;
pub use state::{
    DEFAULT_OVERFLOW_SHARDS, DEFAULT_POOL_LIMIT, DEFAULT_PROBE_BOUND, DEFAULT_SHADOW_CAPACITY,
    DEFAULT_SYNC_CAPACITY, INLINE_READER_SLOTS, MAX_THREADS,
};
pub use store::{CellHandle, ShadowStore, SyncShadow, SyncVarHandle};
pub use syncvar::SyncVar;
pub use table::TableStats;

#[cfg(all(test, not(feature = "loom")))]
mod tests;
