use crate::clock::VectorClock;
use crate::sync::{AtomicBool, Mutex, Ordering};
use std::boxed::Box;
use tracing::warn;

#[derive(Debug, Default)]
struct ChannelClocks {
    send: Option<VectorClock>,
    recv: Option<VectorClock>,
    close: Option<VectorClock>,
}

#[derive(Debug, Default)]
struct BarrierState {
    done: Option<VectorClock>,
    counter: i64,
}

#[derive(Debug, Default)]
struct SyncInner {
    release: Option<VectorClock>,
    channel: Option<Box<ChannelClocks>>,
    barrier: Option<Box<BarrierState>>,
}

impl SyncInner {
    #[inline]
    fn channel(&mut self) -> &mut ChannelClocks {
        self.channel.get_or_insert_with(Box::default)
    }

    #[inline]
    fn barrier(&mut self) -> &mut BarrierState {
        self.barrier.get_or_insert_with(Box::default)
    }
}

/// Overwrite `slot` with a copy of `clock`, reusing its buffer.
#[inline]
fn store_copy(slot: &mut Option<VectorClock>, clock: &VectorClock) {
    match slot {
        Some(held) => held.copy_from(clock),
        None => *slot = Some(clock.clone()),
    }
}

/// Join `clock` into `slot`; the first merge is a copy.
#[inline]
fn store_join(slot: &mut Option<VectorClock>, clock: &VectorClock) {
    match slot {
        Some(held) => held.join(clock),
        None => *slot = Some(clock.clone()),
    }
}

/// Join `slot` into `clock` if present.
#[inline]
fn join_into(slot: &Option<VectorClock>, clock: &mut VectorClock) -> bool {
    match slot {
        Some(held) => {
            clock.join(held);
            true
        }
        None => false,
    }
}

fn warn_negative(counter: i64, delta: i64) {
    if counter < 0 {
        warn!(counter, delta, "countdown barrier counter went negative");
    }
}

/// Shadow state of one synchronization object.
///
/// The same address may be used as a lock, a channel or a countdown barrier;
/// each of these keeps its clocks in a separate part that is only allocated
/// the first time that kind of operation touches the object. Stored clocks
/// are always copies of the caller's clock, never references to it.
///
/// 一个同步对象的影子状态。
///
/// 同一地址可被用作锁、通道或倒计数屏障；每种用途的时钟存放在独立的部分，
/// 只有该类操作首次作用于此对象时才会分配。存储的时钟总是调用者时钟的副本，而非引用。
#[derive(Debug)]
pub struct SyncVar {
    closed: AtomicBool,
    inner: Mutex<SyncInner>,
}

impl Default for SyncVar {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncVar {
    pub fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            inner: Mutex::new(SyncInner::default()),
        }
    }

    // --- lock ---

    /// Record an unlock: copy the releasing thread's clock.
    /// 记录一次解锁：复制释放线程的时钟。
    pub fn set_release_clock(&self, clock: &VectorClock) {
        store_copy(&mut self.inner.lock().release, clock);
    }

    /// Record a shared (reader) unlock: join instead of overwrite, so the next
    /// exclusive acquirer observes every reader that released before it.
    ///
    /// 记录一次共享（读者）解锁：合并而不是覆盖，使下一个独占获取者能观察到
    /// 在它之前释放的所有读者。
    pub fn merge_release_clock(&self, clock: &VectorClock) {
        store_join(&mut self.inner.lock().release, clock);
    }

    pub fn release_clock(&self) -> Option<VectorClock> {
        self.inner.lock().release.clone()
    }

    /// Acquire: join the last release clock into `clock`.
    /// Returns false when the object was never released.
    ///
    /// 获取：将最近的释放时钟合并进 `clock`。对象从未被释放时返回 false。
    pub fn acquire_into(&self, clock: &mut VectorClock) -> bool {
        join_into(&self.inner.lock().release, clock)
    }

    // --- channel ---

    pub fn set_send_clock(&self, clock: &VectorClock) {
        store_copy(&mut self.inner.lock().channel().send, clock);
    }

    pub fn send_clock(&self) -> Option<VectorClock> {
        let inner = self.inner.lock();
        inner.channel.as_ref().and_then(|ch| ch.send.clone())
    }

    pub fn join_send_into(&self, clock: &mut VectorClock) -> bool {
        let inner = self.inner.lock();
        inner.channel.as_ref().is_some_and(|ch| join_into(&ch.send, clock))
    }

    pub fn set_recv_clock(&self, clock: &VectorClock) {
        store_copy(&mut self.inner.lock().channel().recv, clock);
    }

    pub fn recv_clock(&self) -> Option<VectorClock> {
        let inner = self.inner.lock();
        inner.channel.as_ref().and_then(|ch| ch.recv.clone())
    }

    pub fn join_recv_into(&self, clock: &mut VectorClock) -> bool {
        let inner = self.inner.lock();
        inner.channel.as_ref().is_some_and(|ch| join_into(&ch.recv, clock))
    }

    /// Record a close. Only the first call takes effect; later calls return
    /// false and leave the stored clock untouched.
    ///
    /// 记录一次关闭。只有第一次调用生效；之后的调用返回 false，且不改变已存储的时钟。
    pub fn set_close_clock(&self, clock: &VectorClock) -> bool {
        let mut inner = self.inner.lock();
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        inner.channel().close = Some(clock.clone());
        self.closed.store(true, Ordering::Release);
        true
    }

    pub fn close_clock(&self) -> Option<VectorClock> {
        let inner = self.inner.lock();
        inner.channel.as_ref().and_then(|ch| ch.close.clone())
    }

    pub fn join_close_into(&self, clock: &mut VectorClock) -> bool {
        let inner = self.inner.lock();
        inner.channel.as_ref().is_some_and(|ch| join_into(&ch.close, clock))
    }

    /// Whether the channel has been closed. Lock-free.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // --- countdown barrier ---

    /// Adjust the counter by `delta` and return the new value.
    ///
    /// The counter is diagnostic only: a negative value means more
    /// completions than additions and is logged, nothing else changes.
    ///
    /// 将计数器调整 `delta` 并返回新值。计数器仅用于诊断：负值表示完成次数多于
    /// 增加次数，会被记录日志，除此之外不影响任何行为。
    pub fn add(&self, delta: i64) -> i64 {
        let counter = {
            let mut inner = self.inner.lock();
            let barrier = inner.barrier();
            barrier.counter = barrier.counter.saturating_add(delta);
            barrier.counter
        };
        warn_negative(counter, delta);
        counter
    }

    /// Accumulate a completion: join `clock` into the done clock.
    /// 累积一次完成：将 `clock` 合并进完成时钟。
    pub fn merge_done_clock(&self, clock: &VectorClock) {
        store_join(&mut self.inner.lock().barrier().done, clock);
    }

    /// A participant finished: merge its clock and count down by one, as a
    /// single step. Returns the new counter.
    ///
    /// 一个参与者完成：在同一次加锁内合并其时钟并将计数减一。返回新的计数。
    pub fn done(&self, clock: &VectorClock) -> i64 {
        let counter = {
            let mut inner = self.inner.lock();
            let barrier = inner.barrier();
            store_join(&mut barrier.done, clock);
            barrier.counter = barrier.counter.saturating_sub(1);
            barrier.counter
        };
        warn_negative(counter, -1);
        counter
    }

    pub fn done_clock(&self) -> Option<VectorClock> {
        let inner = self.inner.lock();
        inner.barrier.as_ref().and_then(|b| b.done.clone())
    }

    /// Wait completed: join every accumulated completion into `clock`.
    pub fn join_done_into(&self, clock: &mut VectorClock) -> bool {
        let inner = self.inner.lock();
        inner.barrier.as_ref().is_some_and(|b| join_into(&b.done, clock))
    }

    pub fn barrier_counter(&self) -> i64 {
        let inner = self.inner.lock();
        inner.barrier.as_ref().map_or(0, |b| b.counter)
    }

    /// Counter and done clock read together.
    pub fn barrier_state(&self) -> (i64, Option<VectorClock>) {
        let inner = self.inner.lock();
        inner.barrier.as_ref().map_or((0, None), |b| (b.counter, b.done.clone()))
    }

    pub(crate) fn has_lock_state(&self) -> bool {
        self.inner.lock().release.is_some()
    }

    pub(crate) fn has_channel_state(&self) -> bool {
        self.inner.lock().channel.is_some()
    }

    pub(crate) fn has_barrier_state(&self) -> bool {
        self.inner.lock().barrier.is_some()
    }
}
