use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use hxsock_core::sync::{CriticalSection, Locked, ReentrantCriticalSection};

use crate::engine::SocketEngine;
use crate::error::EngineError;
use crate::id::ConnId;
use crate::record::ConnectionRecord;
use crate::transport::{Origin, TransportHandle};

/// 记录锁进入阻塞前的自旋次数；持锁区段只做链表搬运，通常在自旋阶段即可拿到锁。
const RECORD_LOCK_SPINS: u32 = 64;

/// 连接表中的一个槽位。
///
/// # 教案式说明
/// - **意图 (Why)**：把“谁在用这条连接”与“连接的数据”分开管理：
///   连接表持有槽位的 `Arc`，在途 I/O 持有 [`IoGuard`]，记录本身只在全部引用退出后才回收；
/// - **逻辑 (How)**：
///   - `serial`：可重入阻塞锁，串行化同一连接的拆包与回调，监听器在回调内重入引擎不会自锁；
///     回调可能耗时，竞争线程挂起等待而不是自旋占用运行时工作线程；
///   - `record`：数据锁，只在搬运字节、改状态时短暂持有，回调期间不持有；
///   - `pending_io` + `closing` + `finalized`：延迟回收三件套，`closing` 置位后拒绝新的 I/O，
///     计数归零时由最后一个离开者触发回收，`finalized` 保证回收只执行一次；
/// - **契约 (What)**：锁顺序固定为先 `serial` 后 `record`，持有 `record` 时不得调用监听器或传输句柄。
pub(crate) struct ConnectionSlot {
    pub(crate) id: ConnId,
    pub(crate) origin: Origin,
    pub(crate) serial: ReentrantCriticalSection,
    pub(crate) record: Locked<Option<ConnectionRecord>, CriticalSection>,
    pub(crate) handle: Arc<dyn TransportHandle>,
    pending_io: AtomicUsize,
    closing: AtomicBool,
    finalized: AtomicBool,
}

impl ConnectionSlot {
    pub(crate) fn new(
        id: ConnId,
        origin: Origin,
        record: ConnectionRecord,
        handle: Arc<dyn TransportHandle>,
    ) -> Self {
        Self {
            id,
            origin,
            serial: ReentrantCriticalSection::with_spin_count(RECORD_LOCK_SPINS),
            record: Locked::with_lock(
                Some(record),
                CriticalSection::with_spin_count(RECORD_LOCK_SPINS),
            ),
            handle,
            pending_io: AtomicUsize::new(0),
            closing: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
        }
    }

    /// 登记一次在途 I/O；连接已进入关闭流程时撤销登记并返回 `false`。
    pub(crate) fn enter(&self) -> bool {
        self.pending_io.fetch_add(1, Ordering::SeqCst);
        if self.closing.load(Ordering::SeqCst) {
            self.pending_io.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// 无条件登记，关闭流程自身使用。
    pub(crate) fn enter_unchecked(&self) {
        self.pending_io.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn leave(&self) {
        self.pending_io.fetch_sub(1, Ordering::SeqCst);
    }

    /// 标记关闭；返回 `true` 表示本次调用是第一个关闭者。
    pub(crate) fn mark_closing(&self) -> bool {
        !self.closing.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    pub(crate) fn pending_io(&self) -> usize {
        self.pending_io.load(Ordering::SeqCst)
    }

    /// 满足回收条件且尚未回收时返回 `true`，并保证此后不会再次返回 `true`。
    pub(crate) fn claim_finalize(&self) -> bool {
        self.is_closing() && self.pending_io() == 0 && !self.finalized.swap(true, Ordering::SeqCst)
    }
}

impl fmt::Debug for ConnectionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSlot")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("pending_io", &self.pending_io())
            .field("closing", &self.is_closing())
            .finish_non_exhaustive()
    }
}

/// 在途 I/O 守卫。
///
/// 传输层在投递读写前通过 [`SocketEngine::begin_io`] 取得守卫，完成后析构。
/// 守卫存活期间连接记录与缓冲不会被回收，即使连接已经进入 `Closing`；
/// 最后一个守卫析构时若连接已在关闭流程中，由它完成回收。
pub struct IoGuard {
    engine: SocketEngine,
    slot: Arc<ConnectionSlot>,
}

impl IoGuard {
    /// 调用方需已通过 [`ConnectionSlot::enter`] 或 `enter_unchecked` 登记。
    pub(crate) fn adopt(engine: SocketEngine, slot: Arc<ConnectionSlot>) -> Self {
        Self { engine, slot }
    }

    pub fn id(&self) -> ConnId {
        self.slot.id
    }

    /// 连接是否已进入关闭流程。
    pub fn is_closing(&self) -> bool {
        self.slot.is_closing()
    }

    /// 与 [`SocketEngine::take_send`] 相同，但在连接移出连接表后仍可用，直到守卫析构。
    pub fn take_send(&self, dest: &mut [u8]) -> Result<usize, EngineError> {
        self.engine.take_send_from(&self.slot, dest)
    }
}

impl Drop for IoGuard {
    fn drop(&mut self) {
        self.slot.leave();
        self.engine.try_finalize(&self.slot);
    }
}

impl fmt::Debug for IoGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoGuard").field("id", &self.slot.id).finish()
    }
}
