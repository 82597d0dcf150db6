use core::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RawMutex;
use parking_lot::lock_api::RawMutex as _;

use super::raw::{ExclusiveLock, RawLock};

/// 阻塞式临界区，获取前可先自旋若干次。
///
/// # 教案式说明
/// - **意图 (Why)**：持有时间不可预测的区段（例如包含回调的连接处理）若用纯自旋，
///   会让等待线程长时间空转；临界区在竞争时挂起线程，把 CPU 让给其他工作线程；
/// - **逻辑 (How)**：底层为 `parking_lot::RawMutex`；`spin_count > 0` 时先以
///   `try_lock` + CPU 暂停指令尝试 `spin_count` 次，仍失败再进入阻塞等待；
/// - **契约 (What)**：不可重入，同线程重复获取会死锁；`spin_count` 默认 0，可随时调整。
pub struct CriticalSection {
    raw: RawMutex,
    spin_count: AtomicU32,
}

impl CriticalSection {
    pub const fn new() -> Self {
        Self::with_spin_count(0)
    }

    pub const fn with_spin_count(spin_count: u32) -> Self {
        Self {
            raw: RawMutex::INIT,
            spin_count: AtomicU32::new(spin_count),
        }
    }

    pub fn spin_count(&self) -> u32 {
        self.spin_count.load(Ordering::Relaxed)
    }

    pub fn set_spin_count(&self, spin_count: u32) {
        self.spin_count.store(spin_count, Ordering::Relaxed);
    }

    /// 当前是否被任意线程持有（仅用于诊断，结果可能立即过期）。
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }
}

impl Default for CriticalSection {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for CriticalSection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CriticalSection")
            .field("spin_count", &self.spin_count())
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl RawLock for CriticalSection {
    fn lock(&self) {
        for _ in 0..self.spin_count() {
            if self.raw.try_lock() {
                return;
            }
            core::hint::spin_loop();
        }
        self.raw.lock();
    }

    fn try_lock(&self) -> bool {
        self.raw.try_lock()
    }

    unsafe fn unlock(&self) {
        // SAFETY: 调用方保证当前线程持有锁。
        unsafe { self.raw.unlock() }
    }
}

// SAFETY: `parking_lot::RawMutex` 为不可重入互斥锁。
unsafe impl ExclusiveLock for CriticalSection {}
