use core::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use super::raw::{ExclusiveLock, RawLock};

/// 每自旋 64 次让出一次时间片。
const YIELD_MASK: u32 = 63;
/// 每自旋 4096 次短暂休眠一次。
const SLEEP_MASK: u32 = 4095;
const SLEEP_INTERVAL: Duration = Duration::from_micros(50);

/// 自旋等待的逐级退让。
///
/// - 每次调用都执行 CPU 暂停提示；
/// - `spins` 的低 6 位全为 1 时让出时间片；
/// - 低 12 位全为 1 时休眠 50µs，防止在超订核心上与持有者互相饿死。
#[inline]
pub fn yield_thread(spins: u32) {
    if spins & SLEEP_MASK == SLEEP_MASK {
        thread::sleep(SLEEP_INTERVAL);
    } else if spins & YIELD_MASK == YIELD_MASK {
        thread::yield_now();
    } else {
        core::hint::spin_loop();
    }
}

/// 基于原子标志位的用户态自旋锁。
///
/// # 教案式说明
/// - **意图 (Why)**：对象池自由链表等区段只做几次指针搬运，挂起线程的代价远高于等待；
/// - **逻辑 (How)**：先以 `Relaxed` 读观察标志位，空闲时再 `compare_exchange_weak`
///   抢占（test-and-test-and-set），失败时按 [`yield_thread`] 退让；
/// - **契约 (What)**：不可重入，同线程二次获取将永久自旋；从不阻塞线程。
#[derive(Debug, Default)]
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl RawLock for SpinLock {
    fn lock(&self) {
        let mut spins: u32 = 0;
        loop {
            if !self.locked.load(Ordering::Relaxed)
                && self
                    .locked
                    .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return;
            }
            yield_thread(spins);
            spins = spins.wrapping_add(1);
        }
    }

    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

// SAFETY: 标志位 CAS 保证同一时刻只有一个持有者，且不区分线程，同线程无法重入。
unsafe impl ExclusiveLock for SpinLock {}
