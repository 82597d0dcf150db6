use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};

use super::critical_section::CriticalSection;
use super::guard::ScopedLock;
use super::raw::ExclusiveLock;

/// 以排他锁保护的数据容器。
///
/// # 教案式说明
/// - **意图 (Why)**：把“锁 + 被保护数据”绑定成一个类型，避免出现持有 A 锁却修改 B 数据的失误；
/// - **逻辑 (How)**：数据存放在 `UnsafeCell` 中，[`lock`](Self::lock) 返回的守卫内含
///   [`ScopedLock`]，守卫存活期间可获得 `&mut T`；
/// - **契约 (What)**：
///   - `L` 必须实现 [`ExclusiveLock`]，可重入锁与空锁不满足 `&mut` 独占前提，因而被类型系统拒绝；
///   - `T: Send` 且 `L: Sync` 时容器为 `Sync`。
pub struct Locked<T, L = CriticalSection> {
    lock: L,
    data: UnsafeCell<T>,
}

// SAFETY: 对 `data` 的访问全部经由排他锁串行化，`T: Send` 保证值可在持锁线程间移交。
unsafe impl<T: Send, L: ExclusiveLock + Sync> Sync for Locked<T, L> {}

impl<T, L: ExclusiveLock> Locked<T, L> {
    pub fn with_lock(data: T, lock: L) -> Self {
        Self {
            lock,
            data: UnsafeCell::new(data),
        }
    }

    pub fn lock(&self) -> LockedGuard<'_, T, L> {
        let guard = ScopedLock::new(&self.lock);
        LockedGuard {
            _guard: guard,
            data: &self.data,
        }
    }

    pub fn try_lock(&self) -> Option<LockedGuard<'_, T, L>> {
        if !self.lock.try_lock() {
            return None;
        }
        // SAFETY: 上一行已获得锁，ScopedLock 析构时负责释放；这里不再重复加锁。
        let guard = unsafe { ScopedLock::adopt(&self.lock) };
        Some(LockedGuard {
            _guard: guard,
            data: &self.data,
        })
    }

    /// 独占借用时无需加锁。
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    pub fn raw(&self) -> &L {
        &self.lock
    }
}

impl<T, L: ExclusiveLock + Default> Locked<T, L> {
    pub fn new(data: T) -> Self {
        Self::with_lock(data, L::default())
    }
}

impl<T, L> fmt::Debug for Locked<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locked").finish_non_exhaustive()
    }
}

/// [`Locked`] 的访问守卫。
pub struct LockedGuard<'a, T, L: ExclusiveLock> {
    _guard: ScopedLock<'a, L>,
    data: &'a UnsafeCell<T>,
}

impl<T, L: ExclusiveLock> Deref for LockedGuard<'_, T, L> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: 守卫存活期间锁被当前线程独占持有。
        unsafe { &*self.data.get() }
    }
}

impl<T, L: ExclusiveLock> DerefMut for LockedGuard<'_, T, L> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: 同上，且 `&mut self` 保证守卫本身没有其他借用。
        unsafe { &mut *self.data.get() }
    }
}
