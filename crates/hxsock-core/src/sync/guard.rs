use core::marker::PhantomData;

use super::raw::RawLock;

/// 作用域锁守卫：构造时加锁，离开作用域（含提前返回与 panic 展开）时解锁。
///
/// 守卫不实现 `Send`，保证解锁发生在加锁的线程上，这对可重入锁的持有者判定是必要的。
#[must_use = "守卫被立即丢弃会导致锁随即释放"]
pub struct ScopedLock<'a, L: RawLock + ?Sized> {
    lock: &'a L,
    _not_send: PhantomData<*const ()>,
}

impl<'a, L: RawLock + ?Sized> ScopedLock<'a, L> {
    pub fn new(lock: &'a L) -> Self {
        lock.lock();
        Self {
            lock,
            _not_send: PhantomData,
        }
    }

    /// 接管一把已经由当前线程持有的锁，析构时负责释放。
    ///
    /// # Safety
    /// 调用前当前线程必须已通过 `lock`/`try_lock` 获得该锁，且没有其他守卫负责释放它。
    pub unsafe fn adopt(lock: &'a L) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }
}

impl<L: RawLock + ?Sized> Drop for ScopedLock<'_, L> {
    fn drop(&mut self) {
        // SAFETY: 构造时已成功加锁，且守卫只会析构一次。
        unsafe { self.lock.unlock() }
    }
}

/// 尝试加锁的作用域守卫。
///
/// - **契约 (What)**：构造时调用一次 `try_lock`；[`is_locked`](Self::is_locked) 报告结果；
///   仅在确实获得锁时于析构阶段释放。
#[must_use = "守卫被立即丢弃会导致锁随即释放"]
pub struct ScopedTryLock<'a, L: RawLock + ?Sized> {
    lock: &'a L,
    locked: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'a, L: RawLock + ?Sized> ScopedTryLock<'a, L> {
    pub fn new(lock: &'a L) -> Self {
        let locked = lock.try_lock();
        Self {
            lock,
            locked,
            _not_send: PhantomData,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

impl<L: RawLock + ?Sized> Drop for ScopedTryLock<'_, L> {
    fn drop(&mut self) {
        if self.locked {
            // SAFETY: `locked == true` 表示 `try_lock` 成功，当前线程是持有者。
            unsafe { self.lock.unlock() }
        }
    }
}
