use core::cell::Cell;
use core::marker::PhantomData;

use super::raw::RawLock;

/// 空锁：所有操作立即成功。
///
/// - **意图 (Why)**：调用方已在构造层面保证单线程独占（例如线程私有的对象池）时，省去原子操作；
/// - **契约 (What)**：类型不实现 `Sync`，编译器会拒绝把受其保护的资源共享到其他线程；
///   可以 `Send`，即整体移交给另一线程独占。
#[derive(Debug, Default)]
pub struct NoopLock {
    _not_sync: PhantomData<Cell<()>>,
}

impl NoopLock {
    pub const fn new() -> Self {
        Self {
            _not_sync: PhantomData,
        }
    }
}

impl RawLock for NoopLock {
    #[inline]
    fn lock(&self) {}

    #[inline]
    fn try_lock(&self) -> bool {
        true
    }

    #[inline]
    unsafe fn unlock(&self) {}
}
