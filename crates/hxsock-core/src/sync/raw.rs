/// 锁原语的统一抽象。
///
/// # 教案式说明
/// - **意图 (Why)**：对象池、连接表等共享资源只依赖这三个操作，锁的具体策略由构造方注入；
/// - **契约 (What)**：
///   - `lock`：阻塞或忙等直到获得锁；
///   - `try_lock`：立即返回，`true` 表示已获得锁；
///   - `unlock`：释放锁，调用方必须是当前持有者；
/// - **风险 (Trade-offs)**：`unlock` 设计为 `unsafe`，日常代码应通过
///   [`ScopedLock`](super::ScopedLock) 间接调用，避免遗漏或重复释放。
pub trait RawLock {
    fn lock(&self);

    fn try_lock(&self) -> bool;

    /// 释放锁。
    ///
    /// # Safety
    /// 调用线程必须持有该锁（通过 `lock` 或成功的 `try_lock` 获得），且每次获取只释放一次。
    unsafe fn unlock(&self);
}

/// 标记同一时刻至多一个持有者的锁（不可重入、不可空转）。
///
/// # Safety
/// 实现者必须保证：`lock`/`try_lock` 成功返回后，直到对应 `unlock` 之前，
/// 任何线程（包括当前线程）都无法再次获得该锁。
pub unsafe trait ExclusiveLock: RawLock {}
