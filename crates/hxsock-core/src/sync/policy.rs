use serde::{Deserialize, Serialize};

use super::critical_section::CriticalSection;
use super::raw::RawLock;
use super::reentrant::ReentrantSpinLock;
use super::spin::SpinLock;

/// 共享资源的锁策略。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    /// 阻塞式临界区。
    CriticalSection,
    /// 不可重入自旋锁。
    #[default]
    Spin,
    /// 可重入自旋锁。
    ReentrantSpin,
}

/// 运行期按 [`LockPolicy`] 选定的锁。
///
/// # 教案式说明
/// - **意图 (Why)**：对象池的锁策略来自配置文件，编译期无法确定具体类型；
///   以枚举分派代替 trait object，避免每次加锁的虚调用与堆分配；
/// - **契约 (What)**：只涵盖可跨线程共享的三种锁，空锁需在编译期通过泛型参数显式选择；
///   因包含可重入变体，本类型不实现 [`ExclusiveLock`](super::ExclusiveLock)。
#[derive(Debug)]
pub enum PolicyLock {
    CriticalSection(CriticalSection),
    Spin(SpinLock),
    ReentrantSpin(ReentrantSpinLock),
}

impl PolicyLock {
    pub fn new(policy: LockPolicy) -> Self {
        match policy {
            LockPolicy::CriticalSection => PolicyLock::CriticalSection(CriticalSection::new()),
            LockPolicy::Spin => PolicyLock::Spin(SpinLock::new()),
            LockPolicy::ReentrantSpin => PolicyLock::ReentrantSpin(ReentrantSpinLock::new()),
        }
    }

    pub fn policy(&self) -> LockPolicy {
        match self {
            PolicyLock::CriticalSection(_) => LockPolicy::CriticalSection,
            PolicyLock::Spin(_) => LockPolicy::Spin,
            PolicyLock::ReentrantSpin(_) => LockPolicy::ReentrantSpin,
        }
    }
}

impl Default for PolicyLock {
    fn default() -> Self {
        Self::new(LockPolicy::default())
    }
}

impl From<LockPolicy> for PolicyLock {
    fn from(policy: LockPolicy) -> Self {
        Self::new(policy)
    }
}

impl RawLock for PolicyLock {
    fn lock(&self) {
        match self {
            PolicyLock::CriticalSection(lock) => lock.lock(),
            PolicyLock::Spin(lock) => lock.lock(),
            PolicyLock::ReentrantSpin(lock) => lock.lock(),
        }
    }

    fn try_lock(&self) -> bool {
        match self {
            PolicyLock::CriticalSection(lock) => lock.try_lock(),
            PolicyLock::Spin(lock) => lock.try_lock(),
            PolicyLock::ReentrantSpin(lock) => lock.try_lock(),
        }
    }

    unsafe fn unlock(&self) {
        // SAFETY: 调用方保证持有关系，按变体转发。
        unsafe {
            match self {
                PolicyLock::CriticalSection(lock) => lock.unlock(),
                PolicyLock::Spin(lock) => lock.unlock(),
                PolicyLock::ReentrantSpin(lock) => lock.unlock(),
            }
        }
    }
}
