use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use super::critical_section::CriticalSection;
use super::raw::RawLock;
use super::spin::yield_thread;

/// 线程令牌计数器，0 保留为“无持有者”。
static NEXT_THREAD_TOKEN: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static THREAD_TOKEN: usize = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

fn current_token() -> usize {
    THREAD_TOKEN.with(|token| *token)
}

/// 可重入自旋锁。
///
/// # 教案式说明
/// - **意图 (Why)**：连接的接收处理在持锁期间回调监听器，监听器可能在同一线程上再次进入
///   同一连接的处理路径（例如在回调内恢复接收）；可重入锁让这种嵌套不会自锁；
/// - **逻辑 (How)**：`owner` 记录持有线程的令牌（进程内单调分配，线程退出后不复用），
///   `depth` 记录重入深度；只有持有者会修改 `depth`，因此 `Relaxed` 即可；
///   `unlock` 递减深度，归零时以 `Release` 清空 `owner`；
/// - **契约 (What)**：`unlock` 次数必须与获取次数相等；不得跨线程释放。
#[derive(Debug, Default)]
pub struct ReentrantSpinLock {
    owner: AtomicUsize,
    depth: AtomicU32,
}

impl ReentrantSpinLock {
    pub const fn new() -> Self {
        Self {
            owner: AtomicUsize::new(0),
            depth: AtomicU32::new(0),
        }
    }

    /// 当前线程是否持有该锁。
    pub fn is_held_by_current_thread(&self) -> bool {
        self.owner.load(Ordering::Relaxed) == current_token()
    }

    /// 当前线程的重入深度；未持有时返回 0。
    pub fn depth(&self) -> u32 {
        if self.is_held_by_current_thread() {
            self.depth.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    fn try_acquire(&self, token: usize) -> bool {
        if self.owner.load(Ordering::Relaxed) == token {
            self.depth.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        if self
            .owner
            .compare_exchange(0, token, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.depth.store(1, Ordering::Relaxed);
            return true;
        }
        false
    }
}

impl RawLock for ReentrantSpinLock {
    fn lock(&self) {
        let token = current_token();
        let mut spins: u32 = 0;
        while !self.try_acquire(token) {
            yield_thread(spins);
            spins = spins.wrapping_add(1);
        }
    }

    fn try_lock(&self) -> bool {
        self.try_acquire(current_token())
    }

    unsafe fn unlock(&self) {
        debug_assert!(
            self.is_held_by_current_thread(),
            "ReentrantSpinLock released by a thread that does not own it"
        );
        if self.depth.fetch_sub(1, Ordering::Relaxed) == 1 {
            self.owner.store(0, Ordering::Release);
        }
    }
}

/// 可重入阻塞锁。
///
/// # 教案式说明
/// - **意图 (Why)**：连接串行锁在整个回调期间持有，回调耗时由使用者决定；
///   竞争者若自旋会占住异步运行时的工作线程，阻塞挂起则把 CPU 让给其他任务；
/// - **逻辑 (How)**：首次获取走内部 [`CriticalSection`]（先自旋 `spin_count` 次再挂起），
///   成功后记下持有线程令牌；同线程再次获取只递增 `depth`，不触碰内部锁；
///   深度归零时先清空 `owner` 再释放内部锁；
/// - **契约 (What)**：与 [`ReentrantSpinLock`] 相同，`unlock` 次数必须与获取次数相等且不得跨线程释放。
#[derive(Debug, Default)]
pub struct ReentrantCriticalSection {
    inner: CriticalSection,
    owner: AtomicUsize,
    depth: AtomicU32,
}

impl ReentrantCriticalSection {
    pub const fn new() -> Self {
        Self::with_spin_count(0)
    }

    /// 竞争时先自旋 `spin_count` 次再挂起。
    pub const fn with_spin_count(spin_count: u32) -> Self {
        Self {
            inner: CriticalSection::with_spin_count(spin_count),
            owner: AtomicUsize::new(0),
            depth: AtomicU32::new(0),
        }
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.owner.load(Ordering::Relaxed) == current_token()
    }

    pub fn depth(&self) -> u32 {
        if self.is_held_by_current_thread() {
            self.depth.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    fn reenter(&self, token: usize) -> bool {
        if self.owner.load(Ordering::Relaxed) == token {
            self.depth.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        false
    }

    fn take_ownership(&self, token: usize) {
        self.owner.store(token, Ordering::Relaxed);
        self.depth.store(1, Ordering::Relaxed);
    }
}

impl RawLock for ReentrantCriticalSection {
    fn lock(&self) {
        let token = current_token();
        if self.reenter(token) {
            return;
        }
        self.inner.lock();
        self.take_ownership(token);
    }

    fn try_lock(&self) -> bool {
        let token = current_token();
        if self.reenter(token) {
            return true;
        }
        if !self.inner.try_lock() {
            return false;
        }
        self.take_ownership(token);
        true
    }

    unsafe fn unlock(&self) {
        debug_assert!(
            self.is_held_by_current_thread(),
            "ReentrantCriticalSection released by a thread that does not own it"
        );
        if self.depth.fetch_sub(1, Ordering::Relaxed) == 1 {
            self.owner.store(0, Ordering::Relaxed);
            // SAFETY: 深度归零说明本线程在首次获取时持有内部锁，此处恰好释放一次。
            unsafe { self.inner.unlock() };
        }
    }
}
