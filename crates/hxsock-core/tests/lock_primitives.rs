//! 锁原语并发测试。
//!
//! # 教案级导览
//!
//! - **Why**：对象池自由链表与连接处理路径依赖这些锁保证互斥；一旦互斥失效，
//!   表现为计数丢失或同一对象被两个持有者同时使用，且极难在线上复现。
//! - **How**：每个测试派生多个 `std::thread`，在锁保护下对非原子计数做“读-改-写”，
//!   结束后断言计数精确等于总迭代次数。
//! - **What**：覆盖临界区（含自旋阶段）、自旋锁、可重入自旋锁、可重入阻塞锁、策略锁与 `Locked` 容器。

use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use hxsock_core::sync::{
    CriticalSection, LockPolicy, Locked, NoopLock, PolicyLock, RawLock, ReentrantCriticalSection,
    ReentrantSpinLock, ScopedLock, ScopedTryLock, SpinLock,
};

const THREADS: usize = 4;
const ITERATIONS: usize = 2_000;

/// 由外部锁保护的非原子计数器。
struct Counter<L> {
    lock: L,
    value: UnsafeCell<usize>,
}

// SAFETY: 测试中对 `value` 的访问全部发生在持锁区段内。
unsafe impl<L: RawLock + Sync> Sync for Counter<L> {}

fn hammer<L: RawLock + Send + Sync + 'static>(lock: L) -> usize {
    let counter = Arc::new(Counter {
        lock,
        value: UnsafeCell::new(0),
    });
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                for _ in 0..ITERATIONS {
                    let _guard = ScopedLock::new(&counter.lock);
                    // SAFETY: 持锁期间独占访问。
                    unsafe {
                        let slot = &mut *counter.value.get();
                        let current = *slot;
                        thread::yield_now();
                        *slot = current + 1;
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("工作线程不应 panic");
    }
    let _guard = ScopedLock::new(&counter.lock);
    // SAFETY: 所有工作线程已退出，且当前持锁。
    unsafe { *counter.value.get() }
}

#[test]
fn critical_section_serializes_increments() {
    assert_eq!(hammer(CriticalSection::new()), THREADS * ITERATIONS);
}

#[test]
fn critical_section_with_spin_phase_serializes_increments() {
    let lock = CriticalSection::with_spin_count(4_000);
    assert_eq!(lock.spin_count(), 4_000);
    assert_eq!(hammer(lock), THREADS * ITERATIONS);
}

#[test]
fn spin_lock_serializes_increments() {
    assert_eq!(hammer(SpinLock::new()), THREADS * ITERATIONS);
}

#[test]
fn reentrant_spin_lock_serializes_increments() {
    assert_eq!(hammer(ReentrantSpinLock::new()), THREADS * ITERATIONS);
}

#[test]
fn reentrant_critical_section_serializes_increments() {
    assert_eq!(
        hammer(ReentrantCriticalSection::with_spin_count(32)),
        THREADS * ITERATIONS
    );
}

/// 可重入阻塞锁：持有者嵌套获取不自锁，竞争线程挂起直到最外层释放。
#[test]
fn reentrant_critical_section_blocks_contenders_until_outermost_release() {
    let lock = Arc::new(ReentrantCriticalSection::new());
    let outer = ScopedLock::new(&*lock);
    let inner = ScopedLock::new(&*lock);
    assert_eq!(lock.depth(), 2);

    let acquired = Arc::new(AtomicBool::new(false));
    let (started_tx, started_rx) = mpsc::channel();
    let contender = thread::spawn({
        let lock = Arc::clone(&lock);
        let acquired = Arc::clone(&acquired);
        move || {
            started_tx.send(()).expect("通知失败");
            let _guard = ScopedLock::new(&*lock);
            assert!(lock.is_held_by_current_thread());
            acquired.store(true, Ordering::SeqCst);
        }
    });
    started_rx.recv().expect("竞争线程未启动");
    thread::sleep(Duration::from_millis(50));
    assert!(!acquired.load(Ordering::SeqCst), "持有期间竞争者不得进入");

    drop(inner);
    thread::sleep(Duration::from_millis(20));
    assert!(!acquired.load(Ordering::SeqCst), "内层释放后仍由本线程持有");
    assert!(lock.is_held_by_current_thread());

    drop(outer);
    contender.join().expect("竞争线程不应 panic");
    assert!(acquired.load(Ordering::SeqCst));
    assert!(!lock.is_held_by_current_thread());
}

#[test]
fn policy_lock_serializes_increments_for_every_policy() {
    for policy in [
        LockPolicy::CriticalSection,
        LockPolicy::Spin,
        LockPolicy::ReentrantSpin,
    ] {
        let lock = PolicyLock::new(policy);
        assert_eq!(lock.policy(), policy);
        assert_eq!(hammer(lock), THREADS * ITERATIONS, "策略 {policy:?} 互斥失效");
    }
}

/// 可重入锁在其他线程持有期间拒绝 `try_lock`，同线程嵌套不受影响。
#[test]
fn reentrant_lock_excludes_other_threads() {
    let lock = Arc::new(ReentrantSpinLock::new());
    let outer = ScopedLock::new(&*lock);
    let inner = ScopedLock::new(&*lock);
    assert_eq!(lock.depth(), 2);

    let remote = Arc::clone(&lock);
    let stolen = thread::spawn(move || {
        let attempt = ScopedTryLock::new(&*remote);
        attempt.is_locked()
    })
    .join()
    .expect("探测线程不应 panic");
    assert!(!stolen, "其他线程不得获得已被持有的可重入锁");

    drop(inner);
    assert!(lock.is_held_by_current_thread());
    drop(outer);
    assert!(!lock.is_held_by_current_thread());

    let remote = Arc::clone(&lock);
    let acquired = thread::spawn(move || ScopedTryLock::new(&*remote).is_locked())
        .join()
        .expect("探测线程不应 panic");
    assert!(acquired, "完全释放后其他线程应能获取");
}

#[test]
fn locked_container_guards_shared_vector() {
    let shared: Arc<Locked<Vec<usize>, SpinLock>> = Arc::new(Locked::new(Vec::new()));
    let handles: Vec<_> = (0..THREADS)
        .map(|worker| {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                for step in 0..ITERATIONS {
                    shared.lock().push(worker * ITERATIONS + step);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("工作线程不应 panic");
    }
    let mut values = shared.lock().clone();
    values.sort_unstable();
    assert_eq!(values, (0..THREADS * ITERATIONS).collect::<Vec<_>>());
}

#[test]
fn noop_lock_always_succeeds() {
    let lock = NoopLock::new();
    let first = ScopedTryLock::new(&lock);
    let second = ScopedTryLock::new(&lock);
    assert!(first.is_locked() && second.is_locked());
}
