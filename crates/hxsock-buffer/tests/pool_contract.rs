//! `pool_contract` 集成测试：验证 `ObjectPool` 在并发回收与资源耗尽下的契约。
//!
//! # 测试目标（Why）
//! - 对象池的自由链表是所有连接共享的唯一可变状态，必须在多线程同时归还时保持计数精确；
//! - 超出 `hold` 的盈余对象必须销毁并把存储归还竞技场，否则内存只增不减；
//! - 竞技场耗尽应表现为一次失败的出借，而不是 panic。
//!
//! # 结构安排（How）
//! - `concurrent_release_stabilizes_at_hold`：两个线程同时归还，观察链长与竞技场字节数；
//! - `no_object_is_lent_twice`：多线程反复出借/归还带标识的对象，检测别名；
//! - `arena_exhaustion_fails_acquire`：竞技场预算耗尽时出借失败，归还后恢复。

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use hxsock_buffer::{Arena, BufferError, ChunkPool, ObjectPool, Poolable};
use hxsock_core::PoolConfig;
use hxsock_core::sync::{LockPolicy, PolicyLock, SpinLock};

/// 两个工作线程在链长已为 10 时并发归还，盈余全部销毁，链长稳定在 10。
#[test]
fn concurrent_release_stabilizes_at_hold() {
    let arena = Arena::unbounded();
    let pool = Arc::new(ChunkPool::for_chunks(
        arena.clone(),
        64,
        PoolConfig::new(10, 10, Duration::ZERO),
        SpinLock::new(),
    ));
    pool.prepare().expect("预建失败");
    assert_eq!(pool.free_len(), 10);

    let per_thread = 25;
    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let arena = arena.clone();
            let barrier = Arc::clone(&barrier);
            let chunks: Vec<_> = (0..per_thread)
                .map(|_| hxsock_buffer::BufferChunk::new(arena.allocate(64).expect("申请失败")))
                .collect();
            thread::spawn(move || {
                barrier.wait();
                for chunk in chunks {
                    pool.release(chunk);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("归还线程不应 panic");
    }

    assert_eq!(pool.free_len(), 10, "自由链表长度必须稳定在 hold");
    assert_eq!(pool.stats().destroyed, 2 * per_thread as u64);
    assert_eq!(arena.stats().live_blocks, 10, "盈余缓冲块必须归还竞技场");
}

struct Tagged {
    id: u64,
}

impl Poolable for Tagged {
    fn reset(&mut self) {}
}

/// 多线程反复出借/归还，任一时刻同一对象不会同时出现在两个持有者手中。
#[test]
fn no_object_is_lent_twice() {
    let next = Arc::new(AtomicU64::new(0));
    let factory_next = Arc::clone(&next);
    let pool = Arc::new(ObjectPool::new(
        PoolConfig::new(4, 8, Duration::ZERO),
        PolicyLock::new(LockPolicy::CriticalSection),
        move || {
            Ok(Tagged {
                id: factory_next.fetch_add(1, Ordering::Relaxed),
            })
        },
    ));
    pool.prepare().expect("预建失败");
    let in_use = Arc::new(Mutex::new(HashSet::new()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let in_use = Arc::clone(&in_use);
            thread::spawn(move || {
                for _ in 0..500 {
                    let object = pool.acquire().expect("出借失败");
                    let fresh = in_use.lock().expect("集合锁中毒").insert(object.id);
                    assert!(fresh, "对象 {} 被同时出借给两个持有者", object.id);
                    thread::yield_now();
                    in_use.lock().expect("集合锁中毒").remove(&object.id);
                    pool.release(object);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("工作线程不应 panic");
    }

    let stats = pool.stats();
    assert_eq!(stats.outstanding, 0);
    assert_eq!(stats.acquired, 2_000);
    assert!(pool.free_len() <= 8);
}

#[test]
fn arena_exhaustion_fails_acquire() {
    let arena = Arena::new(Some(128));
    let pool = ChunkPool::for_chunks(
        arena.clone(),
        64,
        PoolConfig::new(0, 4, Duration::ZERO),
        SpinLock::new(),
    );
    let first = pool.acquire().expect("预算内出借必须成功");
    let second = pool.acquire().expect("预算内出借必须成功");
    let err = pool.acquire().expect_err("预算耗尽时出借必须失败");
    assert!(matches!(err, BufferError::ArenaExhausted { requested: 64, .. }));
    assert_eq!(err.code(), "hxsock.buffer.arena_exhausted");

    pool.release(first);
    let reused = pool.acquire().expect("归还后应能复用");
    assert_eq!(arena.stats().live_blocks, 2);
    drop((second, reused));
}
