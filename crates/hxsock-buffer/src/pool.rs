use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use hxsock_core::PoolConfig;
use hxsock_core::sync::{RawLock, ScopedLock, SpinLock};
use tracing::trace;

use crate::arena::Arena;
use crate::chunk::BufferChunk;
use crate::error::BufferError;

/// 可被对象池复用的类型。
///
/// `reset` 只复位逻辑状态（偏移量、计数、队列），不释放后备存储。
pub trait Poolable {
    fn reset(&mut self);
}

type Factory<T> = Box<dyn Fn() -> Result<T, BufferError> + Send + Sync>;

/// 以缓冲块为元素的对象池。
pub type ChunkPool<L = SpinLock> = ObjectPool<BufferChunk, L>;

struct Idle<T> {
    object: T,
    /// `None` 表示预建对象，从未出借过，无需冷却。
    released_at: Option<Instant>,
}

impl<T> Idle<T> {
    fn is_ready(&self, lock_time: Duration) -> bool {
        self.released_at
            .is_none_or(|released_at| released_at.elapsed() >= lock_time)
    }
}

/// 通用自由链表回收器。
///
/// # 教案式说明
/// - **意图 (Why)**：缓冲块与连接记录的创建成本远高于复位成本；池在两次使用之间保留对象，
///   并用三个参数约束保留规模：
///   - `pool_size`：[`prepare`](Self::prepare) 预建的常备对象数；
///   - `hold`：自由链表长度上限，超出的盈余对象直接销毁（缓冲块的存储因此归还竞技场）；
///   - `lock_time`：对象归还后的冷却期，冷却期内不再出借，隔离仍引用旧对象的在途异步完成；
/// - **逻辑 (How)**：
///   - 自由链表为先进先出的 `VecDeque`，每个元素带归还时间戳；队首即最早归还者，
///     既是最先解除冷却的复用候选，也是最先被淘汰的盈余对象；
///   - 自由链表是唯一的共享可变状态，由泛型参数 `L` 指定的锁保护；
///     持锁区段只做队列搬运，复位、创建与销毁都在锁外完成；
///   - 统计计数使用 `Relaxed` 原子量，只作观测用途；
/// - **契约 (What)**：
///   - `acquire` 转移所有权给调用方，同一对象要么在某个调用方手中，要么在自由链表中，二者不可兼得；
///   - `L: Sync` 时池可跨线程共享；`NoopLock` 不实现 `Sync`，此时池只能单线程使用；
/// - **风险 (Trade-offs)**：冷却期内的未命中会创建新对象，`lock_time` 设置过大时池的复用率会下降。
pub struct ObjectPool<T, L: RawLock = SpinLock> {
    config: PoolConfig,
    lock: L,
    free: UnsafeCell<VecDeque<Idle<T>>>,
    factory: Factory<T>,
    metrics: PoolMetrics,
}

// SAFETY: `free` 只在 `with_free` 的持锁区段内访问；持锁区段不会回调外部代码，
// 因此即使 `L` 为可重入锁也不会出现同一线程对队列的嵌套可变借用。
unsafe impl<T: Send, L: RawLock + Sync> Sync for ObjectPool<T, L> {}

/// 对象池统计快照。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PoolStats {
    /// 自由链表当前长度。
    pub free: usize,
    /// 累计创建对象数（含预建）。
    pub created: u64,
    /// 累计销毁的盈余对象数。
    pub destroyed: u64,
    pub acquired: u64,
    pub released: u64,
    /// 出借时命中自由链表的次数。
    pub hits: u64,
    /// 出借时未命中（链表为空或仍在冷却期）的次数。
    pub misses: u64,
    /// 当前在调用方手中的对象数。
    pub outstanding: u64,
}

#[derive(Default)]
struct PoolMetrics {
    created: AtomicU64,
    destroyed: AtomicU64,
    acquired: AtomicU64,
    released: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: Poolable, L: RawLock> ObjectPool<T, L> {
    pub fn new<F>(config: PoolConfig, lock: L, factory: F) -> Self
    where
        F: Fn() -> Result<T, BufferError> + Send + Sync + 'static,
    {
        Self {
            config,
            lock,
            free: UnsafeCell::new(VecDeque::with_capacity(config.pool_size)),
            factory: Box::new(factory),
            metrics: PoolMetrics::default(),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn lock(&self) -> &L {
        &self.lock
    }

    /// 预建对象，直到自由链表达到 `pool_size`。预建对象不受冷却期约束。
    pub fn prepare(&self) -> Result<(), BufferError> {
        let missing = self.config.pool_size.saturating_sub(self.free_len());
        for _ in 0..missing {
            let object = (self.factory)()?;
            self.metrics.created.fetch_add(1, Ordering::Relaxed);
            self.with_free(|free| {
                free.push_back(Idle {
                    object,
                    released_at: None,
                })
            });
        }
        Ok(())
    }

    /// 出借一个对象：优先复用已解除冷却的空闲对象，否则创建新对象。
    pub fn acquire(&self) -> Result<T, BufferError> {
        let lock_time = self.config.lock_time();
        let reused = self.with_free(|free| {
            let ready = free.front().is_some_and(|idle| idle.is_ready(lock_time));
            if ready {
                free.pop_front().map(|idle| idle.object)
            } else {
                None
            }
        });

        let object = match reused {
            Some(object) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                object
            }
            None => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                let object = (self.factory)()?;
                self.metrics.created.fetch_add(1, Ordering::Relaxed);
                object
            }
        };
        self.metrics.acquired.fetch_add(1, Ordering::Relaxed);
        Ok(object)
    }

    /// 归还对象：复位后入队；若队列超过 `hold`，淘汰队首的最旧对象。
    pub fn release(&self, mut object: T) {
        object.reset();
        self.metrics.released.fetch_add(1, Ordering::Relaxed);
        let hold = self.config.hold;
        let surplus = self.with_free(|free| {
            free.push_back(Idle {
                object,
                released_at: Some(Instant::now()),
            });
            if free.len() > hold {
                free.pop_front().map(|idle| idle.object)
            } else {
                None
            }
        });
        if let Some(surplus) = surplus {
            self.metrics.destroyed.fetch_add(1, Ordering::Relaxed);
            trace!(hold, "pool above hold threshold, releasing surplus object");
            drop(surplus);
        }
    }

    /// 清空自由链表，返回销毁的对象数。
    pub fn clear(&self) -> usize {
        let drained: Vec<Idle<T>> = self.with_free(|free| free.drain(..).collect());
        let count = drained.len();
        self.metrics
            .destroyed
            .fetch_add(count as u64, Ordering::Relaxed);
        drop(drained);
        count
    }

    pub fn free_len(&self) -> usize {
        self.with_free(|free| free.len())
    }

    pub fn stats(&self) -> PoolStats {
        let m = &self.metrics;
        let acquired = m.acquired.load(Ordering::Relaxed);
        let released = m.released.load(Ordering::Relaxed);
        PoolStats {
            free: self.free_len(),
            created: m.created.load(Ordering::Relaxed),
            destroyed: m.destroyed.load(Ordering::Relaxed),
            acquired,
            released,
            hits: m.hits.load(Ordering::Relaxed),
            misses: m.misses.load(Ordering::Relaxed),
            outstanding: acquired.saturating_sub(released),
        }
    }

    fn with_free<R>(&self, f: impl FnOnce(&mut VecDeque<Idle<T>>) -> R) -> R {
        let _guard = ScopedLock::new(&self.lock);
        // SAFETY: 持锁期间独占访问自由链表，闭包均为本模块内部的队列操作，不会重入。
        f(unsafe { &mut *self.free.get() })
    }
}

impl<L: RawLock> ObjectPool<BufferChunk, L> {
    /// 构造缓冲块池：未命中时向 `arena` 申请 `chunk_capacity` 字节。
    pub fn for_chunks(arena: Arena, chunk_capacity: usize, config: PoolConfig, lock: L) -> Self {
        ObjectPool::new(config, lock, move || {
            arena.allocate(chunk_capacity).map(BufferChunk::new)
        })
    }
}

impl<T, L: RawLock> fmt::Debug for ObjectPool<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
