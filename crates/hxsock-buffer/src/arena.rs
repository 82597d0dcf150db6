use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::error::BufferError;

/// 缓冲块的后备存储来源。
///
/// # 教案式说明
/// - **意图 (Why)**：把缓冲内存的“预算”与“去向”集中到一个对象上：对象池在未命中时向竞技场申请，
///   超出 `hold` 的盈余对象销毁时存储自动归还竞技场；配合池化，稳态收发不再触达分配器；
/// - **逻辑 (How)**：`allocate` 先以 `fetch_update` 预占字节预算，超过上限则失败；
///   成功后返回 [`ArenaBlock`]，其 `Drop` 负责回退预算与计数；
/// - **契约 (What)**：
///   - 句柄可 `Clone`，所有克隆共享同一份统计；
///   - `limit == None` 表示不设预算；
///   - 申请失败返回 [`BufferError::ArenaExhausted`]，不会 panic。
#[derive(Clone)]
pub struct Arena {
    shared: Arc<ArenaShared>,
}

struct ArenaShared {
    limit: Option<usize>,
    live_blocks: AtomicUsize,
    live_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
    allocations: AtomicU64,
    releases: AtomicU64,
    failures: AtomicU64,
}

/// 竞技场统计快照。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ArenaStats {
    pub limit: Option<usize>,
    pub live_blocks: usize,
    pub live_bytes: usize,
    pub peak_bytes: usize,
    pub allocations: u64,
    pub releases: u64,
    pub failures: u64,
}

impl Arena {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            shared: Arc::new(ArenaShared {
                limit,
                live_blocks: AtomicUsize::new(0),
                live_bytes: AtomicUsize::new(0),
                peak_bytes: AtomicUsize::new(0),
                allocations: AtomicU64::new(0),
                releases: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn limit(&self) -> Option<usize> {
        self.shared.limit
    }

    /// 申请 `len` 字节的零初始化存储。
    pub fn allocate(&self, len: usize) -> Result<ArenaBlock, BufferError> {
        let limit = self.shared.limit;
        let reserved =
            self.shared
                .live_bytes
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    let next = current.checked_add(len)?;
                    match limit {
                        Some(limit) if next > limit => None,
                        _ => Some(next),
                    }
                });
        let previous = match reserved {
            Ok(previous) => previous,
            Err(in_use) => {
                self.shared.failures.fetch_add(1, Ordering::Relaxed);
                return Err(BufferError::ArenaExhausted {
                    requested: len,
                    in_use,
                    limit: limit.unwrap_or(usize::MAX),
                });
            }
        };
        self.shared
            .peak_bytes
            .fetch_max(previous + len, Ordering::Relaxed);
        self.shared.live_blocks.fetch_add(1, Ordering::Relaxed);
        self.shared.allocations.fetch_add(1, Ordering::Relaxed);
        Ok(ArenaBlock {
            bytes: vec![0u8; len].into_boxed_slice(),
            arena: Arc::clone(&self.shared),
        })
    }

    pub fn stats(&self) -> ArenaStats {
        let shared = &self.shared;
        ArenaStats {
            limit: shared.limit,
            live_blocks: shared.live_blocks.load(Ordering::Relaxed),
            live_bytes: shared.live_bytes.load(Ordering::Relaxed),
            peak_bytes: shared.peak_bytes.load(Ordering::Relaxed),
            allocations: shared.allocations.load(Ordering::Relaxed),
            releases: shared.releases.load(Ordering::Relaxed),
            failures: shared.failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena").field("stats", &self.stats()).finish()
    }
}

/// 竞技场分配出的一块定长存储，析构时归还预算。
pub struct ArenaBlock {
    bytes: Box<[u8]>,
    arena: Arc<ArenaShared>,
}

impl ArenaBlock {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Drop for ArenaBlock {
    fn drop(&mut self) {
        let len = self.bytes.len();
        self.arena.live_bytes.fetch_sub(len, Ordering::AcqRel);
        self.arena.live_blocks.fetch_sub(1, Ordering::Relaxed);
        self.arena.releases.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for ArenaBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaBlock")
            .field("len", &self.bytes.len())
            .finish()
    }
}
