use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use hxsock_buffer::{BufferChunk, BufferError, ChunkChain, ObjectPool, Poolable};
use hxsock_core::{DeliveryModel, EngineConfig, PackDelivery, RawLock};
use tracing::trace;

use crate::error::{EngineError, FetchResult};
use crate::framing::{Framer, FramingPolicy};
use crate::id::ConnId;
use crate::state::{ConnState, PauseReason};

/// 归还记录时保留的临时缓冲上限，超过则释放，避免单个大包让池中记录长期占用内存。
const SCRATCH_RETAIN_LIMIT: usize = 64 * 1024;

/// 引擎内部使用的交付方式，由交付模型与 PACK 交付方式合并而来。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Delivery {
    Push,
    Pull,
    PackPush,
    PackPull,
}

impl Delivery {
    pub(crate) fn from_config(config: &EngineConfig) -> Self {
        match (config.delivery, config.pack.delivery) {
            (DeliveryModel::Push, _) => Delivery::Push,
            (DeliveryModel::Pull, _) => Delivery::Pull,
            (DeliveryModel::Pack, PackDelivery::Push) => Delivery::PackPush,
            (DeliveryModel::Pack, PackDelivery::Pull) => Delivery::PackPull,
        }
    }

    pub(crate) fn is_pack(self) -> bool {
        matches!(self, Delivery::PackPush | Delivery::PackPull)
    }
}

pub(crate) type Extra = Arc<dyn Any + Send + Sync>;

/// 连接记录：一条连接的全部可变状态。
///
/// # 教案式说明
/// - **意图 (Why)**：连接记录由连接池循环复用，接入时从池中取出并以新标识重新初始化，
///   回收时先把三条缓冲块链归还缓冲块池，再把记录本身归还连接池；
/// - **逻辑 (How)**：
///   - `recv`：尚未拆包（或 PULL 下尚未被拉取）的原始字节；
///   - `ready` / `ready_marks`：PACK/pull 下已拆出、等待 `fetch` 的包体及各包长度；
///   - `send` / `send_marks`：待写出的字节及各次 `send` 的边界，`safe`/`direct` 策略按边界逐次写出；
///   - `unannounced`：PULL 下已入链但尚未通过 `on_receive_len` 通知的字节数；
/// - **契约 (What)**：记录只在所属槽位的数据锁内被访问；状态跃迁统一经过 [`transition`](Self::transition)。
pub(crate) struct ConnectionRecord {
    pub(crate) id: ConnId,
    pub(crate) state: ConnState,
    pub(crate) pause: Option<PauseReason>,
    pub(crate) delivery: Delivery,
    pub(crate) recv: ChunkChain,
    pub(crate) ready: ChunkChain,
    pub(crate) ready_marks: VecDeque<usize>,
    pub(crate) unannounced: usize,
    pub(crate) send: ChunkChain,
    pub(crate) send_marks: VecDeque<usize>,
    pub(crate) framer: Framer,
    pub(crate) scratch: Vec<u8>,
    pub(crate) extra: Option<Extra>,
    pub(crate) connected_at: Instant,
    pub(crate) last_activity: Instant,
}

impl ConnectionRecord {
    pub(crate) fn new(framing: FramingPolicy) -> Self {
        let now = Instant::now();
        Self {
            id: ConnId::new(0),
            state: ConnState::Connecting,
            pause: None,
            delivery: Delivery::Push,
            recv: ChunkChain::new(),
            ready: ChunkChain::new(),
            ready_marks: VecDeque::new(),
            unannounced: 0,
            send: ChunkChain::new(),
            send_marks: VecDeque::new(),
            framer: Framer::new(framing),
            scratch: Vec::new(),
            extra: None,
            connected_at: now,
            last_activity: now,
        }
    }

    /// 以新标识重新启用一条（可能来自池的）记录。
    pub(crate) fn open(&mut self, id: ConnId, delivery: Delivery) {
        let now = Instant::now();
        self.id = id;
        self.state = ConnState::Connecting;
        self.delivery = delivery;
        self.connected_at = now;
        self.last_activity = now;
    }

    pub(crate) fn transition(&mut self, next: ConnState) -> Result<(), EngineError> {
        if !self.state.can_transition_to(next) {
            return Err(EngineError::InvalidState {
                id: self.id,
                state: self.state,
            });
        }
        trace!(conn_id = %self.id, from = %self.state, to = %next, "connection state changed");
        self.state = next;
        Ok(())
    }

    /// 进入 `Closing`；已处于关闭流程时保持不变。
    pub(crate) fn begin_closing(&mut self) {
        if !self.state.is_closing() {
            trace!(conn_id = %self.id, from = %self.state, "connection closing");
            self.state = ConnState::Closing;
            self.pause = None;
        }
    }

    /// 仍缓存在引擎中的接收字节（原始 + 已拆出待拉取）。
    pub(crate) fn buffered(&self) -> usize {
        self.recv.total_size() + self.ready.total_size()
    }

    fn pull_store(&self) -> Option<&ChunkChain> {
        match self.delivery {
            Delivery::Pull => Some(&self.recv),
            Delivery::PackPull => Some(&self.ready),
            Delivery::Push | Delivery::PackPush => None,
        }
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pull_store().map_or(0, ChunkChain::total_size)
    }

    pub(crate) fn next_packet_len(&self) -> Option<usize> {
        match self.delivery {
            Delivery::PackPull => self.ready_marks.front().copied(),
            _ => None,
        }
    }

    pub(crate) fn peek(&self, dest: &mut [u8]) -> FetchResult {
        if dest.is_empty() {
            return FetchResult::Ok;
        }
        match self.pull_store() {
            Some(store) if store.total_size() >= dest.len() => match store.peek_into(dest) {
                Ok(()) => FetchResult::Ok,
                Err(_) => FetchResult::InsufficientData,
            },
            _ => FetchResult::InsufficientData,
        }
    }

    pub(crate) fn fetch<L: RawLock>(
        &mut self,
        pool: &ObjectPool<BufferChunk, L>,
        dest: &mut [u8],
    ) -> FetchResult {
        if dest.is_empty() {
            return FetchResult::Ok;
        }
        if self.pending_len() < dest.len() {
            return FetchResult::InsufficientData;
        }
        let taken = match self.delivery {
            Delivery::Pull => self.recv.fetch_into(pool, dest),
            Delivery::PackPull => self.ready.fetch_into(pool, dest),
            Delivery::Push | Delivery::PackPush => return FetchResult::InsufficientData,
        };
        if taken.is_err() {
            return FetchResult::InsufficientData;
        }
        match self.delivery {
            Delivery::Pull => self.unannounced = self.unannounced.min(self.recv.total_size()),
            _ => consume_marks(&mut self.ready_marks, dest.len()),
        }
        FetchResult::Ok
    }

    /// 追加一个待发送单元并记录边界。
    pub(crate) fn queue_send<L: RawLock>(
        &mut self,
        pool: &ObjectPool<BufferChunk, L>,
        parts: &[&[u8]],
    ) -> Result<(), BufferError> {
        let mut total = 0;
        for part in parts {
            self.send.append(pool, part)?;
            total += part.len();
        }
        if total > 0 {
            self.send_marks.push_back(total);
        }
        Ok(())
    }

    /// 取出待发送字节：`coalesce` 为真时尽量填满 `dest`，否则最多取到下一个边界。
    pub(crate) fn take_send<L: RawLock>(
        &mut self,
        pool: &ObjectPool<BufferChunk, L>,
        dest: &mut [u8],
        coalesce: bool,
    ) -> Result<usize, BufferError> {
        let mut len = dest.len().min(self.send.total_size());
        if !coalesce && let Some(front) = self.send_marks.front() {
            len = len.min(*front);
        }
        if len == 0 {
            return Ok(0);
        }
        self.send.fetch_into(pool, &mut dest[..len])?;
        consume_marks(&mut self.send_marks, len);
        Ok(len)
    }

    /// 把三条链上的缓冲块全部归还池。
    pub(crate) fn release_chains<L: RawLock>(&mut self, pool: &ObjectPool<BufferChunk, L>) {
        self.recv.release_all(pool);
        self.ready.release_all(pool);
        self.send.release_all(pool);
    }
}

fn consume_marks(marks: &mut VecDeque<usize>, mut n: usize) {
    while n > 0 {
        let Some(front) = marks.front_mut() else {
            break;
        };
        if *front <= n {
            n -= *front;
            marks.pop_front();
        } else {
            *front -= n;
            n = 0;
        }
    }
}

impl Poolable for ConnectionRecord {
    fn reset(&mut self) {
        self.state = ConnState::Closed;
        self.pause = None;
        // 正常路径下三条链已由 `release_chains` 清空；残留块在此直接析构。
        self.recv = ChunkChain::new();
        self.ready = ChunkChain::new();
        self.send = ChunkChain::new();
        self.ready_marks.clear();
        self.send_marks.clear();
        self.unannounced = 0;
        self.framer.reset();
        if self.scratch.capacity() > SCRATCH_RETAIN_LIMIT {
            self.scratch = Vec::new();
        } else {
            self.scratch.clear();
        }
        self.extra = None;
    }
}
