//! 引擎本体：服务生命周期、连接接入与关闭、延迟回收。
//!
//! # 教案式导览
//! - **意图 (Why)**：把“连接从哪来、何时生效、如何结束”集中在一处，接收与发送路径
//!   （见 `receive` / `send` 子模块）只需关心字节本身；
//! - **逻辑 (How)**：
//!   - 引擎以 `Arc` 共享，`SocketEngine` 可廉价克隆并跨线程传递，取代进程级单例；
//!   - 连接标识单调递增且永不复用，过期标识只会得到 `InvalidConnection`；
//!   - 关闭流程：置位 `closing` → 状态改为 `Closing` → 取得串行锁 → `on_close` →
//!     移出连接表 → 通知传输层；记录与缓冲的回收推迟到最后一个 [`IoGuard`] 析构；
//! - **契约 (What)**：
//!   - 每条进入连接表且未被 `on_accept`/`on_prepare_connect` 拒绝的连接恰好触发一次 `on_close`；
//!   - `on_close` 发生在该连接的任何缓冲归还之前，回调内仍可读取 `extra`。

mod query;
mod receive;
mod send;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use hxsock_buffer::{Arena, ArenaStats, BufferChunk, ObjectPool, PoolStats};
use hxsock_core::sync::{Locked, PolicyLock, ScopedLock, SpinLock};
use hxsock_core::{CloseCode, EngineConfig, SocketOperation};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::framing::FramingPolicy;
use crate::id::ConnId;
use crate::listener::Listener;
use crate::record::{ConnectionRecord, Delivery};
use crate::slot::{ConnectionSlot, IoGuard};
use crate::state::{ConnState, ServiceState};
use crate::transport::{Origin, TransportHandle};

pub use receive::ReceiveOutcome;

/// 最近一次引擎级错误。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LastError {
    pub code: &'static str,
    pub message: String,
}

/// 引擎统计快照。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineStats {
    pub connections: usize,
    pub chunk_pool: PoolStats,
    pub record_pool: PoolStats,
    pub arena: ArenaStats,
}

/// 连接引擎句柄。
#[derive(Clone)]
pub struct SocketEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    listener: Arc<dyn Listener>,
    delivery: Delivery,
    framing: FramingPolicy,
    arena: Arena,
    chunks: ObjectPool<BufferChunk, PolicyLock>,
    records: ObjectPool<ConnectionRecord, PolicyLock>,
    connections: DashMap<ConnId, Arc<ConnectionSlot>>,
    next_id: AtomicU64,
    live: AtomicUsize,
    service: Locked<ServiceState, SpinLock>,
    last_error: spin::Mutex<Option<LastError>>,
}

impl SocketEngine {
    /// 校验配置并构造引擎；池在 [`start`](Self::start) 时预热。
    pub fn new(config: EngineConfig, listener: Arc<dyn Listener>) -> Result<Self, EngineError> {
        config.validate()?;
        let delivery = Delivery::from_config(&config);
        let framing = FramingPolicy::from_config(&config.pack);
        let arena = Arena::new(config.arena_limit);
        let chunks = ObjectPool::for_chunks(
            arena.clone(),
            config.chunk_capacity,
            config.buffer_pool,
            PolicyLock::new(config.pool_lock),
        );
        let records = ObjectPool::new(
            config.connection_pool,
            PolicyLock::new(config.pool_lock),
            move || Ok(ConnectionRecord::new(framing)),
        );
        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                listener,
                delivery,
                framing,
                arena,
                chunks,
                records,
                connections: DashMap::new(),
                next_id: AtomicU64::new(1),
                live: AtomicUsize::new(0),
                service: Locked::new(ServiceState::Stopped),
                last_error: spin::Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn service_state(&self) -> ServiceState {
        *self.inner.service.lock()
    }

    /// 启动服务：预建 `pool_size` 个缓冲块与连接记录。
    pub fn start(&self) -> Result<(), EngineError> {
        self.switch_service(ServiceState::Stopped, ServiceState::Starting)?;
        let prepared = self
            .inner
            .chunks
            .prepare()
            .and_then(|()| self.inner.records.prepare());
        if let Err(err) = prepared {
            let err = EngineError::from(err);
            self.record_error(err.code(), err.to_string());
            warn!(code = err.code(), error = %err, "engine failed to start");
            self.inner.chunks.clear();
            self.inner.records.clear();
            *self.inner.service.lock() = ServiceState::Stopped;
            return Err(err);
        }
        *self.inner.service.lock() = ServiceState::Started;
        info!(
            delivery = ?self.inner.config.delivery,
            max_connections = self.inner.config.max_connections,
            "engine started"
        );
        Ok(())
    }

    /// 停止服务：以 `Shutdown` 关闭全部连接，随后触发一次 `on_shutdown` 并清空两个池。
    pub fn stop(&self) -> Result<(), EngineError> {
        self.switch_service(ServiceState::Started, ServiceState::Stopping)?;
        let slots: Vec<Arc<ConnectionSlot>> = self
            .inner
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let closed = slots.len();
        for slot in slots {
            self.close_slot(&slot, SocketOperation::Close, CloseCode::Shutdown, true);
        }
        let _ = self.inner.listener.on_shutdown(self);
        self.inner.chunks.clear();
        self.inner.records.clear();
        *self.inner.service.lock() = ServiceState::Stopped;
        info!(closed, "engine stopped");
        Ok(())
    }

    fn switch_service(&self, from: ServiceState, to: ServiceState) -> Result<(), EngineError> {
        let mut service = self.inner.service.lock();
        if *service != from {
            return Err(EngineError::ServiceState {
                expected: from,
                actual: *service,
            });
        }
        *service = to;
        Ok(())
    }

    /// 传输层登记一条新连接。
    ///
    /// 入站连接在 `on_accept` 通过后立即建立（未启用安全层时直接进入 `Active`）；
    /// 出站连接停留在 `Connecting`，直到传输层调用 [`connected`](Self::connected)。
    pub fn attach(
        &self,
        handle: Arc<dyn TransportHandle>,
        origin: Origin,
    ) -> Result<ConnId, EngineError> {
        let actual = self.service_state();
        if actual != ServiceState::Started {
            return Err(EngineError::ServiceState {
                expected: ServiceState::Started,
                actual,
            });
        }
        let max = self.inner.config.max_connections;
        self.inner
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < max).then_some(live + 1)
            })
            .map_err(|_| EngineError::ConnectionLimit { max })?;

        let mut record = match self.inner.records.acquire() {
            Ok(record) => record,
            Err(err) => {
                self.inner.live.fetch_sub(1, Ordering::AcqRel);
                return Err(err.into());
            }
        };
        let id = ConnId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        record.open(id, self.inner.delivery);
        let slot = Arc::new(ConnectionSlot::new(id, origin, record, handle));
        self.inner.connections.insert(id, Arc::clone(&slot));
        debug!(conn_id = %id, ?origin, "connection attached");

        let verdict = match origin {
            Origin::Inbound => self.inner.listener.on_accept(self, id),
            Origin::Outbound => self.inner.listener.on_prepare_connect(self, id),
        };
        if verdict.is_error() {
            debug!(conn_id = %id, "listener rejected connection");
            self.retire(&slot, None, true);
            return Err(EngineError::ListenerRejected(id));
        }
        if origin == Origin::Inbound
            && let Err(err) = self.establish(&slot)
        {
            // 监听器已在回调内关闭了连接，`on_close` 已送达。
            debug!(conn_id = %id, error = %err, "inbound connection closed before activation");
        }
        Ok(id)
    }

    /// 出站连接已建立：触发 `on_connect`，随后进入握手或直接激活。
    pub fn connected(&self, id: ConnId) -> Result<(), EngineError> {
        let slot = self.slot(id)?;
        let _io = self.enter_slot(&slot)?;
        let _serial = ScopedLock::new(&slot.serial);
        let state = self.state_of(&slot)?;
        if state != ConnState::Connecting || slot.origin != Origin::Outbound {
            return Err(EngineError::InvalidState { id, state });
        }
        if self.inner.listener.on_connect(self, id).is_error() {
            self.close_slot(
                &slot,
                SocketOperation::Connect,
                CloseCode::ListenerAborted,
                true,
            );
            return Ok(());
        }
        self.establish(&slot)
    }

    /// 安全层握手完成，连接进入 `Active`。
    pub fn handshake_completed(&self, id: ConnId) -> Result<(), EngineError> {
        let slot = self.slot(id)?;
        let state = self.state_of(&slot)?;
        if state != ConnState::HandshakeStarting {
            return Err(EngineError::InvalidState { id, state });
        }
        self.activate(&slot)
    }

    fn establish(&self, slot: &Arc<ConnectionSlot>) -> Result<(), EngineError> {
        if self.inner.config.secure {
            let mut guard = slot.record.lock();
            let record = guard
                .as_mut()
                .ok_or(EngineError::InvalidConnection(slot.id))?;
            record.transition(ConnState::HandshakeStarting)
        } else {
            self.activate(slot)
        }
    }

    /// 进入 `Active`，触发 `on_handshake`，再处理握手前缓存的字节。
    fn activate(&self, slot: &Arc<ConnectionSlot>) -> Result<(), EngineError> {
        let _io = self.enter_slot(slot)?;
        let _serial = ScopedLock::new(&slot.serial);
        {
            let mut guard = slot.record.lock();
            let record = guard
                .as_mut()
                .ok_or(EngineError::InvalidConnection(slot.id))?;
            record.transition(ConnState::Active)?;
        }
        debug!(conn_id = %slot.id, "connection active");
        if self.inner.listener.on_handshake(self, slot.id).is_error() {
            self.close_slot(
                slot,
                SocketOperation::Handshake,
                CloseCode::ListenerAborted,
                true,
            );
            return Ok(());
        }
        if self.drain(slot)? != ReceiveOutcome::Closed {
            slot.handle.resume_receive();
        }
        Ok(())
    }

    /// 主动断开连接。`force` 为假时传输层可先写出已排队的数据。
    pub fn disconnect(&self, id: ConnId, force: bool) -> Result<(), EngineError> {
        let slot = self.slot(id)?;
        self.close_slot(&slot, SocketOperation::Close, CloseCode::Normal, force);
        Ok(())
    }

    /// 传输层报告 I/O 失败或对端关闭。
    pub fn on_io_error(
        &self,
        id: ConnId,
        operation: SocketOperation,
        code: CloseCode,
    ) -> Result<(), EngineError> {
        let slot = self.slot(id)?;
        self.close_slot(&slot, operation, code, true);
        Ok(())
    }

    /// 登记一次在途 I/O，守卫析构前连接资源不会被回收。
    pub fn begin_io(&self, id: ConnId) -> Result<IoGuard, EngineError> {
        let slot = self.slot(id)?;
        self.enter_slot(&slot)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            connections: self.inner.connections.len(),
            chunk_pool: self.inner.chunks.stats(),
            record_pool: self.inner.records.stats(),
            arena: self.inner.arena.stats(),
        }
    }

    pub fn last_error(&self) -> Option<LastError> {
        self.inner.last_error.lock().clone()
    }

    pub(crate) fn record_error(&self, code: &'static str, message: String) {
        *self.inner.last_error.lock() = Some(LastError { code, message });
    }

    pub(crate) fn slot(&self, id: ConnId) -> Result<Arc<ConnectionSlot>, EngineError> {
        self.inner
            .connections
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(EngineError::InvalidConnection(id))
    }

    pub(crate) fn enter_slot(&self, slot: &Arc<ConnectionSlot>) -> Result<IoGuard, EngineError> {
        if !slot.enter() {
            self.try_finalize(slot);
            return Err(EngineError::InvalidConnection(slot.id));
        }
        Ok(IoGuard::adopt(self.clone(), Arc::clone(slot)))
    }

    fn state_of(&self, slot: &ConnectionSlot) -> Result<ConnState, EngineError> {
        slot.record
            .lock()
            .as_ref()
            .map(|record| record.state)
            .ok_or(EngineError::InvalidConnection(slot.id))
    }

    /// 关闭连接并触发一次 `on_close`；重复调用无副作用。
    pub(crate) fn close_slot(
        &self,
        slot: &Arc<ConnectionSlot>,
        operation: SocketOperation,
        code: CloseCode,
        force: bool,
    ) {
        self.retire(slot, Some((operation, code)), force);
    }

    /// `notify` 为 `None` 时不触发 `on_close`，用于接入阶段被监听器拒绝的连接。
    fn retire(
        &self,
        slot: &Arc<ConnectionSlot>,
        notify: Option<(SocketOperation, CloseCode)>,
        force: bool,
    ) {
        slot.enter_unchecked();
        let _hold = IoGuard::adopt(self.clone(), Arc::clone(slot));
        if !slot.mark_closing() {
            return;
        }
        if let Some(record) = slot.record.lock().as_mut() {
            record.begin_closing();
        }
        let _serial = ScopedLock::new(&slot.serial);
        if let Some((operation, code)) = notify {
            if code.is_error() {
                warn!(conn_id = %slot.id, %operation, %code, "connection closed abnormally");
                self.record_error(
                    code.code(),
                    format!("{} closed during {operation}: {code}", slot.id),
                );
            } else {
                debug!(conn_id = %slot.id, %operation, %code, "connection closed");
            }
            let _ = self.inner.listener.on_close(self, slot.id, operation, code);
        }
        if self.inner.connections.remove(&slot.id).is_some() {
            self.inner.live.fetch_sub(1, Ordering::AcqRel);
        }
        slot.handle.close(force);
    }

    /// 连接已关闭且没有在途 I/O 时回收缓冲与记录，只执行一次。
    pub(crate) fn try_finalize(&self, slot: &ConnectionSlot) {
        if !slot.claim_finalize() {
            return;
        }
        let taken = slot.record.lock().take();
        if let Some(mut record) = taken {
            record.release_chains(&self.inner.chunks);
            record.begin_closing();
            let _ = record.transition(ConnState::Closed);
            self.inner.records.release(record);
            debug!(conn_id = %slot.id, "connection resources released");
        }
    }
}

impl fmt::Debug for SocketEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketEngine")
            .field("service", &self.service_state())
            .field("connections", &self.inner.connections.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hxsock_core::error::codes;
    use hxsock_core::{HeaderLayout, PoolConfig};
    use tracing_test::traced_test;

    use super::*;
    use crate::framing::{MAX_HEADER_LEN, PackHeader};
    use crate::transport::DetachedHandle;

    struct Silent;

    impl Listener for Silent {}

    fn engine(config: EngineConfig) -> SocketEngine {
        let config = config
            .with_buffer_pool(PoolConfig::new(2, 8, Duration::ZERO))
            .with_connection_pool(PoolConfig::new(1, 4, Duration::ZERO));
        let engine = SocketEngine::new(config, Arc::new(Silent)).expect("构造引擎失败");
        engine.start().expect("启动引擎失败");
        engine
    }

    #[traced_test]
    #[test]
    fn protocol_violation_is_logged_with_stable_code() {
        let engine = engine(EngineConfig::default().with_pack(16, 0x2A));
        let id = engine
            .attach(Arc::new(DetachedHandle), Origin::Inbound)
            .expect("接入失败");
        let mut raw = [0u8; MAX_HEADER_LEN];
        let n = PackHeader::new(0x2A, 64).encode(HeaderLayout::Compact, &mut raw);
        assert_eq!(
            engine.on_received(id, &raw[..n]).expect("接收失败"),
            ReceiveOutcome::Closed
        );
        assert!(logs_contain("pack protocol violation"));
        assert!(logs_contain(codes::FRAME_PACKET_TOO_LARGE));
        assert_eq!(
            engine.last_error().map(|last| last.code),
            Some(codes::FRAME_PACKET_TOO_LARGE)
        );
    }

    #[test]
    fn slot_is_finalized_by_the_last_io_guard() {
        let engine = engine(EngineConfig::default());
        let id = engine
            .attach(Arc::new(DetachedHandle), Origin::Inbound)
            .expect("接入失败");
        let slot = engine.slot(id).expect("槽位必须存在");
        let first = engine.begin_io(id).expect("登记失败");
        let second = engine.begin_io(id).expect("登记失败");
        assert_eq!(slot.pending_io(), 2);

        engine.disconnect(id, true).expect("断开失败");
        assert!(slot.is_closing());
        drop(first);
        assert!(slot.record.lock().is_some(), "仍有在途 I/O 时记录保留");
        drop(second);
        assert!(slot.record.lock().is_none(), "最后一个守卫负责回收");
        assert_eq!(slot.pending_io(), 0);
    }
}
