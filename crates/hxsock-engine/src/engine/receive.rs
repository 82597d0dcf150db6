//! 接收路径：入链、拆包、交付、背压与拉取。
//!
//! # 教案式导览
//! - **意图 (Why)**：三种交付模型共用同一条接收链，差别只在“每一步从链上取走什么、回调什么”；
//! - **逻辑 (How)**：
//!   - `on_received` 在连接串行锁内把字节挂到接收链，随后进入 `drain` 循环；
//!   - 每一轮在数据锁内由 `next_step` 决定下一步（交付字节、通知长度、暂停、关闭或结束），
//!     释放数据锁后再执行回调，回调可安全重入引擎；
//!   - PUSH 下已激活且链为空时直接交付本次字节，省去一次复制；
//! - **契约 (What)**：
//!   - 协议违例在交付任何包体字节之前关闭连接；
//!   - 同一连接的多个完整包按到达顺序逐个回调；
//!   - 缓冲达到 `receive_limit` 时按溢出策略暂停或关闭，数据不会被丢弃；
//!   - 暂停期间同样检查上限，背压暂停后缓冲达到上限两倍时以溢出关闭。

use std::mem;
use std::sync::Arc;
use std::time::Instant;

use hxsock_core::sync::ScopedLock;
use hxsock_core::{CloseCode, OverflowPolicy, SocketOperation};
use tracing::{debug, warn};

use crate::error::{EngineError, FetchResult};
use crate::framing::FrameStep;
use crate::id::ConnId;
use crate::record::{ConnectionRecord, Delivery};
use crate::slot::ConnectionSlot;
use crate::state::{ConnState, PauseReason};

use super::SocketEngine;

/// 一次接收事件处理后的连接状况，传输层据此决定是否继续读取。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ReceiveOutcome {
    /// 继续读取。
    Continue,
    /// 接收已暂停，等待 `TransportHandle::resume_receive` 后再读取。
    Paused,
    /// 连接已进入关闭流程。
    Closed,
}

/// 背压暂停后仍持续入链时的硬上限倍数（相对 `receive_limit`），越过即以溢出关闭。
const BACKPRESSURE_CEILING_FACTOR: usize = 2;

enum Step {
    Stop(ReceiveOutcome),
    Deliver(Vec<u8>),
    Announce(usize),
    Close(CloseCode),
}

impl SocketEngine {
    /// 传输层交付一次读取结果。空数据不入链，只重新驱动一次拆包（用于暂停恢复后的轮询）。
    pub fn on_received(&self, id: ConnId, data: &[u8]) -> Result<ReceiveOutcome, EngineError> {
        let slot = self.slot(id)?;
        let _io = self.enter_slot(&slot)?;
        let _serial = ScopedLock::new(&slot.serial);

        let direct = {
            let mut guard = slot.record.lock();
            let Some(record) = guard.as_mut() else {
                return Ok(ReceiveOutcome::Closed);
            };
            if record.state.is_closing() {
                return Ok(ReceiveOutcome::Closed);
            }
            if self.inner.config.mark_silence {
                record.last_activity = Instant::now();
            }
            if data.is_empty() {
                false
            } else if record.delivery == Delivery::Push
                && record.state == ConnState::Active
                && record.recv.is_empty()
            {
                true
            } else {
                match record.recv.append(&self.inner.chunks, data) {
                    Ok(()) => {
                        record.unannounced += data.len();
                        false
                    }
                    Err(err) => {
                        drop(guard);
                        warn!(conn_id = %id, code = err.code(), "receive buffer allocation failed");
                        self.close_slot(
                            &slot,
                            SocketOperation::Receive,
                            CloseCode::ResourceExhausted,
                            true,
                        );
                        return Ok(ReceiveOutcome::Closed);
                    }
                }
            }
        };

        if direct && self.inner.listener.on_receive(self, id, data).is_error() {
            self.close_slot(
                &slot,
                SocketOperation::Receive,
                CloseCode::ListenerAborted,
                true,
            );
            return Ok(ReceiveOutcome::Closed);
        }
        self.drain(&slot)
    }

    /// 交付循环。调用方须持有连接串行锁。
    pub(crate) fn drain(&self, slot: &Arc<ConnectionSlot>) -> Result<ReceiveOutcome, EngineError> {
        loop {
            let step = {
                let mut guard = slot.record.lock();
                match guard.as_mut() {
                    Some(record) => self.next_step(record),
                    None => Step::Stop(ReceiveOutcome::Closed),
                }
            };
            let verdict = match step {
                Step::Stop(outcome) => return Ok(outcome),
                Step::Close(code) => {
                    self.close_slot(slot, SocketOperation::Receive, code, true);
                    return Ok(ReceiveOutcome::Closed);
                }
                Step::Announce(len) => self.inner.listener.on_receive_len(self, slot.id, len),
                Step::Deliver(buf) => {
                    let verdict = self.inner.listener.on_receive(self, slot.id, &buf);
                    if let Some(record) = slot.record.lock().as_mut() {
                        record.scratch = buf;
                    }
                    verdict
                }
            };
            if verdict.is_error() {
                self.close_slot(
                    slot,
                    SocketOperation::Receive,
                    CloseCode::ListenerAborted,
                    true,
                );
                return Ok(ReceiveOutcome::Closed);
            }
        }
    }

    fn next_step(&self, record: &mut ConnectionRecord) -> Step {
        match record.state {
            ConnState::Closing | ConnState::Closed => return Step::Stop(ReceiveOutcome::Closed),
            ConnState::Paused => {
                return match self.check_overflow(record) {
                    Step::Stop(_) => Step::Stop(ReceiveOutcome::Paused),
                    other => other,
                };
            }
            ConnState::Connecting | ConnState::HandshakeStarting => {
                return self.check_overflow(record);
            }
            ConnState::Active => {}
        }
        let pool = &self.inner.chunks;
        match record.delivery {
            Delivery::Push => {
                let len = record.recv.total_size();
                if len == 0 {
                    return Step::Stop(ReceiveOutcome::Continue);
                }
                let mut buf = mem::take(&mut record.scratch);
                buf.clear();
                buf.resize(len, 0);
                if record.recv.fetch_into(pool, &mut buf).is_err() {
                    return Step::Close(CloseCode::ResourceExhausted);
                }
                record.unannounced = 0;
                Step::Deliver(buf)
            }
            Delivery::Pull => {
                if record.unannounced > 0 {
                    Step::Announce(mem::take(&mut record.unannounced))
                } else {
                    self.check_overflow(record)
                }
            }
            Delivery::PackPush | Delivery::PackPull => {
                if record.ready.total_size() >= self.inner.config.receive_limit {
                    return self.check_overflow(record);
                }
                match record.framer.poll(&mut record.recv, pool) {
                    Ok(FrameStep::Ready { body_len }) => self.take_packet(record, body_len),
                    Ok(FrameStep::NeedMore { .. }) => self.check_overflow(record),
                    Err(err) => {
                        warn!(
                            conn_id = %record.id,
                            code = err.code(),
                            error = %err,
                            "pack protocol violation"
                        );
                        Step::Close(err.close_code())
                    }
                }
            }
        }
    }

    fn take_packet(&self, record: &mut ConnectionRecord, body_len: usize) -> Step {
        let pool = &self.inner.chunks;
        if record.delivery == Delivery::PackPull {
            if let Err(err) = record.ready.transfer_from(pool, &mut record.recv, body_len) {
                warn!(conn_id = %record.id, code = err.code(), "ready queue allocation failed");
                return Step::Close(CloseCode::ResourceExhausted);
            }
            if body_len > 0 {
                record.ready_marks.push_back(body_len);
            }
            return Step::Announce(body_len);
        }
        let mut buf = mem::take(&mut record.scratch);
        buf.clear();
        buf.resize(body_len, 0);
        if record.recv.fetch_into(pool, &mut buf).is_err() {
            return Step::Close(CloseCode::ResourceExhausted);
        }
        Step::Deliver(buf)
    }

    fn check_overflow(&self, record: &mut ConnectionRecord) -> Step {
        let limit = self.inner.config.receive_limit;
        let buffered = record.buffered();
        if buffered < limit {
            return Step::Stop(ReceiveOutcome::Continue);
        }
        match self.inner.config.overflow_policy {
            OverflowPolicy::Close => Step::Close(CloseCode::ReceiveOverflow),
            OverflowPolicy::Backpressure => {
                let ceiling = limit.saturating_mul(BACKPRESSURE_CEILING_FACTOR);
                if buffered >= ceiling {
                    warn!(
                        conn_id = %record.id,
                        buffered,
                        ceiling,
                        "receive buffer exceeded backpressure ceiling"
                    );
                    return Step::Close(CloseCode::ReceiveOverflow);
                }
                if record.state == ConnState::Active && record.transition(ConnState::Paused).is_ok()
                {
                    record.pause = Some(PauseReason::Backpressure);
                    debug!(conn_id = %record.id, buffered, limit, "receive paused by backpressure");
                }
                Step::Stop(ReceiveOutcome::Paused)
            }
        }
    }

    /// 暂停或恢复接收。恢复时立即交付暂停期间积压的数据。
    pub fn pause_receive(&self, id: ConnId, pause: bool) -> Result<(), EngineError> {
        let slot = self.slot(id)?;
        {
            let mut guard = slot.record.lock();
            let record = guard.as_mut().ok_or(EngineError::InvalidConnection(id))?;
            match (pause, record.state) {
                (true, ConnState::Active) => {
                    record.transition(ConnState::Paused)?;
                    record.pause = Some(PauseReason::User);
                    return Ok(());
                }
                (true, ConnState::Paused) => {
                    record.pause = Some(PauseReason::User);
                    return Ok(());
                }
                (false, ConnState::Paused) => {
                    record.transition(ConnState::Active)?;
                    record.pause = None;
                }
                (false, ConnState::Active) => return Ok(()),
                (_, state) => return Err(EngineError::InvalidState { id, state }),
            }
        }
        self.resume_drain(&slot)
    }

    pub fn is_receive_paused(&self, id: ConnId) -> Result<bool, EngineError> {
        let slot = self.slot(id)?;
        let guard = slot.record.lock();
        let record = guard.as_ref().ok_or(EngineError::InvalidConnection(id))?;
        Ok(record.state == ConnState::Paused)
    }

    /// 恢复后补做交付。在本连接的回调内恢复时只翻转状态，由外层循环继续交付。
    fn resume_drain(&self, slot: &Arc<ConnectionSlot>) -> Result<(), EngineError> {
        if slot.serial.is_held_by_current_thread() {
            return Ok(());
        }
        let _io = self.enter_slot(slot)?;
        let _serial = ScopedLock::new(&slot.serial);
        if self.drain(slot)? == ReceiveOutcome::Continue {
            slot.handle.resume_receive();
        }
        Ok(())
    }

    /// 取出 `dest.len()` 字节（PULL 为原始字节，PACK/pull 为就绪包体）。
    pub fn fetch(&self, id: ConnId, dest: &mut [u8]) -> FetchResult {
        let Ok(slot) = self.slot(id) else {
            return FetchResult::InvalidConnection;
        };
        let (result, resume) = {
            let mut guard = slot.record.lock();
            let Some(record) = guard.as_mut() else {
                return FetchResult::InvalidConnection;
            };
            let result = record.fetch(&self.inner.chunks, dest);
            let resume = result.is_ok()
                && record.pause == Some(PauseReason::Backpressure)
                && record.buffered() < self.inner.config.receive_limit / 2
                && record.transition(ConnState::Active).is_ok();
            if resume {
                record.pause = None;
                debug!(conn_id = %id, "receive resumed after backpressure");
            }
            (result, resume)
        };
        if resume && let Err(err) = self.resume_drain(&slot) {
            debug!(conn_id = %id, error = %err, "resume after fetch skipped");
        }
        result
    }

    /// 复制前 `dest.len()` 字节，不改变连接状态。
    pub fn peek(&self, id: ConnId, dest: &mut [u8]) -> FetchResult {
        let Ok(slot) = self.slot(id) else {
            return FetchResult::InvalidConnection;
        };
        let guard = slot.record.lock();
        match guard.as_ref() {
            Some(record) => record.peek(dest),
            None => FetchResult::InvalidConnection,
        }
    }

    /// 可拉取的字节数；PUSH 与 PACK/push 连接恒为 0。
    pub fn pending_len(&self, id: ConnId) -> Result<usize, EngineError> {
        let slot = self.slot(id)?;
        let guard = slot.record.lock();
        guard
            .as_ref()
            .map(ConnectionRecord::pending_len)
            .ok_or(EngineError::InvalidConnection(id))
    }

    /// PACK/pull 下下一个待取包的长度。
    pub fn pending_packet_len(&self, id: ConnId) -> Result<Option<usize>, EngineError> {
        let slot = self.slot(id)?;
        let guard = slot.record.lock();
        guard
            .as_ref()
            .map(ConnectionRecord::next_packet_len)
            .ok_or(EngineError::InvalidConnection(id))
    }
}
