//! 发送路径。
//!
//! 调用方的 `send` 只把字节排入连接的发送链并按策略唤醒传输层；
//! 传输层随后用 `take_send` 取出字节写出，写完后以 `on_send_complete` 回报。
//! 三种策略的差别：
//! - `pack`：`take_send` 把排队的多次发送合并为一次写出；
//! - `safe`：每次写出不跨越一次 `send` 的边界；
//! - `direct`：同 `safe`，且每次 `send` 都立即唤醒传输层。

use hxsock_core::{CloseCode, SendPolicy, SocketOperation};
use tracing::warn;

use crate::error::EngineError;
use crate::framing::MAX_HEADER_LEN;
use crate::id::ConnId;
use crate::slot::ConnectionSlot;
use crate::state::ConnState;

use super::SocketEngine;

impl SocketEngine {
    /// 发送一个数据单元；PACK 模型下自动加包头。
    pub fn send(&self, id: ConnId, data: &[u8]) -> Result<(), EngineError> {
        self.send_packets(id, &[data])
    }

    /// 批量发送。PACK 模型下每个元素各成一个包；其余模型下各元素作为一个整体排队。
    ///
    /// 超过 `max_pack_size` 的包整批拒绝（`PacketTooLarge`），连接保持可用；
    /// 缓冲申请失败则关闭连接。
    pub fn send_packets(&self, id: ConnId, packets: &[&[u8]]) -> Result<(), EngineError> {
        let slot = self.slot(id)?;
        let framing = self.inner.framing;
        let flush = {
            let mut guard = slot.record.lock();
            let record = guard.as_mut().ok_or(EngineError::InvalidConnection(id))?;
            if !matches!(record.state, ConnState::Active | ConnState::Paused) {
                return Err(EngineError::InvalidState {
                    id,
                    state: record.state,
                });
            }
            let was_empty = record.send.is_empty();
            let queued = if record.delivery.is_pack() {
                let headers = packets
                    .iter()
                    .map(|packet| framing.header_for(packet.len()))
                    .collect::<Result<Vec<_>, _>>()?;
                headers.iter().zip(packets).try_for_each(|(header, body)| {
                    let mut raw = [0u8; MAX_HEADER_LEN];
                    let n = header.encode(framing.layout(), &mut raw);
                    record.queue_send(&self.inner.chunks, &[&raw[..n], *body])
                })
            } else {
                record.queue_send(&self.inner.chunks, packets)
            };
            if let Err(err) = queued {
                drop(guard);
                warn!(conn_id = %id, code = err.code(), "send buffer allocation failed");
                self.close_slot(
                    &slot,
                    SocketOperation::Send,
                    CloseCode::ResourceExhausted,
                    true,
                );
                return Err(err.into());
            }
            match self.inner.config.send_policy {
                SendPolicy::Direct => !record.send.is_empty(),
                SendPolicy::Pack | SendPolicy::Safe => was_empty && !record.send.is_empty(),
            }
        };
        if flush {
            slot.handle.flush();
        }
        Ok(())
    }

    /// 传输层取出待写字节，返回写入 `dest` 的字节数；0 表示队列已空。
    ///
    /// 连接移出连接表后请改用 [`IoGuard::take_send`]，以便非强制关闭时写完剩余数据。
    pub fn take_send(&self, id: ConnId, dest: &mut [u8]) -> Result<usize, EngineError> {
        let slot = self.slot(id)?;
        self.take_send_from(&slot, dest)
    }

    pub(crate) fn take_send_from(
        &self,
        slot: &ConnectionSlot,
        dest: &mut [u8],
    ) -> Result<usize, EngineError> {
        let coalesce = self.inner.config.send_policy == SendPolicy::Pack;
        let mut guard = slot.record.lock();
        let record = guard
            .as_mut()
            .ok_or(EngineError::InvalidConnection(slot.id))?;
        Ok(record.take_send(&self.inner.chunks, dest, coalesce)?)
    }

    /// 尚未被传输层取走的待发送字节数。
    pub fn pending_send_len(&self, id: ConnId) -> Result<usize, EngineError> {
        let slot = self.slot(id)?;
        let guard = slot.record.lock();
        guard
            .as_ref()
            .map(|record| record.send.total_size())
            .ok_or(EngineError::InvalidConnection(id))
    }

    /// 传输层完成一次写出，触发 `on_send`（返回值被忽略）。
    pub fn on_send_complete(&self, id: ConnId, len: usize) -> Result<(), EngineError> {
        let slot = self.slot(id)?;
        let _ = self.inner.listener.on_send(self, slot.id, len);
        Ok(())
    }
}
