use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hxsock_core::{CloseCode, SocketOperation};
use tracing::debug;

use crate::error::EngineError;
use crate::id::ConnId;
use crate::record::ConnectionRecord;
use crate::slot::ConnectionSlot;
use crate::state::ConnState;

use super::SocketEngine;

impl SocketEngine {
    /// 绑定调用方数据；连接关闭（`on_close` 返回）后随记录一并释放。
    pub fn set_extra(
        &self,
        id: ConnId,
        extra: Arc<dyn Any + Send + Sync>,
    ) -> Result<(), EngineError> {
        self.with_record(id, |record| record.extra = Some(extra))
    }

    pub fn extra(&self, id: ConnId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.with_record(id, |record| record.extra.clone())
            .ok()
            .flatten()
    }

    /// 按具体类型取回调用方数据，类型不符时返回 `None`。
    pub fn extra_as<T: Any + Send + Sync>(&self, id: ConnId) -> Option<Arc<T>> {
        self.extra(id).and_then(|extra| extra.downcast::<T>().ok())
    }

    /// 连接当前状态；未知标识返回 `None`。
    pub fn state(&self, id: ConnId) -> Option<ConnState> {
        self.with_record(id, |record| record.state).ok()
    }

    /// 连接是否处于可收发状态（`Active` 或 `Paused`）。
    pub fn is_connected(&self, id: ConnId) -> bool {
        matches!(
            self.state(id),
            Some(ConnState::Active | ConnState::Paused)
        )
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    /// 当前全部连接标识，按分配顺序排列。
    pub fn connection_ids(&self) -> Vec<ConnId> {
        let mut ids: Vec<ConnId> = self
            .inner
            .connections
            .iter()
            .map(|entry| *entry.key())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// 连接已存在的时长。
    pub fn connect_period(&self, id: ConnId) -> Result<Duration, EngineError> {
        self.with_record(id, |record| record.connected_at.elapsed())
    }

    /// 距最近一次收到数据的时长；需启用 `mark_silence`。
    pub fn silence_period(&self, id: ConnId) -> Result<Duration, EngineError> {
        if !self.inner.config.mark_silence {
            return Err(EngineError::SilenceNotTracked);
        }
        self.with_record(id, |record| record.last_activity.elapsed())
    }

    /// 断开存在时间超过 `period` 的连接，返回断开数量。
    pub fn disconnect_long_connections(&self, period: Duration) -> usize {
        let now = Instant::now();
        self.kick_where(|record| now.saturating_duration_since(record.connected_at) >= period)
    }

    /// 断开静默时间超过 `period` 的连接，返回断开数量。
    pub fn disconnect_silence_connections(&self, period: Duration) -> Result<usize, EngineError> {
        if !self.inner.config.mark_silence {
            return Err(EngineError::SilenceNotTracked);
        }
        let now = Instant::now();
        Ok(self.kick_where(|record| now.saturating_duration_since(record.last_activity) >= period))
    }

    fn kick_where(&self, predicate: impl Fn(&ConnectionRecord) -> bool) -> usize {
        // 先收集再关闭：关闭会修改连接表，不能在遍历分片时进行。
        let slots: Vec<Arc<ConnectionSlot>> = self
            .inner
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut kicked = 0;
        for slot in slots {
            let expired = slot
                .record
                .lock()
                .as_ref()
                .is_some_and(|record| !record.state.is_closing() && predicate(record));
            if expired {
                self.close_slot(&slot, SocketOperation::Close, CloseCode::Kicked, false);
                kicked += 1;
            }
        }
        if kicked > 0 {
            debug!(kicked, "idle connections disconnected");
        }
        kicked
    }

    fn with_record<R>(
        &self,
        id: ConnId,
        f: impl FnOnce(&mut ConnectionRecord) -> R,
    ) -> Result<R, EngineError> {
        let slot = self.slot(id)?;
        let mut guard = slot.record.lock();
        guard
            .as_mut()
            .map(f)
            .ok_or(EngineError::InvalidConnection(id))
    }
}
