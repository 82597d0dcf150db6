//! 按配置暴露的交付能力。
//!
//! # 教案式导览
//! - **意图 (Why)**：同一个 [`SocketEngine`] 在不同配置下支持的操作不同：
//!   所有引擎都能发送，只有保留字节的配置才能拉取，只有 PACK 配置才有包参数；
//!   用小粒度 trait 表达能力，调用方只拿到当前配置真正支持的那部分接口；
//! - **逻辑 (How)**：`as_pull` / `as_pack` 在配置不支持时返回 `None`，而不是在运行期对每次调用报错；
//! - **契约 (What)**：trait 对象借用引擎，生命周期不超过引擎句柄本身。

use hxsock_core::{DeliveryModel, HeaderLayout};

use crate::engine::SocketEngine;
use crate::error::{EngineError, FetchResult};
use crate::id::ConnId;

/// 发送能力。
pub trait PushCapable {
    fn send(&self, id: ConnId, data: &[u8]) -> Result<(), EngineError>;

    fn send_packets(&self, id: ConnId, packets: &[&[u8]]) -> Result<(), EngineError>;
}

/// 拉取能力（PULL 与 PACK/pull）。
pub trait PullCapable {
    fn fetch(&self, id: ConnId, dest: &mut [u8]) -> FetchResult;

    fn peek(&self, id: ConnId, dest: &mut [u8]) -> FetchResult;

    fn pending_len(&self, id: ConnId) -> Result<usize, EngineError>;
}

/// PACK 参数。
pub trait PackCapable {
    fn max_pack_size(&self) -> u32;

    fn header_flag(&self) -> u16;

    fn header_layout(&self) -> HeaderLayout;
}

impl PushCapable for SocketEngine {
    fn send(&self, id: ConnId, data: &[u8]) -> Result<(), EngineError> {
        SocketEngine::send(self, id, data)
    }

    fn send_packets(&self, id: ConnId, packets: &[&[u8]]) -> Result<(), EngineError> {
        SocketEngine::send_packets(self, id, packets)
    }
}

impl PullCapable for SocketEngine {
    fn fetch(&self, id: ConnId, dest: &mut [u8]) -> FetchResult {
        SocketEngine::fetch(self, id, dest)
    }

    fn peek(&self, id: ConnId, dest: &mut [u8]) -> FetchResult {
        SocketEngine::peek(self, id, dest)
    }

    fn pending_len(&self, id: ConnId) -> Result<usize, EngineError> {
        SocketEngine::pending_len(self, id)
    }
}

impl PackCapable for SocketEngine {
    fn max_pack_size(&self) -> u32 {
        self.config().pack.max_pack_size
    }

    fn header_flag(&self) -> u16 {
        self.config().pack.header_flag
    }

    fn header_layout(&self) -> HeaderLayout {
        self.config().pack.layout
    }
}

impl SocketEngine {
    pub fn as_push(&self) -> &dyn PushCapable {
        self
    }

    /// 仅当连接保留可拉取字节（PULL 或 PACK/pull）时返回拉取能力。
    pub fn as_pull(&self) -> Option<&dyn PullCapable> {
        self.config().retains_bytes().then_some(self as &dyn PullCapable)
    }

    /// 仅 PACK 模型返回包参数。
    pub fn as_pack(&self) -> Option<&dyn PackCapable> {
        (self.config().delivery == DeliveryModel::Pack).then_some(self as &dyn PackCapable)
    }
}
