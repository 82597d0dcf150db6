//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 汇总引擎对调用方暴露的错误：失效连接、状态不符、连接数上限、服务状态不符，
//!   以及下层缓冲、拆包、配置错误的透传；
//! - `fetch`/`peek` 采用三值结果 [`FetchResult`]，与“数据不足”这类非致命误用保持轻量。

use hxsock_buffer::BufferError;
use hxsock_core::ConfigError;
use hxsock_core::error::codes;
use thiserror::Error;

use crate::framing::FrameError;
use crate::id::ConnId;
use crate::state::{ConnState, ServiceState};

/// 引擎错误域。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum EngineError {
    /// 标识未知或连接已进入关闭流程。
    #[error("connection {0} is not registered")]
    InvalidConnection(ConnId),

    /// 当前状态不允许该操作。
    #[error("connection {id} is {state}, operation not permitted")]
    InvalidState { id: ConnId, state: ConnState },

    /// 连接数达到 `max_connections`。
    #[error("connection limit {max} reached")]
    ConnectionLimit { max: usize },

    /// 服务状态不符，例如未启动时接入连接。
    #[error("engine is {actual:?}, expected {expected:?}")]
    ServiceState {
        expected: ServiceState,
        actual: ServiceState,
    },

    /// 监听器在 `on_accept`/`on_prepare_connect` 中拒绝了连接。
    #[error("listener rejected connection {0}")]
    ListenerRejected(ConnId),

    /// 配置关闭了静默时间统计。
    #[error("silence tracking is disabled by configuration")]
    SilenceNotTracked,

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidConnection(_) => codes::ENGINE_INVALID_CONNECTION,
            EngineError::InvalidState { .. } | EngineError::SilenceNotTracked => {
                codes::ENGINE_INVALID_STATE
            }
            EngineError::ConnectionLimit { .. } => codes::ENGINE_CONNECTION_LIMIT,
            EngineError::ServiceState { .. } => codes::ENGINE_SERVICE_STATE,
            EngineError::ListenerRejected(_) => codes::ENGINE_LISTENER_REJECTED,
            EngineError::Buffer(err) => err.code(),
            EngineError::Frame(err) => err.code(),
            EngineError::Config(err) => err.code(),
        }
    }
}

/// `fetch`/`peek` 的结果。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FetchResult {
    /// 已复制请求的全部字节。
    Ok,
    /// 可拉取的字节少于请求长度，连接状态未改变。
    InsufficientData,
    /// 标识未知或连接已关闭。
    InvalidConnection,
}

impl FetchResult {
    pub fn is_ok(self) -> bool {
        matches!(self, FetchResult::Ok)
    }
}
