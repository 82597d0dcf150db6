use hxsock_core::error::codes;
use thiserror::Error;

/// 缓冲层错误。
///
/// # 教案式说明
/// - **意图 (Why)**：区分“可恢复的局部错误”与“致命的资源错误”：
///   `CapacityExceeded` 由链追加新块化解，`InsufficientData`/`Underrun` 是调用方误用，
///   只报告不致命；`ArenaExhausted` 使本次申请失败；
/// - **契约 (What)**：所有变体携带请求量与可用量，便于日志直接定位。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum BufferError {
    #[error("chunk capacity exceeded: requested {requested} bytes, {remaining} remaining")]
    CapacityExceeded { requested: usize, remaining: usize },
    #[error("insufficient data in chunk: requested {requested} bytes, {available} available")]
    InsufficientData { requested: usize, available: usize },
    #[error("chain underrun: requested {requested} bytes, {available} buffered")]
    Underrun { requested: usize, available: usize },
    #[error("arena exhausted: requested {requested} bytes with {in_use} of {limit} in use")]
    ArenaExhausted {
        requested: usize,
        in_use: usize,
        limit: usize,
    },
}

impl BufferError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            BufferError::CapacityExceeded { .. } => codes::BUFFER_CAPACITY_EXCEEDED,
            BufferError::InsufficientData { .. } => codes::BUFFER_INSUFFICIENT_DATA,
            BufferError::Underrun { .. } => codes::BUFFER_UNDERRUN,
            BufferError::ArenaExhausted { .. } => codes::BUFFER_ARENA_EXHAUSTED,
        }
    }
}
