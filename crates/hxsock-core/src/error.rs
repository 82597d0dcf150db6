//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为 hxsock 全部 crate 提供稳定的字符串错误码，日志、告警与测试断言都以错误码而非
//!   文案为准，文案可以随时调整，错误码一经发布不再变化；
//! - 定义连接结束时携带的 [`CloseCode`] 与 [`SocketOperation`]，二者共同构成
//!   `on_close(operation, code)` 回调的参数。
//!
//! ## 设计要求（What）
//! - 错误码统一采用 `hxsock.<域>.<原因>` 三段式；
//! - 各 crate 的 `thiserror` 枚举通过 `code()` 方法映射到本模块的常量。

use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 稳定错误码常量表。
pub mod codes {
    pub const BUFFER_CAPACITY_EXCEEDED: &str = "hxsock.buffer.capacity_exceeded";
    pub const BUFFER_INSUFFICIENT_DATA: &str = "hxsock.buffer.insufficient_data";
    pub const BUFFER_UNDERRUN: &str = "hxsock.buffer.underrun";
    pub const BUFFER_ARENA_EXHAUSTED: &str = "hxsock.buffer.arena_exhausted";

    pub const FRAME_BAD_HEADER: &str = "hxsock.frame.bad_header";
    pub const FRAME_PACKET_TOO_LARGE: &str = "hxsock.frame.packet_too_large";

    pub const CONFIG_INVALID: &str = "hxsock.config.invalid";
    pub const CONFIG_PARSE_FAILED: &str = "hxsock.config.parse_failed";

    pub const ENGINE_INVALID_CONNECTION: &str = "hxsock.engine.invalid_connection";
    pub const ENGINE_INVALID_STATE: &str = "hxsock.engine.invalid_state";
    pub const ENGINE_CONNECTION_LIMIT: &str = "hxsock.engine.connection_limit";
    pub const ENGINE_SERVICE_STATE: &str = "hxsock.engine.service_state";
    pub const ENGINE_LISTENER_REJECTED: &str = "hxsock.engine.listener_rejected";

    pub const CLOSE_NORMAL: &str = "hxsock.close.normal";
    pub const CLOSE_RECEIVE_OVERFLOW: &str = "hxsock.close.receive_overflow";
    pub const CLOSE_LISTENER_ABORTED: &str = "hxsock.close.listener_aborted";
    pub const CLOSE_RESOURCE_EXHAUSTED: &str = "hxsock.close.resource_exhausted";
    pub const CLOSE_TRANSPORT: &str = "hxsock.close.transport";
    pub const CLOSE_SHUTDOWN: &str = "hxsock.close.shutdown";
    pub const CLOSE_KICKED: &str = "hxsock.close.kicked";

    pub const TCP_BIND: &str = "hxsock.tcp.bind";
    pub const TCP_ACCEPT: &str = "hxsock.tcp.accept";
    pub const TCP_CONNECT: &str = "hxsock.tcp.connect";
    pub const TCP_RUNTIME: &str = "hxsock.tcp.runtime";
}

/// 连接结束时所处的操作阶段。
///
/// - **意图 (Why)**：与关闭原因一起交给 `on_close`，帮助调用方区分“读失败”与“写失败”；
/// - **契约 (What)**：`Close` 表示主动断开或引擎关停，`Unknown` 仅用于无法归类的场景。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SocketOperation {
    Unknown,
    Accept,
    Connect,
    Handshake,
    Send,
    Receive,
    Close,
}

impl fmt::Display for SocketOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SocketOperation::Unknown => "unknown",
            SocketOperation::Accept => "accept",
            SocketOperation::Connect => "connect",
            SocketOperation::Handshake => "handshake",
            SocketOperation::Send => "send",
            SocketOperation::Receive => "receive",
            SocketOperation::Close => "close",
        };
        f.write_str(text)
    }
}

/// 连接关闭原因。
///
/// # 教案式说明
/// - **意图 (Why)**：每条连接结束时恰好触发一次 `on_close`，本枚举描述结束的根因，
///   让监听器无需解析文案即可决定是否告警；
/// - **契约 (What)**：
///   - `BadHeader` / `PacketTooLarge` 为协议违例，[`CloseCode::is_protocol_violation`] 返回 `true`；
///   - `Transport` 携带底层 OS 错误码（若可得）；
///   - `Normal`、`Shutdown`、`Kicked` 属于预期内关闭，[`CloseCode::is_error`] 返回 `false`；
/// - **风险 (Trade-offs)**：枚举保持 `Copy`，不携带字符串上下文，详细信息需结合日志排查。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum CloseCode {
    /// 本端或对端正常断开。
    Normal,
    /// PACK 包头标志不匹配。
    BadHeader,
    /// PACK 包头声明的长度超过上限。
    PacketTooLarge,
    /// 接收缓冲超过上限且溢出策略为关闭。
    ReceiveOverflow,
    /// 监听器回调返回 `HandleResult::Error`。
    ListenerAborted,
    /// 缓冲区申请失败（竞技场耗尽）。
    ResourceExhausted,
    /// 传输层读写失败。
    Transport(Option<i32>),
    /// 引擎停止服务。
    Shutdown,
    /// 因长连接或静默超时被踢出。
    Kicked,
}

impl CloseCode {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            CloseCode::Normal => codes::CLOSE_NORMAL,
            CloseCode::BadHeader => codes::FRAME_BAD_HEADER,
            CloseCode::PacketTooLarge => codes::FRAME_PACKET_TOO_LARGE,
            CloseCode::ReceiveOverflow => codes::CLOSE_RECEIVE_OVERFLOW,
            CloseCode::ListenerAborted => codes::CLOSE_LISTENER_ABORTED,
            CloseCode::ResourceExhausted => codes::CLOSE_RESOURCE_EXHAUSTED,
            CloseCode::Transport(_) => codes::CLOSE_TRANSPORT,
            CloseCode::Shutdown => codes::CLOSE_SHUTDOWN,
            CloseCode::Kicked => codes::CLOSE_KICKED,
        }
    }

    /// 是否属于协议违例（包头标志错误或包体超长）。
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, CloseCode::BadHeader | CloseCode::PacketTooLarge)
    }

    /// 是否属于异常关闭。
    pub fn is_error(&self) -> bool {
        !matches!(
            self,
            CloseCode::Normal | CloseCode::Shutdown | CloseCode::Kicked
        )
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseCode::Transport(Some(raw)) => write!(f, "{} (os error {raw})", self.code()),
            _ => f.write_str(self.code()),
        }
    }
}

/// 配置错误。
///
/// # 教案式说明
/// - **意图 (Why)**：池与锁配置错误被视为启动期的致命错误，必须在引擎构造时暴露，
///   而不是在稳态运行中以随机失败的形式出现；
/// - **契约 (What)**：`Invalid` 指出具体字段与原因；`Parse` 包装 TOML 解析错误文本。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ConfigError {
    /// 字段取值越界或与其他字段冲突。
    #[error("invalid configuration `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    /// 配置文本无法解析。
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Invalid { .. } => codes::CONFIG_INVALID,
            ConfigError::Parse(_) => codes::CONFIG_PARSE_FAILED,
        }
    }
}
