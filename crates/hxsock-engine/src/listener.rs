//! 监听器回调契约。
//!
//! # 教案式导览
//! - **意图 (Why)**：引擎只关心“何时回调、回调返回什么”，业务逻辑全部位于监听器实现中；
//!   所有方法都带默认实现，使用方只需覆写关心的事件；
//! - **逻辑 (How)**：回调在完成 I/O 的工作线程上同步执行，调用期间引擎不持有连接数据锁，
//!   因此监听器可以在回调内调用 `fetch`、`send`、`pause_receive`、`disconnect`；
//! - **契约 (What)**：
//!   - `on_accept`/`on_prepare_connect` 返回 [`HandleResult::Error`] 时连接被直接丢弃，不触发 `on_close`；
//!   - `on_connect`/`on_handshake`/`on_receive`/`on_receive_len` 返回 `Error` 时引擎以
//!     `CloseCode::ListenerAborted` 关闭连接；
//!   - `on_send`/`on_close`/`on_shutdown` 的返回值被忽略；
//!   - 每条进入过连接表的连接恰好触发一次 `on_close`，且发生在缓冲与记录回收之前。

use hxsock_core::{CloseCode, SocketOperation};

use crate::engine::SocketEngine;
use crate::id::ConnId;

/// 回调处理结果。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum HandleResult {
    Ok,
    #[default]
    Ignore,
    /// 要求引擎关闭连接。
    Error,
}

impl HandleResult {
    pub fn is_error(self) -> bool {
        matches!(self, HandleResult::Error)
    }
}

/// 引擎事件监听器。
#[allow(unused_variables)]
pub trait Listener: Send + Sync + 'static {
    /// 入站连接登记完成。
    fn on_accept(&self, engine: &SocketEngine, id: ConnId) -> HandleResult {
        HandleResult::Ignore
    }

    /// 出站连接登记完成，尚未建立。
    fn on_prepare_connect(&self, engine: &SocketEngine, id: ConnId) -> HandleResult {
        HandleResult::Ignore
    }

    /// 出站连接已建立。
    fn on_connect(&self, engine: &SocketEngine, id: ConnId) -> HandleResult {
        HandleResult::Ignore
    }

    /// 连接进入 `Active`。
    fn on_handshake(&self, engine: &SocketEngine, id: ConnId) -> HandleResult {
        HandleResult::Ignore
    }

    /// PUSH 与 PACK/push：交付字节或完整数据包。
    fn on_receive(&self, engine: &SocketEngine, id: ConnId, data: &[u8]) -> HandleResult {
        HandleResult::Ignore
    }

    /// PULL 与 PACK/pull：通知可拉取的字节数（PACK 下为一个完整包的长度）。
    fn on_receive_len(&self, engine: &SocketEngine, id: ConnId, len: usize) -> HandleResult {
        HandleResult::Ignore
    }

    /// 传输层完成一次写出。
    fn on_send(&self, engine: &SocketEngine, id: ConnId, len: usize) -> HandleResult {
        HandleResult::Ignore
    }

    fn on_close(
        &self,
        engine: &SocketEngine,
        id: ConnId,
        operation: SocketOperation,
        code: CloseCode,
    ) -> HandleResult {
        HandleResult::Ignore
    }

    fn on_shutdown(&self, engine: &SocketEngine) -> HandleResult {
        HandleResult::Ignore
    }
}
